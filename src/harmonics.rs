use std::fmt;

/// Amplitude and phase of one harmonic. Phase is kept in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Harmonic {
    pub amplitude: f32,
    pub phase: f32,
}

impl Harmonic {
    pub fn new(amplitude: f32, phase: f32) -> Self {
        Self {
            amplitude: amplitude.max(0.0),
            phase: wrap_phase(phase),
        }
    }
}

impl From<(f32, f32)> for Harmonic {
    fn from((amplitude, phase): (f32, f32)) -> Self {
        Harmonic::new(amplitude, phase)
    }
}

/// Wraps a phase into `[0, 1)`.
pub fn wrap_phase(phase: f32) -> f32 {
    let wrapped = phase.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// The harmonics making up the current waveform, numbered `1..=len()`.
///
/// Harmonics are only ever added or removed at the top, so the set is
/// always contiguous and is stored as a vector indexed by `n - 1`. The
/// fundamental can never be removed.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonicSet {
    harmonics: Vec<Harmonic>,
}

impl Default for HarmonicSet {
    fn default() -> Self {
        Self::new()
    }
}

impl HarmonicSet {
    /// A set holding only the fundamental at full amplitude and zero phase.
    pub fn new() -> Self {
        Self {
            harmonics: vec![Harmonic::new(1.0, 0.0)],
        }
    }

    pub fn len(&self) -> usize {
        self.harmonics.len()
    }

    /// Highest harmonic number present.
    pub fn top(&self) -> usize {
        self.harmonics.len()
    }

    pub fn contains(&self, n: usize) -> bool {
        n >= 1 && n <= self.harmonics.len()
    }

    pub fn get(&self, n: usize) -> Option<Harmonic> {
        n.checked_sub(1).and_then(|i| self.harmonics.get(i)).copied()
    }

    /// Iterates `(harmonic number, harmonic)` in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Harmonic)> + '_ {
        self.harmonics.iter().enumerate().map(|(i, h)| (i + 1, *h))
    }

    /// Appends a harmonic above the current top and returns its number.
    pub fn push(&mut self, harmonic: Harmonic) -> usize {
        self.harmonics.push(harmonic);
        self.harmonics.len()
    }

    /// Removes the top harmonic. Refused when only the fundamental is left.
    pub fn pop(&mut self) -> Option<(usize, Harmonic)> {
        if self.harmonics.len() <= 1 {
            return None;
        }
        let n = self.harmonics.len();
        self.harmonics.pop().map(|h| (n, h))
    }

    pub fn set(&mut self, n: usize, harmonic: Harmonic) {
        if let Some(slot) = self.slot_mut(n) {
            *slot = harmonic;
        }
    }

    pub fn set_amplitude(&mut self, n: usize, amplitude: f32) {
        if let Some(slot) = self.slot_mut(n) {
            slot.amplitude = amplitude.max(0.0);
        }
    }

    pub fn set_phase(&mut self, n: usize, phase: f32) {
        if let Some(slot) = self.slot_mut(n) {
            slot.phase = wrap_phase(phase);
        }
    }

    fn slot_mut(&mut self, n: usize) -> Option<&mut Harmonic> {
        let slot = n.checked_sub(1).and_then(|i| self.harmonics.get_mut(i));
        debug_assert!(slot.is_some(), "no harmonic numbered {n}");
        slot
    }
}

impl fmt::Display for HarmonicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, h) in self.iter() {
            writeln!(f, "{n} : ({:.4}, {:.4})", h.amplitude, h.phase)?;
        }
        Ok(())
    }
}
