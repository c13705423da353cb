use crate::harmonics::{Harmonic, HarmonicSet};

/// What changed in a harmonic set between two edit ticks.
///
/// Since harmonics only come and go at the top, at most one of `added` and
/// `removed` is non-empty. `edited` covers the harmonics present in both
/// sets, so a slider moved in the same tick as an add is not lost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonicDiff {
    /// Harmonics present now but not before, with their current values.
    pub added: Vec<(usize, Harmonic)>,
    /// Harmonics present before but not now, with the values they had.
    pub removed: Vec<(usize, Harmonic)>,
    pub edited: Vec<HarmonicEdit>,
}

/// Amplitude and/or phase edit of one surviving harmonic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicEdit {
    pub harmonic: usize,
    pub previous: Harmonic,
    pub current: Harmonic,
}

impl HarmonicEdit {
    pub fn amplitude_changed(&self) -> bool {
        self.previous.amplitude != self.current.amplitude
    }

    /// Phases are stored wrapped to `[0, 1)`, so a plain comparison is the
    /// mod-1 comparison.
    pub fn phase_changed(&self) -> bool {
        self.previous.phase != self.current.phase
    }
}

impl HarmonicDiff {
    pub fn between(current: &HarmonicSet, previous: &HarmonicSet) -> Self {
        let added = current.iter().filter(|(n, _)| !previous.contains(*n)).collect();
        let removed = previous.iter().filter(|(n, _)| !current.contains(*n)).collect();
        let edited = current
            .iter()
            .filter_map(|(n, now)| {
                let edit = HarmonicEdit {
                    harmonic: n,
                    previous: previous.get(n)?,
                    current: now,
                };
                (edit.amplitude_changed() || edit.phase_changed()).then_some(edit)
            })
            .collect();

        Self { added, removed, edited }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.edited.is_empty()
    }
}
