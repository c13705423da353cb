/// Closed-form rules for seeding a harmonic's amplitude and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    NFalloff,
    #[default]
    NSquaredFalloff,
    SawWave,
    ReverseSawWave,
    TriangleWave,
    SquareWave,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::NFalloff,
        Preset::NSquaredFalloff,
        Preset::SawWave,
        Preset::ReverseSawWave,
        Preset::TriangleWave,
        Preset::SquareWave,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Preset::NFalloff => "N Falloff",
            Preset::NSquaredFalloff => "N-Squared Falloff",
            Preset::SawWave => "Saw Wave",
            Preset::ReverseSawWave => "Reverse Saw Wave",
            Preset::TriangleWave => "Triangle Wave",
            Preset::SquareWave => "Square Wave",
        }
    }

    /// Phase the fundamental takes once higher harmonics are stacked on it.
    pub fn fundamental_phase(self) -> f32 {
        match self {
            Preset::ReverseSawWave => 0.5,
            _ => 0.0,
        }
    }
}

/// Evaluates `preset` at harmonic `n` (1 = fundamental), returning
/// `(amplitude, phase)`.
pub fn preset_value(preset: Preset, n: usize) -> (f32, f32) {
    debug_assert!(n >= 1, "harmonic numbers start at 1");
    if n <= 1 {
        return (1.0, 0.0);
    }

    let nf = n as f32;
    let half_period = 1.0 / (2.0 * nf);
    let even = n % 2 == 0;

    match preset {
        Preset::NFalloff => (1.0 / nf, 0.0),
        Preset::NSquaredFalloff => (1.0 / (nf * nf), 0.0),
        Preset::SawWave => {
            let raw = saw_coefficient(n);
            (raw.abs(), if raw < 0.0 { 0.0 } else { half_period })
        }
        Preset::ReverseSawWave => {
            let raw = saw_coefficient(n);
            (raw.abs(), if raw < 0.0 { half_period } else { 0.0 })
        }
        Preset::TriangleWave => {
            if even {
                (0.0, 0.0)
            } else if (n - 1) % 4 == 0 {
                (1.0 / (nf * nf), 0.0)
            } else {
                (1.0 / (nf * nf), half_period)
            }
        }
        Preset::SquareWave => {
            if even {
                (0.0, 0.0)
            } else {
                (1.0 / nf, 0.0)
            }
        }
    }
}

/// Signed Fourier coefficient of a sawtooth: (-1)^(n+1) / n.
fn saw_coefficient(n: usize) -> f32 {
    let sign = if n % 2 == 0 { -1.0 } else { 1.0 };
    sign / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_value(preset: Preset, n: usize, amplitude: f32, phase: f32) {
        let (a, p) = preset_value(preset, n);
        assert!((a - amplitude).abs() < 1e-6, "{preset:?} n={n}: amplitude {a} != {amplitude}");
        assert!((p - phase).abs() < 1e-6, "{preset:?} n={n}: phase {p} != {phase}");
    }

    #[test]
    fn fundamental_is_unit_under_every_preset() {
        for preset in Preset::ALL {
            assert_value(preset, 1, 1.0, 0.0);
        }
    }

    #[test]
    fn falloff_presets() {
        for n in 2..=8 {
            let nf = n as f32;
            assert_value(Preset::NFalloff, n, 1.0 / nf, 0.0);
            assert_value(Preset::NSquaredFalloff, n, 1.0 / (nf * nf), 0.0);
        }
    }

    #[test]
    fn saw_presets_mirror_each_other() {
        for n in 2..=8 {
            let nf = n as f32;
            let half = 1.0 / (2.0 * nf);
            if n % 2 == 0 {
                assert_value(Preset::SawWave, n, 1.0 / nf, 0.0);
                assert_value(Preset::ReverseSawWave, n, 1.0 / nf, half);
            } else {
                assert_value(Preset::SawWave, n, 1.0 / nf, half);
                assert_value(Preset::ReverseSawWave, n, 1.0 / nf, 0.0);
            }
        }
    }

    #[test]
    fn triangle_uses_odd_harmonics_with_alternating_phase() {
        let expected = [
            (1.0, 0.0),
            (0.0, 0.0),
            (1.0 / 9.0, 1.0 / 6.0),
            (0.0, 0.0),
            (1.0 / 25.0, 0.0),
            (0.0, 0.0),
            (1.0 / 49.0, 1.0 / 14.0),
            (0.0, 0.0),
        ];
        for (n, (amplitude, phase)) in (1..=8).zip(expected) {
            assert_value(Preset::TriangleWave, n, amplitude, phase);
        }
    }

    #[test]
    fn square_uses_odd_harmonics() {
        let expected = [1.0, 0.0, 1.0 / 3.0, 0.0, 0.2, 0.0, 1.0 / 7.0, 0.0];
        for (n, amplitude) in (1..=8).zip(expected) {
            assert_value(Preset::SquareWave, n, amplitude, 0.0);
        }
    }

    #[test]
    fn only_reverse_saw_flips_the_fundamental() {
        for preset in Preset::ALL {
            let expected = if preset == Preset::ReverseSawWave { 0.5 } else { 0.0 };
            assert_eq!(preset.fundamental_phase(), expected);
        }
    }
}
