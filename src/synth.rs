//! Additive synthesis kernels working on a fixed-length sample buffer.
//!
//! `synthesize` renders the whole buffer from scratch. The other kernels
//! patch an existing buffer for a single edit in one O(len) pass; they are
//! algebraic shortcuts and drift slightly from a fresh render, which the
//! edit engine reconciles periodically.

use std::f32::consts::PI;

use crate::config::AMPLITUDE_SCALE_FACTOR;
use crate::harmonics::{wrap_phase, HarmonicSet};

/// Combines the fundamental's phase with a harmonic's own offset.
pub fn harmonic_phase(fundamental_phase: f32, phase: f32) -> f32 {
    wrap_phase(fundamental_phase + phase)
}

/// Multiplies every sample by `ratio` (new amplitude / old amplitude).
pub fn re_amp_sine(wave: &mut [f32], ratio: f32) {
    for sample in wave.iter_mut() {
        *sample *= ratio;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Synthesizer {
    sample_rate: f32,
}

impl Synthesizer {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Unit sine of harmonic `harm` at sample `i`.
    #[inline]
    fn partial(&self, frequency: f32, harm: usize, phase: f32, i: usize) -> f32 {
        (2.0 * PI * harm as f32 * ((i as f32 * frequency / self.sample_rate) - phase)).sin()
    }

    /// Value of the full waveform at sample `i`, which may lie past the end
    /// of any buffer.
    pub fn sample_at(
        &self,
        frequency: f32,
        amplitude: f32,
        harmonics: &HarmonicSet,
        phase: f32,
        i: usize,
    ) -> f32 {
        harmonics
            .iter()
            .map(|(n, h)| {
                let gain = AMPLITUDE_SCALE_FACTOR * amplitude * h.amplitude;
                gain * self.partial(frequency, n, harmonic_phase(phase, h.phase), i)
            })
            .sum()
    }

    /// Renders every harmonic into `wave` from scratch.
    pub fn synthesize(
        &self,
        wave: &mut [f32],
        frequency: f32,
        amplitude: f32,
        harmonics: &HarmonicSet,
        phase: f32,
    ) {
        for (i, sample) in wave.iter_mut().enumerate() {
            *sample = self.sample_at(frequency, amplitude, harmonics, phase, i);
        }
    }

    /// Adds harmonic `harm` rendered at `harm_phase` (fundamental offset
    /// already included).
    pub fn add_harm(
        &self,
        wave: &mut [f32],
        frequency: f32,
        amplitude: f32,
        harm: usize,
        harm_amplitude: f32,
        harm_phase: f32,
    ) {
        let gain = AMPLITUDE_SCALE_FACTOR * amplitude * harm_amplitude;
        for (i, sample) in wave.iter_mut().enumerate() {
            *sample += gain * self.partial(frequency, harm, harm_phase, i);
        }
    }

    /// Exact inverse of [`Synthesizer::add_harm`] for the same arguments.
    pub fn remove_harm(
        &self,
        wave: &mut [f32],
        frequency: f32,
        amplitude: f32,
        harm: usize,
        harm_amplitude: f32,
        harm_phase: f32,
    ) {
        let gain = AMPLITUDE_SCALE_FACTOR * amplitude * harm_amplitude;
        for (i, sample) in wave.iter_mut().enumerate() {
            *sample -= gain * self.partial(frequency, harm, harm_phase, i);
        }
    }

    /// Moves harmonic `harm` from its old amplitude to `old + delta`.
    pub fn re_amp_harm(
        &self,
        wave: &mut [f32],
        frequency: f32,
        amplitude: f32,
        harm: usize,
        delta: f32,
        harm_phase: f32,
    ) {
        self.add_harm(wave, frequency, amplitude, harm, delta, harm_phase);
    }

    /// Swaps harmonic `harm` rendered at `old_phase` for one at `new_phase`.
    #[allow(clippy::too_many_arguments)]
    pub fn re_phase_harm(
        &self,
        wave: &mut [f32],
        frequency: f32,
        amplitude: f32,
        harm: usize,
        harm_amplitude: f32,
        old_phase: f32,
        new_phase: f32,
    ) {
        let gain = AMPLITUDE_SCALE_FACTOR * amplitude * harm_amplitude;
        for (i, sample) in wave.iter_mut().enumerate() {
            *sample -= gain * self.partial(frequency, harm, old_phase, i);
            *sample += gain * self.partial(frequency, harm, new_phase, i);
        }
    }

    /// Re-renders `wave` at `new_frequency` so that sample 0 continues from
    /// where playback at `old_frequency` had reached (`cursor` samples into
    /// the loop). Returns the updated fundamental phase.
    #[allow(clippy::too_many_arguments)]
    pub fn blend(
        &self,
        wave: &mut [f32],
        new_frequency: f32,
        old_frequency: f32,
        amplitude: f32,
        harmonics: &HarmonicSet,
        phase: f32,
        cursor: usize,
    ) -> f32 {
        let progress = cursor as f32 * old_frequency / self.sample_rate;
        let phase = wrap_phase(phase - progress.fract());
        self.synthesize(wave, new_frequency, amplitude, harmonics, phase);
        phase
    }
}
