//! The edit engine: owns the harmonic model and the working sample buffer,
//! turns each tick's edits into the cheapest buffer update, and publishes
//! the result for the audio callback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::audio::loop_length;
use crate::config::{graph_buffer_size, Args, MAX_AMPLITUDE, MAX_FREQUENCY, MIN_FREQUENCY};
use crate::diff::HarmonicDiff;
use crate::harmonics::{Harmonic, HarmonicSet};
use crate::preset::{preset_value, Preset};
use crate::state::{AppState, Playback};
use crate::synth::{harmonic_phase, re_amp_sine, Synthesizer};

/// Ticks a blend may wait for the audio callback to reach the latest
/// buffer before the frequency change restarts the loop instead.
const MAX_BLEND_WAITS: u32 = 8;


/// Runs the edit engine at `tick_rate` ticks per second until shutdown.
pub async fn run_edit_loop(state: Arc<AppState>, tick_rate: u32) {
    let period = Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1)));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(tick_rate, "Edit loop running");

    while !state.is_shutting_down() {
        interval.tick().await;
        let outcome = state.with_engine(EditEngine::tick);
        if outcome != TickOutcome::Unchanged {
            trace!(?outcome, "Tick");
        }
    }
    info!("Edit loop stopped");
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub frequency: f32,
    pub amplitude: f32,
    pub preset: Preset,
    /// Idle ticks during playback before a full recompute is forced.
    pub recalc_max: u32,
}

impl EngineConfig {
    pub fn from_args(args: &Args, sample_rate: f32) -> Self {
        Self {
            sample_rate,
            frequency: args.clamped_frequency(),
            amplitude: args.clamped_amplitude(),
            preset: args.preset.into(),
            recalc_max: args.recalc_max.max(1),
        }
    }
}

/// Result of one edit tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Unchanged,
    /// Edits were folded into the buffer incrementally.
    Patched,
    /// The buffer was rendered from scratch.
    Rendered,
    /// Safety-net recompute; `changed` is false when the buffer was
    /// already exact.
    Recalculated { changed: bool },
}

impl TickOutcome {
    pub fn changed_buffer(self) -> bool {
        match self {
            TickOutcome::Unchanged => false,
            TickOutcome::Patched | TickOutcome::Rendered => true,
            TickOutcome::Recalculated { changed } => changed,
        }
    }
}

pub struct EditEngine {
    synth: Synthesizer,
    playback: Arc<Playback>,

    harmonics: HarmonicSet,
    previous: HarmonicSet,
    preset: Preset,

    frequency: f32,
    prev_frequency: f32,
    amplitude: f32,
    prev_amplitude: f32,
    /// Fundamental phase at the start of the buffer, in `[0, 1)`.
    phase: f32,

    wave: Vec<f32>,
    scratch: Vec<f32>,
    loop_len: usize,

    recalc_max: u32,
    idle_ticks: u32,

    preset_pending: bool,
    render_pending: bool,
    restart_pending: bool,
    start_requested: bool,

    epoch: u64,
    anchor: Option<usize>,
    blend_waits: u32,
    was_clipping: bool,
}

impl EditEngine {
    pub fn new(config: EngineConfig) -> Self {
        let graph_len = graph_buffer_size(config.sample_rate);
        let frequency = config.frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
        let amplitude = config.amplitude.clamp(0.0, MAX_AMPLITUDE);
        let synth = Synthesizer::new(config.sample_rate);
        let harmonics = HarmonicSet::new();

        let mut wave = vec![0.0; graph_len];
        synth.synthesize(&mut wave, frequency, amplitude, &harmonics, 0.0);
        let loop_len = loop_length(frequency, graph_len, config.sample_rate);

        let playback = Playback::new(graph_len);
        playback.publish(&wave, loop_len, 0, None);

        info!(
            sample_rate = config.sample_rate,
            frequency,
            amplitude,
            graph_len,
            loop_len,
            preset = config.preset.label(),
            "Edit engine ready"
        );

        Self {
            synth,
            playback,
            previous: harmonics.clone(),
            harmonics,
            preset: config.preset,
            frequency,
            prev_frequency: frequency,
            amplitude,
            prev_amplitude: amplitude,
            phase: 0.0,
            scratch: vec![0.0; graph_len],
            wave,
            loop_len,
            recalc_max: config.recalc_max.max(1),
            idle_ticks: 0,
            preset_pending: false,
            render_pending: false,
            restart_pending: false,
            start_requested: false,
            epoch: 0,
            anchor: None,
            blend_waits: 0,
            was_clipping: false,
        }
    }

    pub fn playback(&self) -> Arc<Playback> {
        Arc::clone(&self.playback)
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude.clamp(0.0, MAX_AMPLITUDE);
    }

    /// Adds the next harmonic up, seeded from the active preset.
    pub fn add_harmonic(&mut self) -> usize {
        if self.harmonics.len() == 1 {
            self.harmonics.set_phase(1, self.preset.fundamental_phase());
        }
        let n = self.harmonics.top() + 1;
        let harmonic = Harmonic::from(preset_value(self.preset, n));
        self.harmonics.push(harmonic)
    }

    /// Removes the top harmonic. The fundamental always stays.
    pub fn remove_harmonic(&mut self) -> bool {
        self.harmonics.pop().is_some()
    }

    pub fn set_harmonic_amplitude(&mut self, n: usize, amplitude: f32) {
        self.harmonics.set_amplitude(n, amplitude);
    }

    pub fn set_harmonic_phase(&mut self, n: usize, phase: f32) {
        self.harmonics.set_phase(n, phase);
    }

    /// Changes the preset used by future adds and resets.
    pub fn select_preset(&mut self, preset: Preset) {
        if preset != self.preset {
            debug!(preset = preset.label(), "Preset selected");
            self.preset = preset;
        }
    }

    /// Re-seeds every harmonic from the active preset on the next tick.
    pub fn apply_preset(&mut self) {
        self.preset_pending = true;
    }

    /// Re-seeds harmonic `n` from the active preset.
    pub fn reset_harmonic(&mut self, n: usize) {
        debug_assert!(self.harmonics.contains(n), "no harmonic numbered {n}");
        if self.harmonics.contains(n) {
            let harmonic = self.preset_harmonic(n);
            self.harmonics.set(n, harmonic);
        }
    }

    pub fn play(&mut self) {
        if self.playback.is_playing() || self.start_requested {
            return;
        }
        info!("Playback starting");
        self.start_requested = true;
        self.restart_pending = true;
        self.render_pending = true;
    }

    pub fn stop(&mut self) {
        if !self.playback.is_playing() && !self.start_requested {
            return;
        }
        info!("Playback stopped");
        self.playback.set_playing(false);
        self.playback.store_position(self.epoch, 0);
        self.start_requested = false;
        self.phase = 0.0;
        self.restart_pending = true;
        self.render_pending = true;
    }

    pub fn toggle_playback(&mut self) {
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing() || self.start_requested
    }

    pub fn is_clipping(&self) -> bool {
        self.playback.is_clipping()
    }

    pub fn harmonics(&self) -> &HarmonicSet {
        &self.harmonics
    }

    pub fn samples(&self) -> &[f32] {
        &self.wave
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn loop_len(&self) -> usize {
        self.loop_len
    }

    #[cfg(test)]
    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synth
    }

    pub fn describe(&self) -> String {
        format!(
            "{:.2} Hz, amplitude {:.2}, {}:\n{}",
            self.frequency,
            self.amplitude,
            self.preset.label(),
            self.harmonics
        )
    }

    /// Folds everything edited since the last tick into the buffer and
    /// publishes it if it changed.
    pub fn tick(&mut self) -> TickOutcome {
        self.note_clipping();

        if self.preset_pending {
            self.preset_pending = false;
            self.reseed_from_preset();
            self.render_pending = true;
        }

        let outcome = if self.needs_full_render() {
            if self.render_full() {
                TickOutcome::Rendered
            } else {
                TickOutcome::Unchanged
            }
        } else if self.patch() {
            TickOutcome::Patched
        } else {
            self.safety_net()
        };

        if matches!(outcome, TickOutcome::Patched | TickOutcome::Rendered) {
            self.idle_ticks = 0;
        }
        if outcome.changed_buffer() {
            self.publish();
        }
        if self.start_requested {
            self.start_requested = false;
            self.playback.set_playing(true);
        }
        outcome
    }

    fn preset_harmonic(&self, n: usize) -> Harmonic {
        let (amplitude, phase) = preset_value(self.preset, n);
        if n == 1 && self.harmonics.len() > 1 {
            Harmonic::new(amplitude, self.preset.fundamental_phase())
        } else {
            Harmonic::new(amplitude, phase)
        }
    }

    fn reseed_from_preset(&mut self) {
        for n in 1..=self.harmonics.top() {
            let harmonic = self.preset_harmonic(n);
            self.harmonics.set(n, harmonic);
        }
        debug!(preset = self.preset.label(), harmonics = self.harmonics.len(), "Preset applied");
    }

    fn needs_full_render(&self) -> bool {
        self.render_pending
            || self.frequency != self.prev_frequency
            // rescaling cannot recover a buffer that was scaled to silence
            || (self.amplitude != self.prev_amplitude && self.prev_amplitude == 0.0)
    }

    /// Renders the buffer from scratch, blending a frequency change into
    /// playback. Returns false when the blend has to wait for the audio
    /// callback; every pending change is then kept for the next tick.
    fn render_full(&mut self) -> bool {
        let frequency_changed = self.frequency != self.prev_frequency;
        let blend = frequency_changed && self.playback.is_playing() && !self.restart_pending;

        // The cursor only lines up with the phase of the buffer it indexes
        let position = self.playback.position();
        if blend && !position.is_in(self.epoch) && self.blend_waits < MAX_BLEND_WAITS {
            self.blend_waits += 1;
            trace!(waits = self.blend_waits, audio_epoch = position.epoch, epoch = self.epoch, "Blend deferred");
            return false;
        }

        if frequency_changed {
            self.loop_len = loop_length(self.frequency, self.wave.len(), self.synth.sample_rate());
        }

        if blend && position.is_in(self.epoch) {
            let cursor = position.cursor;
            self.phase = self.synth.blend(
                &mut self.wave,
                self.frequency,
                self.prev_frequency,
                self.amplitude,
                &self.harmonics,
                self.phase,
                cursor,
            );
            self.rebase(Some(cursor));
            debug!(
                from = self.prev_frequency,
                to = self.frequency,
                cursor,
                phase = self.phase,
                "Blended frequency change"
            );
        } else {
            if blend {
                warn!(waits = self.blend_waits, "Audio did not catch up; restarting the loop");
                self.phase = 0.0;
            }
            self.synthesize_into_wave();
            if frequency_changed || self.restart_pending {
                self.rebase(None);
            }
        }

        self.blend_waits = 0;
        self.restart_pending = false;
        self.render_pending = false;
        self.prev_frequency = self.frequency;
        self.prev_amplitude = self.amplitude;
        self.previous = self.harmonics.clone();
        true
    }

    fn synthesize_into_wave(&mut self) {
        self.synth.synthesize(
            &mut self.wave,
            self.frequency,
            self.amplitude,
            &self.harmonics,
            self.phase,
        );
    }

    /// Applies this tick's edits incrementally. Returns false if nothing
    /// was edited.
    fn patch(&mut self) -> bool {
        let diff = HarmonicDiff::between(&self.harmonics, &self.previous);
        let amp_changed = self.amplitude != self.prev_amplitude;
        if diff.is_empty() && !amp_changed {
            return false;
        }

        if amp_changed {
            re_amp_sine(&mut self.wave, self.amplitude / self.prev_amplitude);
            trace!(from = self.prev_amplitude, to = self.amplitude, "Rescaled");
            self.prev_amplitude = self.amplitude;
        }

        let (frequency, amplitude, phase) = (self.frequency, self.amplitude, self.phase);
        for &(n, h) in &diff.removed {
            let harm_phase = harmonic_phase(phase, h.phase);
            self.synth
                .remove_harm(&mut self.wave, frequency, amplitude, n, h.amplitude, harm_phase);
        }
        for edit in &diff.edited {
            let n = edit.harmonic;
            if edit.amplitude_changed() {
                let delta = edit.current.amplitude - edit.previous.amplitude;
                let harm_phase = harmonic_phase(phase, edit.previous.phase);
                self.synth
                    .re_amp_harm(&mut self.wave, frequency, amplitude, n, delta, harm_phase);
            }
            if edit.phase_changed() {
                self.synth.re_phase_harm(
                    &mut self.wave,
                    frequency,
                    amplitude,
                    n,
                    edit.current.amplitude,
                    harmonic_phase(phase, edit.previous.phase),
                    harmonic_phase(phase, edit.current.phase),
                );
            }
        }
        for &(n, h) in &diff.added {
            let harm_phase = harmonic_phase(phase, h.phase);
            self.synth
                .add_harm(&mut self.wave, frequency, amplitude, n, h.amplitude, harm_phase);
        }

        trace!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            edited = diff.edited.len(),
            "Patched buffer"
        );
        self.previous = self.harmonics.clone();
        true
    }

    /// Forces a full recompute after `recalc_max` idle ticks of playback so
    /// incremental rounding error cannot build up indefinitely.
    fn safety_net(&mut self) -> TickOutcome {
        if !self.playback.is_playing() {
            self.idle_ticks = 0;
            return TickOutcome::Unchanged;
        }
        self.idle_ticks += 1;
        if self.idle_ticks < self.recalc_max {
            return TickOutcome::Unchanged;
        }
        self.idle_ticks = 0;

        self.synth.synthesize(
            &mut self.scratch,
            self.frequency,
            self.amplitude,
            &self.harmonics,
            self.phase,
        );
        let changed = self.scratch != self.wave;
        if changed {
            std::mem::swap(&mut self.scratch, &mut self.wave);
        }
        debug!(changed, "Recalc");
        TickOutcome::Recalculated { changed }
    }

    fn rebase(&mut self, anchor: Option<usize>) {
        self.epoch += 1;
        self.anchor = anchor;
    }

    fn publish(&self) {
        let generation = self.playback.publish(&self.wave, self.loop_len, self.epoch, self.anchor);
        trace!(generation, epoch = self.epoch, "Published buffer");
    }

    fn note_clipping(&mut self) {
        let clipping = self.playback.is_clipping();
        if clipping != self.was_clipping {
            if clipping {
                warn!("Output is clipping");
            } else {
                info!("Output no longer clipping");
            }
            self.was_clipping = clipping;
        }
    }
}
