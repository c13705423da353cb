use std::sync::Arc;
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample, StreamConfig,
};
use crate::error::{AudioError, AudioResult};
use crate::state::{AppState, LoopBuffer, Playback};
use tracing::{error, info, warn};

/// Number of samples holding the largest whole number of periods of
/// `frequency` that fits in `graph_len`. Looping at this length has no seam.
pub fn loop_length(frequency: f32, graph_len: usize, sample_rate: f32) -> usize {
    let periods = (frequency * graph_len as f32 / sample_rate).floor();
    if periods < 1.0 {
        return graph_len;
    }
    ((periods * (sample_rate / frequency)).round() as usize).clamp(1, graph_len)
}

/// Looks up the default output device and its stream configuration.
pub fn open_output() -> AudioResult<(cpal::Device, StreamConfig)> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoOutputDevice)?;
    info!("Default output device found: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));

    let supported_config = device.default_output_config()?;
    let config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    Ok((device, config))
}

/// Starts the audio output task
pub async fn run_audio_output(state: Arc<AppState>, expected_rate: u32) {
    let result = tokio::task::spawn_blocking(move || {
        if let Err(e) = stream_until_shutdown(&state, expected_rate) {
            error!("Audio output stopped: {}", e);
        }
    })
    .await;

    if let Err(e) = result {
        error!("Audio output task failed: {}", e);
    }
}

fn stream_until_shutdown(state: &Arc<AppState>, expected_rate: u32) -> AudioResult<()> {
    let (device, config) = open_output()?;
    if config.sample_rate.0 != expected_rate {
        warn!(
            "Device rate {} differs from the engine rate {}; pitch will be off",
            config.sample_rate.0, expected_rate
        );
    }
    info!("Audio stream configuration: {:?}", config);

    let channels = usize::from(config.channels);
    let mut audio_loop = AudioLoop::new(Arc::clone(&state.playback));
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            audio_loop.render(data, channels);
        },
        |err| {
            error!("An error occurred on the audio stream: {}", err);
        },
        None,
    )?;

    info!("Starting audio stream...");
    stream.play()?;

    // Keep the stream alive until the app closes
    while !state.is_shutting_down() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    info!("Audio stream closed");
    Ok(())
}

/// Audio-callback side of the playback handoff: streams the loop portion
/// of the latest published buffer from a persistent cursor.
pub struct AudioLoop {
    playback: Arc<Playback>,
    current: Arc<LoopBuffer>,
    cursor: usize,
}

impl AudioLoop {
    pub fn new(playback: Arc<Playback>) -> Self {
        let current = playback.latest();
        Self {
            playback,
            current,
            cursor: 0,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Fills an interleaved output buffer, copying each sample to every
    /// channel. Never blocks on the edit engine.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        self.refresh();

        if !self.playback.is_playing() {
            data.fill(f32::EQUILIBRIUM);
            self.cursor = 0;
            self.playback.store_position(self.current.epoch, 0);
            self.playback.set_clipping(false);
            return;
        }

        let samples = &self.current.samples;
        let loop_len = self.current.loop_len.clamp(1, samples.len().max(1));
        let mut clipping = false;

        for frame in data.chunks_mut(channels.max(1)) {
            let value = samples.get(self.cursor).copied().unwrap_or(0.0);
            frame.fill(Sample::from_sample(value));
            clipping |= value.abs() > 1.0;

            self.cursor += 1;
            if self.cursor >= loop_len {
                self.cursor = 0;
            }
        }

        self.playback.store_position(self.current.epoch, self.cursor);
        self.playback.set_clipping(clipping);
    }

    /// Picks up a newer rendering if the slot is free. The replaced
    /// snapshot stays parked in `Playback`, so dropping it here never frees.
    fn refresh(&mut self) {
        let Some(latest) = self.playback.try_latest() else {
            return;
        };
        if latest.generation == self.current.generation {
            return;
        }

        if latest.epoch != self.current.epoch {
            self.cursor = match latest.anchor {
                // Resume as far past the anchor as playback has already run
                Some(anchor) => {
                    let old_len = self.current.loop_len.max(1);
                    let elapsed = (self.cursor + old_len - anchor % old_len) % old_len;
                    elapsed % latest.loop_len.max(1)
                }
                None => 0,
            };
        } else if self.cursor >= latest.loop_len {
            self.cursor = 0;
        }
        self.current = latest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonics::{Harmonic, HarmonicSet};
    use crate::state::Position;
    use crate::synth::Synthesizer;

    const RATE: f32 = 44_100.0;
    const LEN: usize = 5513;

    #[test]
    fn loop_length_holds_whole_periods() {
        for frequency in [8.0, 27.5, 100.0, 261.63, 300.0, 441.0, 499.9] {
            let len = loop_length(frequency, LEN, RATE);
            assert!(len <= LEN);

            let period = RATE / frequency;
            let periods = len as f32 / period;
            assert!(
                (periods - periods.round()).abs() * period <= 0.5 + 1e-3,
                "{frequency} Hz: {len} samples is {periods} periods"
            );
            assert!(periods.round() >= 1.0);
        }
    }

    #[test]
    fn loop_length_for_exact_divisors() {
        // 441 Hz divides 44.1 kHz into 100-sample periods
        assert_eq!(loop_length(441.0, LEN, RATE), 5500);
        assert_eq!(loop_length(8.0, LEN, RATE), 5513);
    }

    #[test]
    fn loop_length_below_one_period_uses_the_whole_buffer() {
        assert_eq!(loop_length(4.0, LEN, RATE), LEN);
        assert_eq!(loop_length(8.0, 5512, RATE), 5512);
    }

    #[test]
    fn looped_waveform_has_no_seam() {
        let synth = Synthesizer::new(RATE);
        let mut harmonics = HarmonicSet::new();
        harmonics.push(Harmonic::new(0.5, 0.1));
        harmonics.push(Harmonic::new(0.3, 0.25));

        for frequency in [261.63, 300.0, 441.0] {
            let mut wave = vec![0.0; LEN];
            synth.synthesize(&mut wave, frequency, 10.0, &harmonics, 0.0);
            let loop_len = loop_length(frequency, LEN, RATE);

            let largest_step = wave[..loop_len]
                .windows(2)
                .map(|pair| (pair[1] - pair[0]).abs())
                .fold(0.0, f32::max);
            let wrap_step = (wave[0] - wave[loop_len - 1]).abs();
            assert!(
                wrap_step <= 1.5 * largest_step,
                "{frequency} Hz: step {wrap_step} across the wrap, at most {largest_step} elsewhere"
            );
        }
    }

    fn playing(samples: &[f32], loop_len: usize) -> Arc<Playback> {
        let playback = Playback::new(samples.len());
        playback.publish(samples, loop_len, 1, None);
        playback.set_playing(true);
        playback
    }

    #[test]
    fn render_duplicates_channels_and_wraps_at_loop_length() {
        let playback = playing(&[0.1, 0.2, 0.3, 0.4, 0.5], 3);
        let mut audio = AudioLoop::new(Arc::clone(&playback));

        let mut data = [0.0; 8];
        audio.render(&mut data, 2);
        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3, 0.1, 0.1]);
        assert_eq!(playback.cursor(), 1);
        assert!(!playback.is_clipping());
    }

    #[test]
    fn render_flags_clipping_without_clamping() {
        let playback = playing(&[0.5, -1.5, 0.5], 3);
        let mut audio = AudioLoop::new(Arc::clone(&playback));

        let mut data = [0.0; 3];
        audio.render(&mut data, 1);
        assert_eq!(data, [0.5, -1.5, 0.5]);
        assert!(playback.is_clipping());

        playback.publish(&[0.5, 0.5, 0.5], 3, 1, None);
        audio.render(&mut data, 1);
        assert!(!playback.is_clipping());
    }

    #[test]
    fn stopped_output_is_silent() {
        let playback = playing(&[0.7; 4], 4);
        playback.set_playing(false);
        let mut audio = AudioLoop::new(Arc::clone(&playback));

        let mut data = [1.0; 4];
        audio.render(&mut data, 2);
        assert_eq!(data, [0.0; 4]);
        assert_eq!(audio.cursor(), 0);
    }

    #[test]
    fn plain_edits_keep_the_cursor() {
        let playback = playing(&[0.0; 10], 10);
        let mut audio = AudioLoop::new(Arc::clone(&playback));
        let mut data = [0.0; 4];
        audio.render(&mut data, 1);
        assert_eq!(audio.cursor(), 4);

        playback.publish(&[1.0; 10], 10, 1, None);
        audio.render(&mut data, 1);
        assert_eq!(data, [1.0; 4]);
        assert_eq!(audio.cursor(), 8);
    }

    #[test]
    fn restart_resets_the_cursor() {
        let playback = playing(&[0.0; 10], 10);
        let mut audio = AudioLoop::new(Arc::clone(&playback));
        let mut data = [0.0; 4];
        audio.render(&mut data, 1);
        assert_eq!(playback.position(), Position { epoch: 1, cursor: 4 });

        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        playback.publish(&samples, 10, 2, None);
        audio.render(&mut data, 1);
        assert_eq!(data, [0.0, 0.1, 0.2, 0.3]);
        assert_eq!(playback.position(), Position { epoch: 2, cursor: 4 });
    }

    #[test]
    fn anchored_rendering_resumes_past_the_anchor() {
        let playback = playing(&[0.0; 10], 10);
        let mut audio = AudioLoop::new(Arc::clone(&playback));
        let mut data = [0.0; 6];
        audio.render(&mut data, 1);
        assert_eq!(audio.cursor(), 6);

        // The engine blended against cursor 4; playback has since moved on
        // by two samples.
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        playback.publish(&samples, 8, 2, Some(4));
        let mut data = [0.0; 3];
        audio.render(&mut data, 1);
        assert_eq!(data, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn anchor_survives_a_wrap_and_a_missed_generation() {
        let playback = playing(&[0.0; 10], 10);
        let mut audio = AudioLoop::new(Arc::clone(&playback));
        let mut data = [0.0; 12];
        audio.render(&mut data, 1);
        assert_eq!(audio.cursor(), 2);

        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        playback.publish(&samples, 10, 2, Some(8));
        // A later plain edit in the same epoch still carries the anchor
        playback.publish(&samples, 10, 2, Some(8));

        let mut data = [0.0; 2];
        audio.render(&mut data, 1);
        assert_eq!(data, [4.0, 5.0]);
    }
}
