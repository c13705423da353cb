use clap::{Parser, ValueEnum};
use tracing::Level;

use crate::preset::Preset;

/// Lowest fundamental the sliders allow. Also sizes the sample buffer.
pub const MIN_FREQUENCY: f32 = 8.0;
pub const MAX_FREQUENCY: f32 = 500.0;
pub const MAX_AMPLITUDE: f32 = 10.0;

/// Maps the 0..=10 amplitude slider into a signal range that only clips
/// once several loud harmonics line up.
pub const AMPLITUDE_SCALE_FACTOR: f32 = 0.01;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Smallest sample count holding a full period of `MIN_FREQUENCY`.
pub fn graph_buffer_size(sample_rate: f32) -> usize {
    (sample_rate / MIN_FREQUENCY).ceil() as usize
}

/// Command line options.
#[derive(Debug, Clone, Parser)]
#[command(name = "harmonic_playground", about = "Compose a waveform from harmonics and listen to it")]
pub struct Args {
    /// Initial fundamental frequency in Hz.
    #[arg(short, long, default_value_t = 300.0)]
    pub frequency: f32,

    /// Initial overall amplitude (0 to 10).
    #[arg(short, long, default_value_t = MAX_AMPLITUDE)]
    pub amplitude: f32,

    /// Preset used to seed new harmonics.
    #[arg(short, long, value_enum, default_value_t = PresetArg::NSquaredFalloff)]
    pub preset: PresetArg,

    /// Sample rate used when no output device is available.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Edit ticks per second.
    #[arg(long, default_value_t = 60)]
    pub tick_rate: u32,

    /// Idle ticks during playback before a full recompute is forced.
    #[arg(long, default_value_t = 60)]
    pub recalc_max: u32,

    /// Run without a window (audio only).
    #[arg(long)]
    pub headless: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn clamped_frequency(&self) -> f32 {
        self.frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY)
    }

    pub fn clamped_amplitude(&self) -> f32 {
        self.amplitude.clamp(0.0, MAX_AMPLITUDE)
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    NFalloff,
    NSquaredFalloff,
    Saw,
    ReverseSaw,
    Triangle,
    Square,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::NFalloff => Preset::NFalloff,
            PresetArg::NSquaredFalloff => Preset::NSquaredFalloff,
            PresetArg::Saw => Preset::SawWave,
            PresetArg::ReverseSaw => Preset::ReverseSawWave,
            PresetArg::Triangle => Preset::TriangleWave,
            PresetArg::Square => Preset::SquareWave,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_buffer_holds_one_period_of_the_lowest_frequency() {
        assert_eq!(graph_buffer_size(44_100.0), 5513);
        assert_eq!(graph_buffer_size(48_000.0), 6000);
    }

    #[test]
    fn args_are_clamped_to_slider_bounds() {
        let args = Args::parse_from(["harmonic_playground", "-f", "2000", "-a", "42"]);
        assert_eq!(args.clamped_frequency(), MAX_FREQUENCY);
        assert_eq!(args.clamped_amplitude(), MAX_AMPLITUDE);

        let args = Args::parse_from(["harmonic_playground", "-f", "1"]);
        assert_eq!(args.clamped_frequency(), MIN_FREQUENCY);
    }

    #[test]
    fn preset_flag_parses() {
        let args = Args::parse_from(["harmonic_playground", "--preset", "reverse-saw", "-vv"]);
        assert_eq!(Preset::from(args.preset), Preset::ReverseSawWave);
        assert_eq!(args.log_level(), Level::TRACE);
    }
}
