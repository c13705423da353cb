mod audio;
mod config;
mod diff;
mod engine;
mod error;
mod harmonics;
mod preset;
mod state;
mod synth;
mod ui;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::engine::{EditEngine, EngineConfig};
use crate::state::AppState;

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level()).init();

    let (sample_rate, audio_available) = match audio::open_output() {
        Ok((_, config)) => (config.sample_rate.0, true),
        Err(e) => {
            warn!("{}; continuing without sound at {} Hz", e, args.sample_rate);
            (args.sample_rate, false)
        }
    };

    let engine = EditEngine::new(EngineConfig::from_args(&args, sample_rate as f32));
    let state = AppState::new(engine);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return;
        }
    };
    runtime.spawn(engine::run_edit_loop(Arc::clone(&state), args.tick_rate));
    if audio_available {
        runtime.spawn(audio::run_audio_output(Arc::clone(&state), sample_rate));
    }

    if args.headless {
        state.with_engine(EditEngine::play);
        info!("Playing... Press Enter to stop.");
        let _ = std::io::stdin().read_line(&mut String::new());
    } else if let Err(e) = ui::run_ui(Arc::clone(&state)) {
        error!("UI exited with an error: {}", e);
    }

    state.shutdown.store(true, Ordering::Relaxed);
    runtime.shutdown_timeout(Duration::from_secs(1));
}
