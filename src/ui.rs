use std::sync::Arc;
use eframe::{App, CreationContext};
use egui::{CentralPanel, Color32, ComboBox, Context, DragValue, Key, ScrollArea, Slider, Ui};
use egui_plot::{Line, Plot, PlotBounds, PlotPoints};
use tracing::info;
use crate::config::{MAX_AMPLITUDE, MAX_FREQUENCY, MIN_FREQUENCY};
use crate::engine::EditEngine;
use crate::preset::Preset;
use crate::state::AppState;

/// Sliders, phase dials and a plot of the current waveform.
pub struct HarmonicApp {
    state: Arc<AppState>,
    /// Number of samples shown in the plot.
    zoom: usize,
}

impl HarmonicApp {
    pub fn new(state: Arc<AppState>) -> Self {
        let zoom = state.playback.latest().samples.len();
        Self { state, zoom }
    }
}

impl App for HarmonicApp {
    fn update(&mut self, ctx: &Context, _: &mut eframe::Frame) {
        ctx.request_repaint();

        let (toggle, add, remove) = ctx.input(|i| {
            (
                i.key_pressed(Key::Space),
                i.key_pressed(Key::ArrowUp),
                i.key_pressed(Key::ArrowDown),
            )
        });
        let latest = self.state.playback.latest();

        CentralPanel::default().show(ctx, |ui| {
            ui.heading("Harmonic Playground");

            self.state.with_engine(|engine| {
                if toggle {
                    engine.toggle_playback();
                }
                if add {
                    engine.add_harmonic();
                }
                if remove {
                    engine.remove_harmonic();
                }
                wave_controls(ui, engine);
                ui.separator();
                harmonic_controls(ui, engine);
            });

            ui.separator();
            let len = latest.samples.len();
            ui.add(Slider::new(&mut self.zoom, 16..=len.max(16)).logarithmic(true).text("Zoom [samples]"));

            let plot = Plot::new("Waveform")
                .view_aspect(2.0)
                .show_axes([true, true]);

            plot.show(ui, |plot_ui| {
                let points: Vec<_> = latest.samples.iter()
                    .take(self.zoom)
                    .enumerate()
                    .map(|(i, &v)| [i as f64, v as f64])
                    .collect();

                plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                    [0.0, -1.1],
                    [self.zoom as f64, 1.1],
                ));
                plot_ui.line(Line::new(PlotPoints::from(points)));
            });
        });
    }
}

fn wave_controls(ui: &mut Ui, engine: &mut EditEngine) {
    ui.horizontal(|ui| {
        let label = if engine.is_playing() { "Stop" } else { "Play" };
        if ui.button(label).clicked() {
            engine.toggle_playback();
        }
        if engine.is_clipping() {
            ui.colored_label(Color32::RED, "Clipping!");
        }
        ui.label(format!("loop {} samples, phase {:.3}", engine.loop_len(), engine.phase()));
    });

    let mut frequency = engine.frequency();
    if ui
        .add(Slider::new(&mut frequency, MIN_FREQUENCY..=MAX_FREQUENCY).logarithmic(true).text("Frequency [Hz]"))
        .changed()
    {
        engine.set_frequency(frequency);
    }

    let mut amplitude = engine.amplitude();
    if ui.add(Slider::new(&mut amplitude, 0.0..=MAX_AMPLITUDE).text("Amplitude")).changed() {
        engine.set_amplitude(amplitude);
    }

    ui.horizontal(|ui| {
        let current = engine.preset();
        ComboBox::from_label("Preset")
            .selected_text(current.label())
            .show_ui(ui, |ui| {
                for preset in Preset::ALL {
                    if ui.selectable_label(preset == current, preset.label()).clicked() {
                        engine.select_preset(preset);
                    }
                }
            });
        if ui.button("Apply to all").clicked() {
            engine.apply_preset();
        }
    });

    ui.horizontal(|ui| {
        if ui.button("Add harmonic").clicked() {
            engine.add_harmonic();
        }
        if ui.button("Remove harmonic").clicked() {
            engine.remove_harmonic();
        }
        if ui.button("Print harmonics").clicked() {
            info!("{}", engine.describe());
        }
    });
}

fn harmonic_controls(ui: &mut Ui, engine: &mut EditEngine) {
    let harmonics: Vec<_> = engine.harmonics().iter().collect();

    ScrollArea::horizontal().show(ui, |ui| {
        ui.horizontal(|ui| {
            for (n, harmonic) in harmonics {
                ui.vertical(|ui| {
                    ui.label(n.to_string());

                    let mut amplitude = harmonic.amplitude;
                    if ui.add(Slider::new(&mut amplitude, 0.0..=1.0).vertical()).changed() {
                        engine.set_harmonic_amplitude(n, amplitude);
                    }

                    let mut phase = harmonic.phase;
                    let dial = DragValue::new(&mut phase).range(0.0..=1.0).speed(0.002).max_decimals(3);
                    if ui.add(dial).changed() {
                        engine.set_harmonic_phase(n, phase);
                    }

                    if ui.small_button("Reset").clicked() {
                        engine.reset_harmonic(n);
                    }
                });
            }
        });
    });
}

/// Initializes and runs the eframe application.
pub fn run_ui(state: Arc<AppState>) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Harmonic Playground",
        options,
        Box::new(|_cc: &CreationContext| Ok(Box::new(HarmonicApp::new(state.clone())))),
    )
}
