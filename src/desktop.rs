use std::time::Instant;

use eframe::egui;

use crate::config::{ConfigUpdate, MAX_RESOLUTION, SOFTWARE_DYE_RESOLUTION, SimulationConfig};
use crate::context::DrawingSurface;
use crate::cursor::SplashCursor;
use crate::driver::QueuedScheduler;
use crate::error::Result;
use crate::events::{PointerEvent, Touch};
use crate::export::to_rgba8;
use crate::software::SoftwareSurface;

const CONFIG_KEY: &str = "splash-fluid-config";

/// A surface whose layout the desktop window controls.
pub trait HostSurface: DrawingSurface {
    fn set_layout(&mut self, width: f32, height: f32, pixel_ratio: f32);
}

impl HostSurface for SoftwareSurface {
    fn set_layout(&mut self, width: f32, height: f32, pixel_ratio: f32) {
        self.set_client_size(width, height);
        self.set_pixel_ratio(pixel_ratio);
    }
}

#[cfg(feature = "gpu")]
impl HostSurface for crate::gpu::HeadlessSurface {
    fn set_layout(&mut self, width: f32, height: f32, _pixel_ratio: f32) {
        self.set_client_size(width, height);
    }
}

pub struct DesktopApp<S: HostSurface> {
    cursor: SplashCursor<S, QueuedScheduler>,
    started: Instant,
    texture: Option<egui::TextureHandle>,
    settings: SimulationConfig,
    show_settings: bool,
    frame_count: usize,
    max_dye_resolution: u32,
}

impl DesktopApp<SoftwareSurface> {
    /// Restore the last session's configuration if one was persisted.
    pub fn new(cc: &eframe::CreationContext<'_>, config: SimulationConfig) -> Result<Self> {
        let mut config: SimulationConfig = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, CONFIG_KEY))
            .unwrap_or(config);
        config.restrict_to_software();
        let mut app = Self::with_surface(SoftwareSurface::new(800.0, 600.0), config)?;
        app.max_dye_resolution = SOFTWARE_DYE_RESOLUTION;
        Ok(app)
    }
}

impl<S: HostSurface> DesktopApp<S> {
    pub fn with_surface(surface: S, config: SimulationConfig) -> Result<Self> {
        let cursor = SplashCursor::new(surface, QueuedScheduler::new(), config)?;
        let settings = cursor.config().clone();
        Ok(Self {
            cursor,
            started: Instant::now(),
            texture: None,
            settings,
            show_settings: true,
            frame_count: 0,
            max_dye_resolution: MAX_RESOLUTION,
        })
    }

    /// Translate this frame's egui input into cursor events, relative to `rect`.
    fn forward_input(&mut self, ctx: &egui::Context, rect: egui::Rect) {
        let events = ctx.input(|i| i.events.clone());
        let local = |pos: egui::Pos2| (pos.x - rect.left(), pos.y - rect.top());

        for event in events {
            let translated = match event {
                egui::Event::PointerButton {
                    pos,
                    button: egui::PointerButton::Primary,
                    pressed,
                    ..
                } => {
                    if pressed && rect.contains(pos) {
                        let (x, y) = local(pos);
                        Some(PointerEvent::MouseDown { x, y })
                    } else if !pressed {
                        Some(PointerEvent::MouseUp)
                    } else {
                        None
                    }
                }
                egui::Event::PointerMoved(pos) => {
                    let (x, y) = local(pos);
                    Some(PointerEvent::MouseMove { x, y })
                }
                egui::Event::Touch { id, phase, pos, .. } => {
                    let (x, y) = local(pos);
                    let touches = vec![Touch { id: id.0 as i64, x, y }];
                    match phase {
                        egui::TouchPhase::Start => Some(PointerEvent::TouchStart(touches)),
                        egui::TouchPhase::Move => Some(PointerEvent::TouchMove(touches)),
                        egui::TouchPhase::End | egui::TouchPhase::Cancel => Some(PointerEvent::TouchEnd(touches)),
                    }
                }
                _ => None,
            };
            if let Some(event) = translated {
                self.cursor.handle_event(&event);
            }
        }
    }

    fn settings_panel(&mut self, ui: &mut egui::Ui) {
        let max_dye = self.max_dye_resolution.max(128);
        let s = &mut self.settings;
        ui.heading("Simulation");
        ui.add(egui::Slider::new(&mut s.sim_resolution, 32..=256).text("Sim resolution"));
        ui.add(egui::Slider::new(&mut s.dye_resolution, 128..=max_dye.min(1440)).text("Dye resolution"));
        ui.add(egui::Slider::new(&mut s.density_dissipation, 0.0..=10.0).text("Density dissipation"));
        ui.add(egui::Slider::new(&mut s.velocity_dissipation, 0.0..=10.0).text("Velocity dissipation"));
        ui.add(egui::Slider::new(&mut s.pressure, 0.0..=1.0).text("Pressure"));
        ui.add(egui::Slider::new(&mut s.pressure_iterations, 1..=60).text("Pressure iterations"));
        ui.add(egui::Slider::new(&mut s.curl, 0.0..=50.0).text("Curl"));
        ui.add(egui::Slider::new(&mut s.splat_radius, 0.01..=1.0).text("Splat radius"));
        ui.add(egui::Slider::new(&mut s.splat_force, 100.0..=20000.0).text("Splat force"));
        ui.add(egui::Slider::new(&mut s.color_update_speed, 0.0..=50.0).text("Color speed"));
        ui.checkbox(&mut s.shading, "Shading");
        ui.checkbox(&mut s.transparent, "Transparent");
        ui.checkbox(&mut s.paused, "Paused");

        let mut back = [s.back_color.r, s.back_color.g, s.back_color.b];
        ui.horizontal(|ui| {
            ui.label("Back color");
            ui.color_edit_button_rgb(&mut back);
        });
        s.back_color = crate::config::Color::new(back[0], back[1], back[2]);

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button(if self.cursor.is_running() { "Stop" } else { "Start" }).clicked() {
                if self.cursor.is_running() {
                    self.cursor.stop();
                } else {
                    self.cursor.start();
                }
            }
            if ui.button("Reset").clicked() {
                self.settings = SimulationConfig::default();
            }
        });

        self.settings.dye_resolution = self.settings.dye_resolution.min(self.max_dye_resolution);
        if &self.settings != self.cursor.config() {
            let change = self.cursor.update_config(&ConfigUpdate::from(&self.settings));
            if change.resolution {
                log::info!("field resolution changed");
            }
            // Options the context cannot honour come back restricted.
            self.settings = self.cursor.config().clone();
        }
    }

    fn paint(&mut self, ctx: &egui::Context, ui: &mut egui::Ui, rect: egui::Rect) {
        ui.painter().rect_filled(rect, 0.0, egui::Color32::BLACK);
        let Some(snapshot) = self.cursor.read_surface() else {
            return;
        };
        let size = [snapshot.width as usize, snapshot.height as usize];
        let image = egui::ColorImage::from_rgba_premultiplied(size, to_rgba8(&snapshot).as_raw());
        if let Some(texture) = &mut self.texture {
            texture.set(image, egui::TextureOptions::LINEAR);
        } else {
            self.texture = Some(ctx.load_texture("splash-surface", image, egui::TextureOptions::LINEAR));
        }
        if let Some(texture) = &self.texture {
            let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            ui.painter().image(texture.id(), rect, uv, egui::Color32::WHITE);
        }
    }
}

impl<S: HostSurface> eframe::App for DesktopApp<S> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.show_settings {
            egui::SidePanel::right("settings").show(ctx, |ui| self.settings_panel(ui));
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                self.cursor
                    .surface_mut()
                    .set_layout(rect.width(), rect.height(), ctx.pixels_per_point());
                self.forward_input(ctx, rect);

                if !self.cursor.scheduler_mut().fire().is_empty() {
                    self.cursor.tick(self.started.elapsed());
                    self.frame_count += 1;
                }

                self.paint(ctx, ui, rect);

                ui.painter().text(
                    rect.left_bottom() + egui::vec2(8.0, -8.0),
                    egui::Align2::LEFT_BOTTOM,
                    format!("Frame: {} | Move or click to splash | Tab: settings", self.frame_count),
                    egui::FontId::monospace(12.0),
                    egui::Color32::from_gray(160),
                );
            });

        if ctx.input(|i| i.key_pressed(egui::Key::Tab)) {
            self.show_settings = !self.show_settings;
        }

        ctx.request_repaint();
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, CONFIG_KEY, self.cursor.config());
    }
}

/// Shown instead of the simulation when no rendering context could be created.
pub struct StartupError {
    pub message: String,
}

impl eframe::App for StartupError {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("splash-fluid could not start");
            ui.label(&self.message);
        });
    }
}

pub fn run(config: SimulationConfig) -> std::result::Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 700.0])
            .with_title("splash-fluid"),
        ..Default::default()
    };

    eframe::run_native(
        "splash-fluid",
        options,
        Box::new(move |cc| match DesktopApp::new(cc, config) {
            Ok(app) => Box::new(app) as Box<dyn eframe::App>,
            Err(err) => {
                log::error!("{}", err);
                Box::new(StartupError {
                    message: err.to_string(),
                })
            }
        }),
    )
}
