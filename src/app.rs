// ============================================================================
// APP — eframe shell: menus, side panels, viewport and canvas input
// ============================================================================

use eframe::egui;
use egui::{Color32, ColorImage, PointerButton, Rect, RichText, Sense, TextureHandle, TextureOptions};
use glam::Vec2;

use crate::components::{ArrowsPanel, LayerAppAction, LayersPanel};
use crate::editor::Editor;
use crate::error::{Error, Result};
use crate::gpu;
use crate::io;
use crate::settings::Settings;

const CLEAR_COLOR: [f32; 4] = [0.11, 0.11, 0.12, 1.0];
/// egui reports roughly this many points per wheel notch.
const POINTS_PER_NOTCH: f32 = 50.0;

pub struct NormalMakerApp {
    editor: Editor,
    settings: Settings,
    layers_panel: LayersPanel,
    arrows_panel: ArrowsPanel,
    viewport_texture: Option<TextureHandle>,
    status: Option<(String, bool)>,
    settings_saved: bool,
}

impl NormalMakerApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = Settings::load();
        let backend = match gpu::open_backend(false, &settings.preferred_gpu) {
            Ok(b) => b,
            Err(e) => fatal(&e),
        };
        let mut app = Self {
            editor: Editor::new(backend, &settings),
            settings,
            layers_panel: LayersPanel::default(),
            arrows_panel: ArrowsPanel,
            viewport_texture: None,
            status: None,
            settings_saved: false,
        };

        if let Some(path) = app.settings.last_project.clone()
            && path.exists()
        {
            let result = app.editor.open_project(&path);
            app.report(result, format!("Opened {}", path.display()));
        }
        app
    }

    /// Fatal errors end the session; the rest become the status line.
    fn report<T>(&mut self, result: Result<T>, success: impl Into<String>) -> Option<T> {
        match result {
            Ok(v) => {
                self.status = Some((success.into(), false));
                Some(v)
            }
            Err(e) if e.is_fatal() => {
                self.save_settings();
                fatal(&e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "action failed");
                self.status = Some((e.to_string(), true));
                None
            }
        }
    }

    fn save_settings(&mut self) {
        self.editor.store_settings(&mut self.settings);
        if let Err(e) = self.settings.save() {
            tracing::warn!(error = %e, "could not save settings");
        }
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    fn import_image(&mut self) {
        if let Some(path) = io::pick_image_to_import() {
            let result = self.editor.import_image(&path);
            self.report(result, format!("Imported {}", path.display()));
        }
    }

    fn open_project(&mut self) {
        if let Some(path) = io::pick_project_to_open() {
            let result = self.editor.open_project(&path);
            self.report(result, format!("Opened {}", path.display()));
        }
    }

    fn save_project(&mut self, save_as: bool) {
        let path = match (&self.editor.project.path, save_as) {
            (Some(p), false) => Some(p.clone()),
            (current, _) => io::pick_project_to_save(current.as_deref()),
        };
        if let Some(path) = path {
            let result = self.editor.save_project(&path);
            self.report(result, format!("Saved {}", path.display()));
        }
    }

    fn export_png(&mut self) {
        if let Some(path) = io::pick_png_to_export() {
            let result = self.editor.export_png(&path);
            self.report(result, format!("Exported {}", path.display()));
        }
    }

    fn run_layer_action(&mut self, action: LayerAppAction) {
        match action {
            LayerAppAction::ImportFromFile => self.import_image(),
            LayerAppAction::NewLayer => {
                let result = self.editor.new_layer();
                self.report(result, "Layer added");
            }
            LayerAppAction::CalculateNormals => {
                let result = self.editor.calculate_normals();
                self.report(result, "Normals calculated");
            }
        }
    }

    // ========================================================================
    // PANELS
    // ========================================================================

    fn show_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("Project", |ui| {
                    if ui.button("New").clicked() {
                        self.editor.new_project();
                        self.status = Some(("New project".into(), false));
                        ui.close_menu();
                    }
                    if ui.button("Open…").clicked() {
                        ui.close_menu();
                        self.open_project();
                    }
                    if ui.button("Save").clicked() {
                        ui.close_menu();
                        self.save_project(false);
                    }
                    if ui.button("Save As…").clicked() {
                        ui.close_menu();
                        self.save_project(true);
                    }
                });
                ui.menu_button("Image", |ui| {
                    if ui.button("Import…").clicked() {
                        ui.close_menu();
                        self.import_image();
                    }
                    let can_export = !self.editor.store.is_empty();
                    if ui
                        .add_enabled(can_export, egui::Button::new("Export PNG…"))
                        .clicked()
                    {
                        ui.close_menu();
                        self.export_png();
                    }
                });
            });
        });
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some((msg, is_error)) = &self.status {
                    let color = if *is_error { Color32::LIGHT_RED } else { Color32::GRAY };
                    ui.label(RichText::new(msg).color(color));
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(
                        RichText::new(self.editor.store.backend_name())
                            .size(11.0)
                            .color(Color32::GRAY),
                    );
                    if let Some((w, h)) = self.editor.canvas() {
                        ui.label(RichText::new(format!("{w}×{h}")).size(11.0));
                    }
                });
            });
        });
    }

    fn show_side_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("side_panel")
            .default_width(300.0)
            .resizable(true)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    egui::CollapsingHeader::new("Scene")
                        .default_open(true)
                        .show(ui, |ui| self.show_scene(ui));
                    egui::CollapsingHeader::new("Brush")
                        .default_open(true)
                        .show(ui, |ui| self.show_brush(ui));
                    egui::CollapsingHeader::new("Layers")
                        .default_open(true)
                        .show(ui, |ui| self.layers_panel.show(ui, &mut self.editor));
                    egui::CollapsingHeader::new("Normal Arrows")
                        .default_open(true)
                        .show(ui, |ui| self.arrows_panel.show(ui, &mut self.editor));
                });
            });

        if let Some(action) = self.layers_panel.pending_app_action.take() {
            self.run_layer_action(action);
        }
    }

    fn show_scene(&mut self, ui: &mut egui::Ui) {
        let canvas = self.editor.project.canvas;
        let camera = &mut self.editor.camera;
        let mut pos = camera.position;
        let mut zoom = camera.zoom;
        ui.horizontal(|ui| {
            ui.label("Camera");
            let x = ui.add(egui::DragValue::new(&mut pos.x).speed(1.0)).changed();
            let y = ui.add(egui::DragValue::new(&mut pos.y).speed(1.0)).changed();
            if x || y {
                camera.set_position(pos);
            }
        });
        ui.horizontal(|ui| {
            ui.label("Zoom");
            if ui
                .add(egui::DragValue::new(&mut zoom).speed(1.0).clamp_range(
                    crate::camera::MIN_ZOOM..=crate::camera::MAX_ZOOM,
                ))
                .changed()
            {
                camera.set_zoom(zoom);
            }
            if let Some(canvas) = canvas
                && ui.button("Frame").clicked()
            {
                camera.frame_canvas(canvas);
            }
        });
        ui.horizontal(|ui| {
            ui.label("Grid depth");
            ui.add(egui::Slider::new(&mut self.editor.grid_depth, 0.0..=500.0));
        });
    }

    fn show_brush(&mut self, ui: &mut egui::Ui) {
        let brush = &mut self.editor.brush;
        ui.horizontal(|ui| {
            ui.label("Radius");
            ui.add(egui::Slider::new(&mut brush.radius, 1..=200));
        });
        ui.horizontal(|ui| {
            ui.label("Color");
            ui.color_edit_button_rgba_unmultiplied(&mut brush.color);
        });
        ui.checkbox(&mut brush.normal, "Normal brush");
        ui.checkbox(&mut brush.eraser, "Eraser");
        if self.editor.selected_layer().is_none() {
            ui.label(
                RichText::new("Select a normal layer to paint.")
                    .size(11.0)
                    .color(Color32::GRAY),
            );
        }
    }

    // ========================================================================
    // VIEWPORT
    // ========================================================================

    fn show_viewport(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                let response = ui.allocate_rect(rect, Sense::click_and_drag());
                self.handle_canvas_input(ctx, rect, &response);

                let ppp = ctx.pixels_per_point();
                let size = (
                    (rect.width() * ppp).round().max(0.0) as u32,
                    (rect.height() * ppp).round().max(0.0) as u32,
                );
                let frame = self.editor.render_frame(size, CLEAR_COLOR);
                let Some(Some(image)) = self.report_frame(frame) else {
                    return;
                };
                let color_image = ColorImage::from_rgba_unmultiplied(
                    [image.width as usize, image.height as usize],
                    &image.pixels,
                );
                match &mut self.viewport_texture {
                    Some(t) => t.set(color_image, TextureOptions::NEAREST),
                    None => {
                        self.viewport_texture = Some(ctx.load_texture(
                            "viewport",
                            color_image,
                            TextureOptions::NEAREST,
                        ))
                    }
                }
                let Some(texture) = &self.viewport_texture else {
                    return;
                };
                let uv = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
                ui.painter().image(texture.id(), rect, uv, Color32::WHITE);
            });
    }

    /// Frame errors never touch the status line unless they are fatal.
    fn report_frame<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) if e.is_fatal() => {
                self.save_settings();
                fatal(&e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "viewport render failed");
                None
            }
        }
    }

    fn handle_canvas_input(&mut self, ctx: &egui::Context, rect: Rect, response: &egui::Response) {
        let origin = Vec2::new(rect.min.x, rect.min.y);
        let size = Vec2::new(rect.width(), rect.height());
        let (scroll, primary_down, secondary_pressed, secondary_down, secondary_released, dt) =
            ctx.input(|i| {
                (
                    i.scroll_delta.y,
                    i.pointer.primary_down(),
                    i.pointer.secondary_pressed(),
                    i.pointer.secondary_down(),
                    i.pointer.secondary_released(),
                    i.stable_dt,
                )
            });

        // WASD pan, unless a text field has focus.
        if !ctx.wants_keyboard_input() {
            let dir = ctx.input(|i| {
                let mut d = Vec2::ZERO;
                if i.key_down(egui::Key::W) {
                    d.y -= 1.0;
                }
                if i.key_down(egui::Key::S) {
                    d.y += 1.0;
                }
                if i.key_down(egui::Key::A) {
                    d.x -= 1.0;
                }
                if i.key_down(egui::Key::D) {
                    d.x += 1.0;
                }
                d
            });
            if self.editor.camera.keyboard_pan(dir, dt) {
                ctx.request_repaint();
            }
        }

        if response.dragged_by(PointerButton::Middle) {
            let delta = response.drag_delta();
            let scale = self.editor.camera.canvas_per_pixel(rect.height());
            self.editor.camera.pan(-Vec2::new(delta.x, delta.y) * scale);
        }

        let Some(hover) = response.hover_pos() else {
            if secondary_released {
                self.editor.end_arrow();
            }
            return;
        };
        if scroll != 0.0 {
            self.editor.camera.zoom_by(scroll / POINTS_PER_NOTCH);
        }

        let point = self
            .editor
            .camera
            .screen_to_canvas(Vec2::new(hover.x, hover.y), origin, size);

        if primary_down && response.is_pointer_button_down_on() {
            if let Err(e) = self.editor.paint_at(point) {
                self.report::<()>(Err(e), "");
            }
        }

        if secondary_pressed {
            let result = self.editor.begin_arrow(point);
            self.report(result, "Arrow placed");
        } else if secondary_down && self.editor.is_dragging_arrow() {
            self.editor.drag_arrow(point);
        }
        if secondary_released {
            self.editor.end_arrow();
        }
    }
}

impl eframe::App for NormalMakerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(self.editor.project.title()));

        if ctx.input(|i| i.viewport().close_requested()) && !self.settings_saved {
            self.save_settings();
            self.settings_saved = true;
        }

        self.show_menu_bar(ctx);
        self.show_status_bar(ctx);
        self.show_side_panel(ctx);
        self.show_viewport(ctx);
    }
}

/// Log a session-ending error and exit.
fn fatal(e: &Error) -> ! {
    tracing::error!(error = %e, "fatal error, exiting");
    eprintln!("fatal: {e}");
    std::process::exit(1)
}
