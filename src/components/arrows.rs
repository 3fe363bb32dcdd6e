use eframe::egui;
use egui::{Color32, RichText};

use crate::arrows::{MAX_ANGLE_DEG, MAX_ARROWS, MIN_ANGLE_DEG};
use crate::editor::Editor;

/// Arrow list with orientation / inclination editing for the selection.
#[derive(Default)]
pub struct ArrowsPanel;

impl ArrowsPanel {
    pub fn show(&mut self, ui: &mut egui::Ui, editor: &mut Editor) {
        ui.label(
            RichText::new("Right-click the canvas to place an arrow, drag to aim it.")
                .size(11.0)
                .color(Color32::GRAY),
        );

        let mut remove = None;
        egui::ScrollArea::vertical()
            .id_source("arrow_list")
            .max_height(160.0)
            .show(ui, |ui| {
                for index in 0..editor.arrows.len() {
                    let selected = editor.arrows.selected() == Some(index);
                    ui.horizontal(|ui| {
                        if ui.selectable_label(selected, format!("Arrow {index}")).clicked() {
                            editor.select_arrow(index);
                        }
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.small_button("✖").clicked() {
                                remove = Some(index);
                            }
                        });
                    });
                }
            });
        if let Some(index) = remove {
            editor.remove_arrow(index);
        }

        if let Some(index) = editor.arrows.selected() {
            ui.separator();
            let mut orientation = editor.arrows.orientation_degrees(index).unwrap_or(0.0);
            let mut angle = editor.arrows.angle_degrees(index).unwrap_or(MIN_ANGLE_DEG);
            ui.horizontal(|ui| {
                ui.label("Orientation");
                if ui
                    .add(egui::Slider::new(&mut orientation, 0.0..=359.9).suffix("°"))
                    .changed()
                {
                    editor.set_arrow_orientation(index, orientation);
                }
            });
            ui.horizontal(|ui| {
                ui.label("Angle");
                if ui
                    .add(egui::Slider::new(&mut angle, MIN_ANGLE_DEG..=MAX_ANGLE_DEG).suffix("°"))
                    .changed()
                {
                    editor.set_arrow_angle(index, angle);
                }
            });
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!editor.arrows.is_empty(), egui::Button::new("Clear Normal Arrows"))
                .clicked()
            {
                editor.clear_arrows();
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    RichText::new(format!("{}/{MAX_ARROWS}", editor.arrows.len()))
                        .size(11.0)
                        .color(Color32::GRAY),
                );
            });
        });
    }
}
