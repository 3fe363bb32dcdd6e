use eframe::egui;
use egui::{Color32, Id, RichText};

use crate::editor::Editor;
use crate::io::MAX_LAYER_OFFSET;

const POSITION_RANGE: std::ops::RangeInclusive<i32> = -MAX_LAYER_OFFSET..=MAX_LAYER_OFFSET;

/// Actions that need app-level handling (file dialogs, fallible passes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerAppAction {
    ImportFromFile,
    NewLayer,
    CalculateNormals,
}

#[derive(Default)]
struct RenameState {
    renaming_layer: Option<usize>,
    rename_text: String,
}

#[derive(Default)]
pub struct LayersPanel {
    rename_state: RenameState,
    pub pending_app_action: Option<LayerAppAction>,
}

impl LayersPanel {
    /// Main show method - renders the entire layers panel
    pub fn show(&mut self, ui: &mut egui::Ui, editor: &mut Editor) {
        ui.vertical(|ui| {
            self.show_layer_list(ui, editor);
            ui.add_space(4.0);
            self.show_footer_toolbar(ui, editor);
        });
    }

    fn show_layer_list(&mut self, ui: &mut egui::Ui, editor: &mut Editor) {
        let mut delete = None;
        let mut swap = None;
        let count = editor.store.len();

        egui::ScrollArea::vertical()
            .id_source("layer_list")
            .max_height(ui.available_height() - 40.0)
            .show(ui, |ui| {
                // Frontmost (last in store order) at the top.
                for index in (0..count).rev() {
                    let Some(layer) = editor.store.layer(index) else {
                        continue;
                    };
                    let selected = editor.selected_layer() == Some(index);
                    let is_normal = layer.is_normal;
                    let name = layer.name.clone();

                    egui::Frame::group(ui.style()).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            if self.rename_state.renaming_layer == Some(index) {
                                let resp = ui.text_edit_singleline(&mut self.rename_state.rename_text);
                                if resp.lost_focus() {
                                    let text = std::mem::take(&mut self.rename_state.rename_text);
                                    if !text.trim().is_empty()
                                        && let Some(l) = editor.store.layer_mut(index)
                                    {
                                        l.name = text;
                                        editor.project.mark_dirty();
                                    }
                                    self.rename_state.renaming_layer = None;
                                }
                            } else {
                                let label = if is_normal {
                                    RichText::new(format!("{name}  [N]"))
                                } else {
                                    RichText::new(&name)
                                };
                                let resp = ui.selectable_label(selected, label);
                                if resp.clicked() {
                                    if selected {
                                        editor.deselect_layer();
                                    } else {
                                        editor.select_layer(index);
                                    }
                                }
                                if resp.double_clicked() {
                                    self.rename_state.renaming_layer = Some(index);
                                    self.rename_state.rename_text = name.clone();
                                }
                                if !is_normal {
                                    resp.on_hover_text("Only normal layers can be selected");
                                }
                            }

                            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                                if ui.small_button("🗑").on_hover_text("Delete layer").clicked() {
                                    delete = Some(index);
                                }
                                if index > 0 && ui.small_button("⏷").clicked() {
                                    swap = Some((index, index - 1));
                                }
                                if index + 1 < count && ui.small_button("⏶").clicked() {
                                    swap = Some((index, index + 1));
                                }
                            });
                        });
                        self.show_layer_properties(ui, editor, index);
                    });
                }
            });

        if let Some((from, to)) = swap {
            editor.move_layer(from, to);
        }
        if let Some(index) = delete {
            editor.delete_layer(index);
        }
    }

    fn show_layer_properties(&mut self, ui: &mut egui::Ui, editor: &mut Editor, index: usize) {
        let Some(layer) = editor.store.layer_mut(index) else {
            return;
        };
        let mut changed = false;
        ui.push_id(Id::new(("layer_props", index)), |ui| {
            ui.horizontal(|ui| {
                ui.label("Pos");
                for v in [&mut layer.position.x, &mut layer.position.y] {
                    changed |= ui
                        .add(egui::DragValue::new(v).speed(1.0).clamp_range(POSITION_RANGE))
                        .changed();
                }
                ui.label("Z");
                changed |= ui
                    .add(egui::DragValue::new(&mut layer.z_offset).speed(0.1))
                    .changed();
            });
            ui.horizontal(|ui| {
                ui.label("Alpha");
                changed |= ui
                    .add(egui::Slider::new(&mut layer.alpha, 0.0..=1.0).fixed_decimals(2))
                    .changed();
            });
        });
        if changed {
            editor.project.mark_dirty();
        }
    }

    fn show_footer_toolbar(&mut self, ui: &mut egui::Ui, editor: &mut Editor) {
        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Import…").clicked() {
                self.pending_app_action = Some(LayerAppAction::ImportFromFile);
            }
            if ui
                .add_enabled(editor.can_add_layer(), egui::Button::new("New"))
                .on_hover_text("Blank normal layer of canvas size")
                .clicked()
            {
                self.pending_app_action = Some(LayerAppAction::NewLayer);
            }
            if editor.can_calculate_normals() && ui.button("Calculate Normals").clicked() {
                self.pending_app_action = Some(LayerAppAction::CalculateNormals);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let count_text = format!("{}", editor.store.len());
                ui.label(RichText::new(count_text).size(11.0).color(Color32::GRAY));
            });
        });
    }
}
