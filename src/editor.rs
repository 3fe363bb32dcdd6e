// ============================================================================
// EDITOR — one open project: layers, arrows, selection, brush and camera
// ============================================================================
//
// Everything the GUI and the CLI do goes through here, so both share the same
// rules: only normal layers can be selected, the selected layer is the paint
// and normal-generation target, and the canvas size is fixed by the first
// imported image.
// ============================================================================

use std::path::{Path, PathBuf};

use glam::{IVec2, Vec2};

use crate::arrows::NormalArrows;
use crate::camera::Camera;
use crate::debug_lines::{grid_alpha, grid_lines, DebugLines};
use crate::error::{Error, Result};
use crate::gpu::{LayerBackend, ViewportImage};
use crate::io::{self, ProjectData};
use crate::layers::{BrushMode, LayerStore};
use crate::project::Project;
use crate::settings::Settings;

const GRID_LINES: usize = 0;
const ARROW_LINES: usize = 1;

const GRID_COLOR: [f32; 3] = [0.35, 0.35, 0.35];
const ARROW_COLOR: [f32; 3] = [0.2, 0.6, 1.0];
const SELECTED_ARROW_COLOR: [f32; 3] = [1.0, 0.75, 0.1];

/// Brush state as set in the Brush panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brush {
    pub radius: i32,
    pub color: [f32; 4],
    pub normal: bool,
    pub eraser: bool,
}

impl Brush {
    pub fn mode(&self) -> BrushMode {
        BrushMode::from_toggles(self.normal, self.eraser)
    }

    pub fn effective_color(&self) -> [f32; 4] {
        self.mode().color(self.color)
    }
}

pub struct Editor {
    pub store: LayerStore,
    pub arrows: NormalArrows,
    pub project: Project,
    pub camera: Camera,
    pub brush: Brush,
    pub grid_depth: f32,
    lines: [DebugLines; 2],
    selected_layer: Option<usize>,
    dragging_arrow: bool,
}

impl Editor {
    pub fn new(backend: Box<dyn LayerBackend>, settings: &Settings) -> Self {
        Self {
            store: LayerStore::new(backend),
            arrows: NormalArrows::new(),
            project: Project::new_untitled(),
            camera: Camera::new(Vec2::from(settings.camera_position), settings.camera_zoom),
            brush: Brush {
                radius: settings.brush_radius,
                color: settings.brush_color,
                normal: false,
                eraser: false,
            },
            grid_depth: settings.grid_depth,
            lines: [DebugLines::new(1.0), DebugLines::new(2.0)],
            selected_layer: None,
            dragging_arrow: false,
        }
    }

    /// Copy the persisted parts of the session back into `settings`.
    pub fn store_settings(&self, settings: &mut Settings) {
        settings.camera_position = self.camera.position.into();
        settings.camera_zoom = self.camera.zoom;
        settings.grid_depth = self.grid_depth;
        settings.brush_radius = self.brush.radius;
        settings.brush_color = self.brush.color;
        if self.project.path.is_some() {
            settings.last_project = self.project.path.clone();
        }
    }

    pub fn canvas(&self) -> Option<(u32, u32)> {
        self.project.canvas
    }

    // ========================================================================
    // LAYERS
    // ========================================================================

    pub fn import_image(&mut self, path: &Path) -> Result<()> {
        let first = self.store.add_from_image(path)?;
        if first && self.project.canvas.is_none() {
            if let Some(size) = self.store.layer(0).map(|l| l.size()) {
                self.set_canvas(size);
            }
        }
        self.project.mark_dirty();
        Ok(())
    }

    /// "New" is only offered once a canvas exists.
    pub fn can_add_layer(&self) -> bool {
        self.project.canvas.is_some_and(|(w, h)| w > 0 && h > 0)
    }

    pub fn new_layer(&mut self) -> Result<Option<usize>> {
        let Some((w, h)) = self.project.canvas.filter(|_| self.can_add_layer()) else {
            return Ok(None);
        };
        let index = self.store.add_blank(w, h)?;
        self.project.mark_dirty();
        Ok(Some(index))
    }

    pub fn delete_layer(&mut self, index: usize) -> bool {
        if self.store.remove_at(index).is_none() {
            return false;
        }
        self.deselect_layer();
        self.store.release_paint_target();
        self.project.mark_dirty();
        true
    }

    pub fn move_layer(&mut self, from: usize, to: usize) -> bool {
        if !self.store.move_layer(from, to) {
            return false;
        }
        self.selected_layer = match self.selected_layer {
            Some(s) if s == from => Some(to),
            Some(s) if from < s && s <= to => Some(s - 1),
            Some(s) if to <= s && s < from => Some(s + 1),
            other => other,
        };
        self.project.mark_dirty();
        true
    }

    pub fn selected_layer(&self) -> Option<usize> {
        self.selected_layer
    }

    /// Only normal layers can be selected.
    pub fn select_layer(&mut self, index: usize) -> bool {
        let selectable = self.store.layer(index).is_some_and(|l| l.is_normal);
        if !selectable {
            return false;
        }
        if self.selected_layer != Some(index) {
            self.deselect_layer();
            self.selected_layer = Some(index);
        }
        true
    }

    pub fn deselect_layer(&mut self) {
        if self.selected_layer.take().is_some() {
            self.store.release_normal_target();
        }
    }

    /// Paint into the selected layer at a canvas-space point.
    pub fn paint_at(&mut self, point: Vec2) -> Result<bool> {
        let (Some(index), Some(canvas)) = (self.selected_layer, self.project.canvas) else {
            return Ok(false);
        };
        let painted = self.store.paint(
            index,
            canvas,
            point.floor().as_ivec2(),
            self.brush.radius,
            self.brush.effective_color(),
        )?;
        if painted {
            self.project.mark_dirty();
        }
        Ok(painted)
    }

    pub fn can_calculate_normals(&self) -> bool {
        self.selected_layer.is_some() && !self.arrows.is_empty()
    }

    pub fn calculate_normals(&mut self) -> Result<bool> {
        let Some(index) = self.selected_layer.filter(|_| self.can_calculate_normals()) else {
            return Ok(false);
        };
        let done = self.store.generate_normals(index, &self.arrows)?;
        if done {
            self.project.mark_dirty();
        }
        Ok(done)
    }

    // ========================================================================
    // NORMAL ARROWS
    // ========================================================================

    /// Start a new arrow at `point` and keep it under the pointer until
    /// `end_arrow`.
    pub fn begin_arrow(&mut self, point: Vec2) -> Result<usize> {
        let index = self.arrows.push(point)?;
        self.arrows.select(index);
        self.dragging_arrow = true;
        self.arrows_changed();
        Ok(index)
    }

    pub fn drag_arrow(&mut self, point: Vec2) {
        if self.dragging_arrow {
            self.arrows.drag_last_to(point);
            self.arrows_changed();
        }
    }

    pub fn end_arrow(&mut self) {
        self.dragging_arrow = false;
    }

    pub fn is_dragging_arrow(&self) -> bool {
        self.dragging_arrow
    }

    pub fn select_arrow(&mut self, index: usize) {
        self.arrows.select(index);
        self.refresh_arrow_lines();
    }

    pub fn set_arrow_orientation(&mut self, index: usize, degrees: f32) {
        self.arrows.set_orientation_degrees(index, degrees);
        self.arrows_changed();
    }

    pub fn set_arrow_angle(&mut self, index: usize, degrees: f32) {
        self.arrows.set_angle_degrees(index, degrees);
        self.arrows_changed();
    }

    pub fn remove_arrow(&mut self, index: usize) -> bool {
        let removed = self.arrows.remove(index).is_some();
        if removed {
            self.arrows_changed();
        }
        removed
    }

    pub fn clear_arrows(&mut self) {
        self.arrows.clear();
        self.dragging_arrow = false;
        self.arrows_changed();
    }

    fn arrows_changed(&mut self) {
        self.refresh_arrow_lines();
        self.project.mark_dirty();
    }

    fn refresh_arrow_lines(&mut self) {
        let lines = self.arrows.glyph_lines(ARROW_COLOR, SELECTED_ARROW_COLOR);
        self.lines[ARROW_LINES].set_lines(lines);
    }

    fn set_canvas(&mut self, canvas: (u32, u32)) {
        self.project.canvas = Some(canvas);
        self.lines[GRID_LINES].set_lines(grid_lines(canvas, GRID_COLOR));
        self.camera.frame_canvas(canvas);
        tracing::info!(w = canvas.0, h = canvas.1, "canvas size fixed");
    }

    // ========================================================================
    // PROJECT
    // ========================================================================

    pub fn new_project(&mut self) {
        self.deselect_layer();
        self.store.clear();
        self.arrows.clear();
        self.dragging_arrow = false;
        self.project = Project::new_untitled();
        for lines in &mut self.lines {
            lines.clear();
        }
    }

    /// Load `path`, replacing the open project.  Nothing changes on failure.
    pub fn open_project(&mut self, path: &Path) -> Result<()> {
        let data = io::load_project_file(path)?;
        let arrows = NormalArrows::from_vec(data.arrows)?;

        self.store.restore(data.layers)?;
        self.deselect_layer();
        self.arrows = arrows;
        self.dragging_arrow = false;
        self.project = Project::from_file(path.to_path_buf(), data.canvas);
        match self.project.canvas {
            Some(canvas) => self.set_canvas(canvas),
            None => self.lines[GRID_LINES].clear(),
        }
        self.refresh_arrow_lines();
        tracing::info!(
            path = %path.display(),
            layers = self.store.len(),
            arrows = self.arrows.len(),
            "project opened"
        );
        Ok(())
    }

    pub fn project_data(&mut self) -> Result<ProjectData> {
        Ok(ProjectData {
            canvas: self.project.canvas_or_zero(),
            arrows: self.arrows.as_slice().to_vec(),
            layers: self.store.snapshot()?,
        })
    }

    pub fn save_project(&mut self, path: &Path) -> Result<()> {
        let data = self.project_data()?;
        io::save_project_file(path, &data)?;
        self.project.path = Some(path.to_path_buf());
        self.project.mark_clean();
        tracing::info!(path = %path.display(), layers = data.layers.len(), "project saved");
        Ok(())
    }

    /// Save to the current path; `None` when the project was never saved.
    pub fn save_project_in_place(&mut self) -> Option<Result<PathBuf>> {
        let path = self.project.path.clone()?;
        Some(self.save_project(&path).map(|_| path))
    }

    pub fn export_png(&mut self, path: &Path) -> Result<()> {
        let canvas = self.project.canvas.ok_or(Error::EmptyCanvas)?;
        self.store.export_png(path, canvas)
    }

    // ========================================================================
    // VIEWPORT
    // ========================================================================

    pub fn render_frame(
        &mut self,
        viewport: (u32, u32),
        clear_color: [f32; 4],
    ) -> Result<Option<ViewportImage>> {
        self.camera.resize(viewport.0, viewport.1);
        self.lines[GRID_LINES].alpha = grid_alpha(self.camera.zoom, self.grid_depth);
        self.store
            .render(viewport, &self.camera, clear_color, &mut self.lines)
    }

    /// Integer canvas pixel under a canvas-space point, if inside the canvas.
    pub fn canvas_pixel(&self, point: Vec2) -> Option<IVec2> {
        let (w, h) = self.project.canvas?;
        let p = point.floor().as_ivec2();
        (p.x >= 0 && p.y >= 0 && (p.x as u32) < w && (p.y as u32) < h).then_some(p)
    }
}
