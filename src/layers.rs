// ============================================================================
// LAYER STORE — ordered, backend-resident layers plus paint/normal/combine
// ============================================================================
//
// Store order is draw order for `combine` (back to front).  The viewport
// pass sorts by `z_offset` instead, so a layer's depth can be edited without
// reordering the stack.
//
// Binding discipline: at most one paint target and one normal target are bound
// at a time.  Switching targets always releases the previous binding first.
// ============================================================================

use std::io::{Read, Write};
use std::path::Path;

use glam::IVec2;

use crate::arrows::NormalArrows;
use crate::camera::Camera;
use crate::debug_lines::DebugLines;
use crate::error::{Error, Result};
use crate::gpu::{
    CombineInput, FrameInput, LayerBackend, LayerDraw, PaintParams, TextureId, ViewportImage,
};
use crate::io::{self, LayerData};

/// Mid-grey, fully opaque: marks the region normals are generated for.
pub const NORMAL_BRUSH_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
pub const ERASE_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
/// Larger dabs cover any canvas anyway.
pub const MAX_BRUSH_RADIUS: i32 = io::MAX_CANVAS_DIM as i32;

/// What the brush writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BrushMode {
    #[default]
    Color,
    Normal,
    Eraser,
}

impl BrushMode {
    /// Combine the two toolbar toggles; the eraser wins.
    pub fn from_toggles(normal: bool, eraser: bool) -> Self {
        match (normal, eraser) {
            (_, true) => BrushMode::Eraser,
            (true, false) => BrushMode::Normal,
            (false, false) => BrushMode::Color,
        }
    }

    pub fn color(self, user_color: [f32; 4]) -> [f32; 4] {
        match self {
            BrushMode::Color => user_color,
            BrushMode::Normal => NORMAL_BRUSH_COLOR,
            BrushMode::Eraser => ERASE_COLOR,
        }
    }
}

/// A single layer: placement metadata plus the texture that holds its pixels.
#[derive(Debug)]
pub struct Layer {
    pub name: String,
    /// Canvas position of the top-left texel.
    pub position: IVec2,
    pub z_offset: f32,
    pub alpha: f32,
    /// Painted with the normal brush and eligible for normal generation.
    pub is_normal: bool,
    texture: TextureId,
    width: u32,
    height: u32,
}

impl Layer {
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct LayerStore {
    backend: Box<dyn LayerBackend>,
    layers: Vec<Layer>,
    paint_target: Option<TextureId>,
    normal_target: Option<TextureId>,
}

impl LayerStore {
    pub fn new(backend: Box<dyn LayerBackend>) -> Self {
        Self {
            backend,
            layers: Vec::new(),
            paint_target: None,
            normal_target: None,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Metadata edits only; pixels change through `paint` and `generate_normals`.
    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// One in front of the frontmost layer, 0 for an empty store.
    pub fn next_z_offset(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| l.z_offset)
            .reduce(f32::max)
            .map_or(0.0, |z| z + 1.0)
    }

    fn default_name(&self) -> String {
        format!("Layer ({})", self.layers.len())
    }

    // ========================================================================
    // ADD / REMOVE / REORDER
    // ========================================================================

    /// Decode `path` into a new layer.  Returns `true` when this was the first
    /// layer, i.e. the caller should adopt the image size as the canvas size.
    ///
    /// A decode failure leaves the store untouched.
    pub fn add_from_image(&mut self, path: &Path) -> Result<bool> {
        let image = io::load_image(path)?;
        let first = self.layers.is_empty();
        let (w, h) = image.dimensions();
        self.add_from_rgba(w, h, image.as_raw(), false)?;
        tracing::info!(path = %path.display(), w, h, first, "image imported as layer");
        Ok(first)
    }

    /// Upload tight RGBA8 pixels as a new layer at the origin, in front of the
    /// existing ones.  Returns the new index.
    pub fn add_from_rgba(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
        is_normal: bool,
    ) -> Result<usize> {
        let texture = self.backend.create_texture(width, height, rgba)?;
        let layer = Layer {
            name: self.default_name(),
            position: IVec2::ZERO,
            z_offset: self.next_z_offset(),
            alpha: 1.0,
            is_normal,
            texture,
            width,
            height,
        };
        self.layers.push(layer);
        Ok(self.layers.len() - 1)
    }

    /// Transparent canvas-sized layer for normal authoring.
    pub fn add_blank(&mut self, width: u32, height: u32) -> Result<usize> {
        let pixels = vec![0u8; width as usize * height as usize * 4];
        let index = self.add_from_rgba(width, height, &pixels, true)?;
        tracing::debug!(index, width, height, "blank normal layer added");
        Ok(index)
    }

    /// Out-of-range indices are a no-op and return `None`.
    pub fn remove_at(&mut self, index: usize) -> Option<Layer> {
        if index >= self.layers.len() {
            return None;
        }
        let layer = self.layers.remove(index);
        self.release_bindings_for(layer.texture);
        self.backend.destroy_texture(layer.texture);
        tracing::debug!(index, name = %layer.name, "layer removed");
        Some(layer)
    }

    pub fn clear(&mut self) {
        self.release_paint_target();
        self.release_normal_target();
        for layer in self.layers.drain(..) {
            self.backend.destroy_texture(layer.texture);
        }
    }

    /// Move the layer at `from` so it ends up at `to`.  Out of range is a no-op.
    pub fn move_layer(&mut self, from: usize, to: usize) -> bool {
        if from >= self.layers.len() || to >= self.layers.len() || from == to {
            return false;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        true
    }

    fn release_bindings_for(&mut self, texture: TextureId) {
        if self.paint_target == Some(texture) {
            self.release_paint_target();
        }
        if self.normal_target == Some(texture) {
            self.release_normal_target();
        }
    }

    // ========================================================================
    // PAINT / NORMALS
    // ========================================================================

    pub fn release_paint_target(&mut self) {
        if self.paint_target.take().is_some() {
            self.backend.release_paint_target();
        }
    }

    pub fn release_normal_target(&mut self) {
        if self.normal_target.take().is_some() {
            self.backend.release_normal_target();
        }
    }

    /// Overwrite every texel of layer `index` within `radius` of `point`.
    ///
    /// Returns `false` without touching anything when the index is out of
    /// range or `point` lies outside the canvas.
    pub fn paint(
        &mut self,
        index: usize,
        canvas: (u32, u32),
        point: IVec2,
        radius: i32,
        color: [f32; 4],
    ) -> Result<bool> {
        let inside = point.x >= 0
            && point.y >= 0
            && (point.x as u32) < canvas.0
            && (point.y as u32) < canvas.1;
        let Some(layer) = self.layers.get(index) else {
            return Ok(false);
        };
        if !inside {
            return Ok(false);
        }
        let (texture, layer_position) = (layer.texture, layer.position);
        let radius = radius.min(MAX_BRUSH_RADIUS);

        if self.paint_target != Some(texture) {
            self.release_paint_target();
            self.backend.bind_paint_target(texture)?;
            self.paint_target = Some(texture);
        }
        self.backend.paint(
            texture,
            &PaintParams {
                point,
                radius,
                color,
                layer_position,
            },
        )?;
        Ok(true)
    }

    /// Regenerate the normal map of layer `index` from `arrows`.
    ///
    /// The layer stays bound as the normal target until released or removed.
    pub fn generate_normals(&mut self, index: usize, arrows: &NormalArrows) -> Result<bool> {
        let Some(layer) = self.layers.get(index) else {
            return Ok(false);
        };
        let (texture, layer_position) = (layer.texture, layer.position);

        if self.normal_target != Some(texture) {
            self.release_normal_target();
            self.backend.bind_normal_target(texture)?;
            self.normal_target = Some(texture);
        }
        self.backend
            .generate_normals(texture, layer_position, &arrows.gpu_block())?;
        tracing::info!(index, arrows = arrows.len(), "normals generated");
        Ok(true)
    }

    // ========================================================================
    // RENDER / COMBINE / EXPORT
    // ========================================================================

    pub fn render(
        &mut self,
        viewport: (u32, u32),
        camera: &Camera,
        clear_color: [f32; 4],
        lines: &mut [DebugLines],
    ) -> Result<Option<ViewportImage>> {
        let draws: Vec<LayerDraw> = self
            .layers
            .iter()
            .map(|l| LayerDraw {
                texture: l.texture,
                position: l.position,
                z_offset: l.z_offset,
                alpha: l.alpha,
            })
            .collect();
        self.backend.render(FrameInput {
            viewport,
            camera: camera.uniform(),
            clear_color,
            layers: &draws,
            lines,
        })
    }

    /// Flatten all layers, in store order, into tight canvas-sized RGBA8 rows.
    pub fn combine(&mut self, canvas: (u32, u32)) -> Result<Vec<u8>> {
        let inputs: Vec<CombineInput> = self
            .layers
            .iter()
            .map(|l| CombineInput {
                texture: l.texture,
                position: l.position,
                alpha: l.alpha,
            })
            .collect();
        self.backend.combine(canvas, &inputs)
    }

    pub fn export_png(&mut self, path: &Path, canvas: (u32, u32)) -> Result<()> {
        if self.layers.is_empty() || canvas.0 == 0 || canvas.1 == 0 {
            return Err(Error::EmptyCanvas);
        }
        let pixels = self.combine(canvas)?;
        io::save_png(path, canvas.0, canvas.1, &pixels)?;
        tracing::info!(path = %path.display(), w = canvas.0, h = canvas.1, "composite exported");
        Ok(())
    }

    pub fn read_layer_pixels(&mut self, index: usize) -> Result<Option<Vec<u8>>> {
        match self.layers.get(index) {
            Some(layer) => self.backend.read_pixels(layer.texture).map(Some),
            None => Ok(None),
        }
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Read every layer back to host memory, in store order.
    pub fn snapshot(&mut self) -> Result<Vec<LayerData>> {
        let mut out = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let pixels = self.backend.read_pixels(layer.texture)?;
            out.push(LayerData {
                name: layer.name.clone(),
                position: layer.position,
                z_offset: layer.z_offset,
                alpha: layer.alpha,
                is_normal: layer.is_normal,
                width: layer.width,
                height: layer.height,
                pixels,
            });
        }
        Ok(out)
    }

    /// Replace the whole stack with `data`.  Every texture is created before
    /// any old one is destroyed; on failure the old stack is kept.
    pub fn restore(&mut self, data: Vec<LayerData>) -> Result<()> {
        let mut fresh = Vec::with_capacity(data.len());
        for d in data {
            match self.backend.create_texture(d.width, d.height, &d.pixels) {
                Ok(texture) => fresh.push(Layer {
                    name: d.name,
                    position: d.position,
                    z_offset: d.z_offset,
                    alpha: d.alpha,
                    is_normal: d.is_normal,
                    texture,
                    width: d.width,
                    height: d.height,
                }),
                Err(e) => {
                    for layer in fresh {
                        self.backend.destroy_texture(layer.texture);
                    }
                    return Err(e);
                }
            }
        }
        self.clear();
        self.layers = fresh;
        Ok(())
    }

    pub fn serialize<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let data = self.snapshot()?;
        io::write_layers(out, &data)
    }

    pub fn deserialize<R: Read>(&mut self, input: &mut R) -> Result<()> {
        let data = io::read_layers(input)?;
        self.restore(data)
    }
}

impl Drop for LayerStore {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CpuBackend;

    fn store() -> LayerStore {
        LayerStore::new(Box::new(CpuBackend::new()))
    }

    fn solid(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
        px.repeat((w * h) as usize)
    }

    #[test]
    fn eraser_wins_over_normal_brush() {
        assert_eq!(BrushMode::from_toggles(true, true), BrushMode::Eraser);
        assert_eq!(BrushMode::from_toggles(true, false), BrushMode::Normal);
        assert_eq!(BrushMode::from_toggles(false, false), BrushMode::Color);
        assert_eq!(BrushMode::Eraser.color([1.0; 4]), ERASE_COLOR);
        assert_eq!(BrushMode::Normal.color([1.0; 4]), NORMAL_BRUSH_COLOR);
        assert_eq!(BrushMode::Color.color([0.2, 0.3, 0.4, 1.0]), [0.2, 0.3, 0.4, 1.0]);
    }

    #[test]
    fn names_and_depth_follow_insertion() {
        let mut s = store();
        assert_eq!(s.next_z_offset(), 0.0);
        s.add_from_rgba(2, 2, &solid(2, 2, [1, 2, 3, 4]), false).unwrap();
        s.add_blank(2, 2).unwrap();
        assert_eq!(s.layer(0).unwrap().name, "Layer (0)");
        assert_eq!(s.layer(1).unwrap().name, "Layer (1)");
        assert_eq!(s.layer(1).unwrap().z_offset, 1.0);
        assert!(s.layer(1).unwrap().is_normal);
        assert!(!s.layer(0).unwrap().is_normal);

        s.layer_mut(0).unwrap().z_offset = 7.5;
        assert_eq!(s.next_z_offset(), 8.5);
    }

    #[test]
    fn bad_pixel_buffer_adds_nothing() {
        let mut s = store();
        assert!(s.add_from_rgba(4, 4, &[0u8; 3], false).is_err());
        assert!(s.is_empty());
    }

    #[test]
    fn out_of_range_operations_are_no_ops() {
        let mut s = store();
        assert!(s.remove_at(0).is_none());
        assert!(!s.paint(3, (10, 10), IVec2::new(1, 1), 2, [1.0; 4]).unwrap());
        assert!(!s.generate_normals(0, &NormalArrows::new()).unwrap());
        assert!(!s.move_layer(0, 1));
        assert!(s.read_layer_pixels(0).unwrap().is_none());
    }

    #[test]
    fn paint_outside_canvas_is_ignored() {
        let mut s = store();
        s.add_from_rgba(4, 4, &solid(4, 4, [9, 9, 9, 255]), false).unwrap();
        assert!(!s.paint(0, (4, 4), IVec2::new(4, 0), 10, [1.0; 4]).unwrap());
        assert!(!s.paint(0, (4, 4), IVec2::new(-1, 2), 10, [1.0; 4]).unwrap());
        assert_eq!(s.read_layer_pixels(0).unwrap().unwrap(), solid(4, 4, [9, 9, 9, 255]));
    }

    #[test]
    fn huge_radius_fills_the_layer() {
        let mut s = store();
        s.add_from_rgba(4, 4, &solid(4, 4, [9, 9, 9, 255]), false).unwrap();
        assert!(s.paint(0, (4, 4), IVec2::new(1, 1), 50_000, [1.0, 0.0, 0.0, 1.0]).unwrap());
        assert_eq!(s.read_layer_pixels(0).unwrap().unwrap(), solid(4, 4, [255, 0, 0, 255]));
    }

    #[test]
    fn extreme_layer_positions_paint_and_combine_nothing() {
        let mut s = store();
        s.add_from_rgba(4, 4, &solid(4, 4, [9, 9, 9, 255]), false).unwrap();
        s.layer_mut(0).unwrap().position = IVec2::new(i32::MIN, i32::MAX);
        assert!(s.paint(0, (4, 4), IVec2::new(2, 2), 3, [1.0; 4]).unwrap());
        assert_eq!(s.read_layer_pixels(0).unwrap().unwrap(), solid(4, 4, [9, 9, 9, 255]));
        assert_eq!(s.combine((4, 4)).unwrap(), vec![0; 4 * 4 * 4]);
    }

    #[test]
    fn move_layer_reorders() {
        let mut s = store();
        for _ in 0..3 {
            s.add_blank(1, 1).unwrap();
        }
        assert!(s.move_layer(0, 2));
        let names: Vec<_> = s.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Layer (1)", "Layer (2)", "Layer (0)"]);
    }

    #[test]
    fn export_with_no_layers_fails() {
        let mut s = store();
        let path = std::env::temp_dir().join("normalmaker-empty-export.png");
        assert!(matches!(s.export_png(&path, (4, 4)), Err(Error::EmptyCanvas)));
    }

    #[test]
    fn failed_restore_keeps_old_stack() {
        let mut s = store();
        s.add_blank(2, 2).unwrap();
        let bad = vec![LayerData {
            name: "bad".into(),
            position: IVec2::ZERO,
            z_offset: 0.0,
            alpha: 1.0,
            is_normal: false,
            width: 2,
            height: 2,
            pixels: vec![0; 5],
        }];
        assert!(s.restore(bad).is_err());
        assert_eq!(s.len(), 1);
        assert_eq!(s.layer(0).unwrap().name, "Layer (0)");
    }
}
