// ============================================================================
// DEBUG LINES — grid and arrow glyph geometry for the viewport overlay
// ============================================================================

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Zoom range over which the pixel grid fades out.
const GRID_FADE_RANGE: f32 = 175.0;

/// One line-list vertex in canvas pixels (y down).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl LineVertex {
    pub fn new(position: Vec2, color: [f32; 3]) -> Self {
        Self {
            position: position.to_array(),
            color,
        }
    }
}

/// A set of line segments that is re-uploaded wholesale whenever it changes.
///
/// The GPU side only looks at `vertices()` when `take_dirty()` reports a change,
/// so edits never stream partial updates.
#[derive(Clone, Debug)]
pub struct DebugLines {
    vertices: Vec<LineVertex>,
    /// Overall opacity applied by the line shader.
    pub alpha: f32,
    /// Pixel width hint; wgpu only guarantees 1.0, wider lines fall back to 1.
    pub width: f32,
    dirty: bool,
}

impl DebugLines {
    pub fn new(width: f32) -> Self {
        Self {
            vertices: Vec::new(),
            alpha: 1.0,
            width,
            dirty: false,
        }
    }

    pub fn set_lines(&mut self, vertices: Vec<LineVertex>) {
        self.vertices = vertices;
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        if !self.vertices.is_empty() {
            self.vertices.clear();
            self.dirty = true;
        }
    }

    pub fn vertices(&self) -> &[LineVertex] {
        &self.vertices
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Returns whether the vertex list changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

/// One line per pixel boundary across the whole canvas.
pub fn grid_lines(canvas: (u32, u32), color: [f32; 3]) -> Vec<LineVertex> {
    let (w, h) = (canvas.0 as f32, canvas.1 as f32);
    let mut lines = Vec::with_capacity((canvas.0 as usize + canvas.1 as usize + 2) * 2);
    for x in 0..=canvas.0 {
        let x = x as f32;
        lines.push(LineVertex::new(Vec2::new(x, 0.0), color));
        lines.push(LineVertex::new(Vec2::new(x, h), color));
    }
    for y in 0..=canvas.1 {
        let y = y as f32;
        lines.push(LineVertex::new(Vec2::new(0.0, y), color));
        lines.push(LineVertex::new(Vec2::new(w, y), color));
    }
    lines
}

/// Grid opacity for the current zoom: opaque up to `grid_depth`, smoothstep
/// to transparent over the following fade range.
pub fn grid_alpha(zoom: f32, grid_depth: f32) -> f32 {
    let t = ((zoom - grid_depth) / GRID_FADE_RANGE).clamp(0.0, 1.0);
    1.0 - t * t * (3.0 - 2.0 * t)
}
