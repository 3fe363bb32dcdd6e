// ============================================================================
// GPU MODULE — layer textures, compute passes and the viewport renderer
// ============================================================================
//
// Architecture:
//   context.rs    — wgpu Device, Queue, adapter init, error scopes
//   shaders.rs    — all WGSL shader source (inline strings)
//   texture.rs    — LayerTexture wrapper with upload, readback + mipmaps
//   compute.rs    — paint, normal-generation and combine compute passes
//   compositor.rs — layer + debug-line render pipelines, viewport readback
//   renderer.rs   — GpuBackend: texture arena and LayerBackend impl
//   cpu.rs        — CpuBackend: the same pixel rules on host memory
//
// Everything above the backends talks to `LayerBackend` only.
// ============================================================================

pub mod context;
pub mod shaders;
pub mod texture;
pub mod compositor;
pub mod compute;
pub mod renderer;
pub mod cpu;

pub use cpu::CpuBackend;
pub use renderer::GpuBackend;

use glam::{IVec2, Vec2, Vec3};

use crate::arrows::{ArrowBlock, NormalArrow};
use crate::camera::CameraUniform;
use crate::debug_lines::DebugLines;
use crate::error::{Error, Result};

/// WGPU requires `bytes_per_row` to be a multiple of 256.
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Workgroup edge used by every compute pass.
pub const WORKGROUP_SIZE: u32 = 16;

slotmap::new_key_type! {
    /// Generation-checked handle to a texture owned by a backend.
    pub struct TextureId;
}

/// One brush dab, in canvas pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintParams {
    pub point: IVec2,
    pub radius: i32,
    /// Straight RGBA in [0, 1].
    pub color: [f32; 4],
    /// Canvas position of the target layer's top-left texel.
    pub layer_position: IVec2,
}

/// One layer's contribution to a combine.
#[derive(Clone, Copy, Debug)]
pub struct CombineInput {
    pub texture: TextureId,
    pub position: IVec2,
    pub alpha: f32,
}

/// Per-draw parameters for one layer in the viewport pass.
#[derive(Clone, Copy, Debug)]
pub struct LayerDraw {
    pub texture: TextureId,
    pub position: IVec2,
    pub z_offset: f32,
    pub alpha: f32,
}

/// Everything one viewport frame needs.
pub struct FrameInput<'a> {
    /// Viewport size in physical pixels.
    pub viewport: (u32, u32),
    pub camera: CameraUniform,
    pub clear_color: [f32; 4],
    /// Layers in store order.
    pub layers: &'a [LayerDraw],
    /// Line sets drawn over the layers, in order.
    pub lines: &'a mut [DebugLines],
}

/// Tightly packed RGBA8 viewport contents.
#[derive(Clone, Debug)]
pub struct ViewportImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Texture storage and the three compute passes, as seen by the layer store.
///
/// Every mutating call is synchronous: it returns once the work has finished.
pub trait LayerBackend {
    fn name(&self) -> &str;

    /// Upload `rgba` (tight rows, `width * height * 4` bytes) into a new texture.
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId>;

    /// Unknown or already destroyed ids are ignored.
    fn destroy_texture(&mut self, id: TextureId);

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)>;

    /// Make `id` the single writable paint target.
    fn bind_paint_target(&mut self, id: TextureId) -> Result<()>;

    fn release_paint_target(&mut self);

    /// Requires `id` to be the bound paint target.
    fn paint(&mut self, id: TextureId, params: &PaintParams) -> Result<()>;

    fn bind_normal_target(&mut self, id: TextureId) -> Result<()>;

    fn release_normal_target(&mut self);

    /// Requires `id` to be the bound normal target.
    fn generate_normals(
        &mut self,
        id: TextureId,
        layer_position: IVec2,
        arrows: &ArrowBlock,
    ) -> Result<()>;

    /// Flatten `layers` (back to front) into a canvas-sized RGBA8 buffer.
    fn combine(&mut self, canvas: (u32, u32), layers: &[CombineInput]) -> Result<Vec<u8>>;

    fn read_pixels(&mut self, id: TextureId) -> Result<Vec<u8>>;

    /// Draw one viewport frame. `None` when the viewport is empty.
    fn render(&mut self, frame: FrameInput<'_>) -> Result<Option<ViewportImage>>;
}

/// Open the wgpu backend, or the CPU one when `force_cpu` is set or no
/// adapter exists.  Other device failures are returned.
pub fn open_backend(force_cpu: bool, preferred_gpu: &str) -> Result<Box<dyn LayerBackend>> {
    if force_cpu {
        tracing::info!("using CPU backend");
        return Ok(Box::new(CpuBackend::new()));
    }
    match GpuBackend::new(preferred_gpu) {
        Ok(gpu) => {
            tracing::info!(adapter = gpu.adapter_name(), "using GPU backend");
            Ok(Box::new(gpu))
        }
        Err(Error::NoAdapter) => {
            tracing::warn!("no GPU adapter, falling back to CPU backend");
            Ok(Box::new(CpuBackend::new()))
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// PIXEL RULES — shared by the CPU backend and mirrored in the WGSL passes
// ============================================================================

/// Texel rectangle `(x, y, w, h)` a brush dab can touch, clipped to the texture.
pub fn brush_bounds(params: &PaintParams, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if params.radius < 0 {
        return None;
    }
    let (lx, ly) = brush_local(params);
    let r = i64::from(params.radius);
    let x0 = (lx - r).max(0);
    let y0 = (ly - r).max(0);
    let x1 = (lx + r + 1).min(i64::from(width));
    let y1 = (ly + r + 1).min(i64::from(height));
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Brush center in the target layer's texel space, widened so no layer
/// position can overflow it.
pub fn brush_local(params: &PaintParams) -> (i64, i64) {
    (
        i64::from(params.point.x) - i64::from(params.layer_position.x),
        i64::from(params.point.y) - i64::from(params.layer_position.y),
    )
}

/// Whether texel `(x, y)` of the target layer lies inside the brush disc.
pub fn brush_covers(params: &PaintParams, x: u32, y: u32) -> bool {
    if params.radius < 0 {
        return false;
    }
    let (lx, ly) = brush_local(params);
    let (dx, dy) = (i64::from(x) - lx, i64::from(y) - ly);
    let r = i64::from(params.radius);
    dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy)) <= r * r
}

/// Straight RGBA in [0, 1] to bytes, rounding to nearest.
pub fn color_to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8)
}

/// Surface normal at canvas point `p` from the live arrows.
///
/// Each arrow tilts the surface towards its direction by its inclination and
/// is weighted by `1 / (1 + distance²)` from its start. No arrows: flat.
pub fn arrow_normal(p: Vec2, arrows: &[NormalArrow]) -> Vec3 {
    let mut sum = Vec3::ZERO;
    for arrow in arrows {
        let d = arrow.direction();
        let (sin, cos) = arrow.angle.sin_cos();
        let n = Vec3::new(d.x * sin, -d.y * sin, cos);
        let w = 1.0 / (1.0 + p.distance_squared(arrow.start));
        sum += n * w;
    }
    if sum.length_squared() == 0.0 {
        return Vec3::Z;
    }
    sum.normalize()
}

/// `floor((n * 0.5 + 0.5) * 255)` per channel, fully opaque.
pub fn encode_normal(n: Vec3) -> [u8; 4] {
    let e = ((n * 0.5 + Vec3::splat(0.5)) * 255.0).floor();
    [
        e.x.clamp(0.0, 255.0) as u8,
        e.y.clamp(0.0, 255.0) as u8,
        e.z.clamp(0.0, 255.0) as u8,
        255,
    ]
}

/// Non-premultiplied "over" of `src` (scaled by `alpha`) onto `dst`.
pub fn blend_over(dst: [u8; 4], src: [u8; 4], alpha: f32) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0 * alpha.clamp(0.0, 1.0);
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return [0; 4];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = src[c] as f32 / 255.0;
        let d = dst[c] as f32 / 255.0;
        let v = (s * sa + d * da * (1.0 - sa)) / oa;
        out[c] = (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    }
    out[3] = (oa.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    out
}

/// Row stride for texture-to-buffer copies.
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    unaligned.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Drop the row padding a texture readback carries.
pub fn strip_row_padding(padded: &[u8], width: u32, height: u32) -> Vec<u8> {
    let padded_row = aligned_bytes_per_row(width) as usize;
    let row = width as usize * 4;
    if padded_row == row {
        return padded[..row * height as usize].to_vec();
    }
    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * padded_row;
        out.extend_from_slice(&padded[start..start + row]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dab(point: (i32, i32), radius: i32, layer: (i32, i32)) -> PaintParams {
        PaintParams {
            point: IVec2::new(point.0, point.1),
            radius,
            color: [1.0, 0.0, 0.0, 1.0],
            layer_position: IVec2::new(layer.0, layer.1),
        }
    }

    #[test]
    fn brush_bounds_clip_to_texture() {
        assert_eq!(brush_bounds(&dab((50, 50), 5, (0, 0)), 100, 100), Some((45, 45, 11, 11)));
        assert_eq!(brush_bounds(&dab((0, 0), 3, (0, 0)), 100, 100), Some((0, 0, 4, 4)));
        assert_eq!(brush_bounds(&dab((500, 500), 3, (0, 0)), 100, 100), None);
        // Layer offset moves the dab into texel space.
        assert_eq!(brush_bounds(&dab((15, 15), 1, (10, 10)), 20, 20), Some((4, 4, 3, 3)));
    }

    #[test]
    fn brush_disc_is_inclusive() {
        let p = dab((50, 50), 5, (0, 0));
        assert!(brush_covers(&p, 55, 50));
        assert!(brush_covers(&p, 53, 54));
        assert!(!brush_covers(&p, 54, 54));
        assert!(!brush_covers(&p, 50, 60));
    }

    #[test]
    fn extreme_positions_and_radii_do_not_overflow() {
        assert_eq!(brush_bounds(&dab((5, 5), 3, (i32::MIN, 0)), 10, 10), None);
        assert_eq!(brush_bounds(&dab((5, 5), 3, (i32::MAX, i32::MIN)), 10, 10), None);
        assert!(!brush_covers(&dab((5, 5), 3, (i32::MIN, 0)), 0, 0));
        assert!(!brush_covers(&dab((0, 0), i32::MAX, (i32::MIN, i32::MIN)), u32::MAX, u32::MAX));

        let huge = dab((0, 0), 50_000, (0, 0));
        assert_eq!(brush_bounds(&huge, 8, 8), Some((0, 0, 8, 8)));
        assert!(brush_covers(&huge, 7, 7));
        assert!(brush_covers(&dab((0, 0), i32::MAX, (0, 0)), 1000, 1000));
    }

    #[test]
    fn no_arrows_gives_flat_normal() {
        assert_eq!(arrow_normal(Vec2::new(3.0, 4.0), &[]), Vec3::Z);
        assert_eq!(encode_normal(Vec3::Z), [127, 127, 255, 255]);
    }

    #[test]
    fn single_arrow_tilts_towards_its_direction() {
        let arrow = NormalArrow::new(Vec2::ZERO, Vec2::new(20.0, 0.0), 45f32.to_radians());
        let n = arrow_normal(Vec2::new(5.0, 5.0), &[arrow]);
        assert!((n.x - n.z).abs() < 1e-5);
        assert!(n.y.abs() < 1e-6);
        // Canvas-down arrow maps to negative y in normal space.
        let down = NormalArrow::new(Vec2::ZERO, Vec2::new(0.0, 20.0), 30f32.to_radians());
        assert!(arrow_normal(Vec2::ZERO, &[down]).y < 0.0);
    }

    #[test]
    fn nearer_arrow_dominates() {
        let right = NormalArrow::new(Vec2::ZERO, Vec2::new(20.0, 0.0), 60f32.to_radians());
        let left = NormalArrow::new(Vec2::new(100.0, 0.0), Vec2::new(80.0, 0.0), 60f32.to_radians());
        assert!(arrow_normal(Vec2::new(2.0, 0.0), &[right, left]).x > 0.0);
        assert!(arrow_normal(Vec2::new(98.0, 0.0), &[right, left]).x < 0.0);
    }

    #[test]
    fn over_blend_rules() {
        let red = [255, 0, 0, 255];
        let clear = [0, 0, 0, 0];
        assert_eq!(blend_over(clear, red, 1.0), red);
        assert_eq!(blend_over(red, clear, 1.0), red);
        assert_eq!(blend_over(clear, clear, 1.0), clear);
        let half = blend_over([0, 0, 255, 255], red, 0.5);
        assert_eq!(half[3], 255);
        assert!((half[0] as i32 - 128).abs() <= 1);
        assert!((half[2] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn row_padding_is_removed() {
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
        let padded = vec![7u8; 512 * 2];
        assert_eq!(strip_row_padding(&padded, 65, 2).len(), 65 * 4 * 2);
    }
}
