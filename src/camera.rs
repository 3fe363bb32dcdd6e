// ============================================================================
// CAMERA — orthographic 2D pan/zoom over the canvas
// ============================================================================

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 1000.0;
/// Zoom change per scroll notch.
const SCROLL_SPEED: f32 = 10.0;
/// Keyboard pan speed, in multiples of the zoom per second.
const PAN_SPEED: f32 = 2.5;
/// Extra half-extent kept around a framed canvas.
const FRAME_MARGIN: f32 = 20.0;

/// Uniform block shared by the layer and debug-line shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

/// `position` is the canvas point shown at the viewport centre; `zoom` is the
/// vertical half-extent of the view in canvas pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec2,
    pub zoom: f32,
    aspect: f32,
    ortho: Mat4,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec2::ZERO, 100.0)
    }
}

impl Camera {
    pub fn new(position: Vec2, zoom: f32) -> Self {
        let mut cam = Self {
            position,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            aspect: 1.0,
            ortho: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        };
        cam.recalculate_ortho();
        cam.recalculate_view();
        cam
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn ortho(&self) -> Mat4 {
        self.ortho
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            view_proj: (self.ortho * self.view).to_cols_array_2d(),
        }
    }

    /// Half-extents of the visible region in canvas pixels.
    pub fn ortho_extension(&self) -> Vec2 {
        Vec2::new(self.aspect * self.zoom, self.zoom)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let aspect = width as f32 / height as f32;
        if aspect != self.aspect {
            self.aspect = aspect;
            self.recalculate_ortho();
        }
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.recalculate_view();
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.recalculate_ortho();
    }

    pub fn pan(&mut self, delta: Vec2) {
        if delta != Vec2::ZERO {
            self.set_position(self.position + delta);
        }
    }

    /// Scroll-wheel zoom; positive `scroll` zooms in.
    pub fn zoom_by(&mut self, scroll: f32) {
        if scroll != 0.0 {
            self.set_zoom(self.zoom - scroll * SCROLL_SPEED);
        }
    }

    /// Keyboard pan step for one frame: `dir` components in {-1, 0, 1}.
    pub fn keyboard_pan(&mut self, dir: Vec2, dt: f32) -> bool {
        if dir == Vec2::ZERO {
            return false;
        }
        self.pan(dir * PAN_SPEED * self.zoom * dt);
        true
    }

    /// Canvas pixels covered by one viewport pixel.
    pub fn canvas_per_pixel(&self, viewport_height: f32) -> f32 {
        if viewport_height <= 0.0 {
            return 0.0;
        }
        2.0 * self.zoom / viewport_height
    }

    /// Map a viewport pixel (relative to `origin`) to canvas coordinates.
    pub fn screen_to_canvas(&self, mouse: Vec2, origin: Vec2, size: Vec2) -> Vec2 {
        if size.x <= 0.0 || size.y <= 0.0 {
            return self.position;
        }
        let n = (mouse - origin) / size;
        self.position + (n * 2.0 - Vec2::ONE) * self.ortho_extension()
    }

    /// Centre the view on a canvas and zoom so it fits the viewport.
    pub fn frame_canvas(&mut self, canvas: (u32, u32)) {
        let (w, h) = (canvas.0 as f32, canvas.1 as f32);
        self.set_position(Vec2::new(w, h) / 2.0);
        self.set_zoom((w / (2.0 * self.aspect)).max(h / 2.0) + FRAME_MARGIN);
    }

    fn recalculate_ortho(&mut self) {
        let ext = self.ortho_extension();
        // bottom/top swapped: canvas y grows downwards on screen.
        self.ortho = Mat4::orthographic_rh(-ext.x, ext.x, ext.y, -ext.y, -1.0, 1.0);
    }

    fn recalculate_view(&mut self) {
        self.view = Mat4::from_translation((-self.position).extend(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn project(cam: &Camera, p: Vec2) -> Vec2 {
        let clip = cam.ortho() * cam.view() * Vec4::new(p.x, p.y, 0.0, 1.0);
        Vec2::new(clip.x / clip.w, clip.y / clip.w)
    }

    #[test]
    fn centre_maps_to_origin() {
        let mut cam = Camera::new(Vec2::new(50.0, 40.0), 10.0);
        cam.resize(200, 100);
        let ndc = project(&cam, Vec2::new(50.0, 40.0));
        assert!(ndc.length() < 1e-5);
        // Canvas y down → NDC y down.
        let below = project(&cam, Vec2::new(50.0, 45.0));
        assert!((below.y + 0.5).abs() < 1e-5);
        let right = project(&cam, Vec2::new(60.0, 40.0));
        assert!((right.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn screen_to_canvas_inverts_projection() {
        let mut cam = Camera::new(Vec2::new(50.0, 50.0), 25.0);
        cam.resize(400, 200);
        let origin = Vec2::new(10.0, 20.0);
        let size = Vec2::new(400.0, 200.0);
        assert_eq!(cam.screen_to_canvas(origin + size / 2.0, origin, size), Vec2::new(50.0, 50.0));
        assert_eq!(cam.screen_to_canvas(origin, origin, size), Vec2::new(0.0, 25.0));
    }

    #[test]
    fn zoom_is_clamped() {
        let mut cam = Camera::default();
        cam.zoom_by(1000.0);
        assert_eq!(cam.zoom, MIN_ZOOM);
        cam.zoom_by(-1000.0);
        assert_eq!(cam.zoom, MAX_ZOOM);
    }

    #[test]
    fn resize_ignores_empty_viewport() {
        let mut cam = Camera::default();
        cam.resize(300, 100);
        cam.resize(0, 100);
        assert_eq!(cam.aspect(), 3.0);
    }

    #[test]
    fn framing_fits_canvas() {
        let mut cam = Camera::default();
        cam.resize(100, 100);
        cam.frame_canvas((400, 200));
        assert_eq!(cam.position, Vec2::new(200.0, 100.0));
        let ext = cam.ortho_extension();
        assert!(ext.x >= 200.0 && ext.y >= 100.0);
    }
}
