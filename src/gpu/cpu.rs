// ============================================================================
// CPU BACKEND — host-memory layer textures with the GPU passes' pixel rules
// ============================================================================
//
// Used headless: by the test suite, and by the CLI when no adapter opens or
// `--cpu` is given.  Paint, normal generation and combine produce the same
// bytes as the compute shaders; the viewport render is a nearest-neighbour
// rasterisation without the debug-line overlay.
// ============================================================================

use glam::{IVec2, Mat4, Vec2, Vec4};
use image::RgbaImage;
use rayon::prelude::*;
use slotmap::SlotMap;

use super::{
    arrow_normal, blend_over, brush_bounds, brush_covers, color_to_rgba8, encode_normal,
    CombineInput, FrameInput, LayerBackend, PaintParams, TextureId, ViewportImage,
};
use crate::arrows::ArrowBlock;
use crate::error::{Error, Result};

#[derive(Default)]
pub struct CpuBackend {
    textures: SlotMap<TextureId, RgbaImage>,
    paint_target: Option<TextureId>,
    normal_target: Option<TextureId>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn paint_target(&self) -> Option<TextureId> {
        self.paint_target
    }

    pub fn normal_target(&self) -> Option<TextureId> {
        self.normal_target
    }

    fn texture(&self, id: TextureId) -> Result<&RgbaImage> {
        self.textures.get(id).ok_or(Error::StaleTexture)
    }
}

impl LayerBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId> {
        if width == 0 || height == 0 {
            return Err(Error::gpu("create_texture", format!("empty texture {width}x{height}")));
        }
        let image = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or_else(|| {
            Error::gpu(
                "create_texture",
                format!("{} bytes for a {width}x{height} texture", rgba.len()),
            )
        })?;
        Ok(self.textures.insert(image))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.paint_target == Some(id) {
            self.paint_target = None;
        }
        if self.normal_target == Some(id) {
            self.normal_target = None;
        }
        self.textures.remove(id);
    }

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(id).map(|t| t.dimensions())
    }

    fn bind_paint_target(&mut self, id: TextureId) -> Result<()> {
        self.texture(id)?;
        self.release_paint_target();
        self.paint_target = Some(id);
        Ok(())
    }

    fn release_paint_target(&mut self) {
        self.paint_target = None;
    }

    fn paint(&mut self, id: TextureId, params: &PaintParams) -> Result<()> {
        if self.paint_target != Some(id) {
            return Err(Error::gpu("paint", "texture is not the bound paint target"));
        }
        let image = self.textures.get_mut(id).ok_or(Error::StaleTexture)?;
        let Some((x0, y0, w, h)) = brush_bounds(params, image.width(), image.height()) else {
            return Ok(());
        };
        let color = image::Rgba(color_to_rgba8(params.color));
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                if brush_covers(params, x, y) {
                    image.put_pixel(x, y, color);
                }
            }
        }
        Ok(())
    }

    fn bind_normal_target(&mut self, id: TextureId) -> Result<()> {
        self.texture(id)?;
        self.release_normal_target();
        self.normal_target = Some(id);
        Ok(())
    }

    fn release_normal_target(&mut self) {
        self.normal_target = None;
    }

    fn generate_normals(
        &mut self,
        id: TextureId,
        layer_position: IVec2,
        arrows: &ArrowBlock,
    ) -> Result<()> {
        if self.normal_target != Some(id) {
            return Err(Error::gpu("generate_normals", "texture is not the bound normal target"));
        }
        let image = self.textures.get_mut(id).ok_or(Error::StaleTexture)?;
        let live = arrows.live();
        let row_bytes = image.width() as usize * 4;
        let origin = layer_position.as_vec2() + Vec2::splat(0.5);

        image
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    if px[3] == 0 {
                        continue;
                    }
                    let p = origin + Vec2::new(x as f32, y as f32);
                    px.copy_from_slice(&encode_normal(arrow_normal(p, live)));
                }
            });
        Ok(())
    }

    fn combine(&mut self, canvas: (u32, u32), layers: &[CombineInput]) -> Result<Vec<u8>> {
        let (cw, ch) = canvas;
        let row_bytes = cw as usize * 4;
        let mut acc = vec![0u8; row_bytes * ch as usize];
        if row_bytes == 0 {
            return Ok(acc);
        }

        for layer in layers {
            let src = self.texture(layer.texture)?;
            let (sw, sh) = (i64::from(src.width()), i64::from(src.height()));
            let (px0, py0) = (i64::from(layer.position.x), i64::from(layer.position.y));
            acc.par_chunks_mut(row_bytes).enumerate().for_each(|(y, row)| {
                let sy = y as i64 - py0;
                if sy < 0 || sy >= sh {
                    return;
                }
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let sx = x as i64 - px0;
                    if sx < 0 || sx >= sw {
                        continue;
                    }
                    let s = src.get_pixel(sx as u32, sy as u32).0;
                    let d = [px[0], px[1], px[2], px[3]];
                    px.copy_from_slice(&blend_over(d, s, layer.alpha));
                }
            });
        }
        Ok(acc)
    }

    fn read_pixels(&mut self, id: TextureId) -> Result<Vec<u8>> {
        Ok(self.texture(id)?.as_raw().clone())
    }

    fn render(&mut self, frame: FrameInput<'_>) -> Result<Option<ViewportImage>> {
        for lines in frame.lines.iter_mut() {
            lines.take_dirty();
        }
        let (vw, vh) = frame.viewport;
        if vw == 0 || vh == 0 {
            return Ok(None);
        }

        let inverse = Mat4::from_cols_array_2d(&frame.camera.view_proj).inverse();
        let mut draws = frame.layers.to_vec();
        draws.sort_by(|a, b| a.z_offset.total_cmp(&b.z_offset));
        let mut sources = Vec::with_capacity(draws.len());
        for draw in &draws {
            sources.push((draw, self.texture(draw.texture)?));
        }

        let clear = color_to_rgba8(frame.clear_color);
        let row_bytes = vw as usize * 4;
        let mut pixels = vec![0u8; row_bytes * vh as usize];
        pixels.par_chunks_mut(row_bytes).enumerate().for_each(|(y, row)| {
            let ndc_y = 1.0 - (y as f32 + 0.5) / vh as f32 * 2.0;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let ndc_x = (x as f32 + 0.5) / vw as f32 * 2.0 - 1.0;
                let p = inverse * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
                let mut out = clear;
                for (draw, src) in &sources {
                    let local = Vec2::new(p.x, p.y) - draw.position.as_vec2();
                    if local.x < 0.0 || local.y < 0.0 {
                        continue;
                    }
                    let (tx, ty) = (local.x as u32, local.y as u32);
                    if tx >= src.width() || ty >= src.height() {
                        continue;
                    }
                    let s = src.get_pixel(tx, ty).0;
                    if s[3] != 0 {
                        out = blend_over(out, s, draw.alpha);
                    }
                }
                px.copy_from_slice(&out);
            }
        });

        Ok(Some(ViewportImage {
            width: vw,
            height: vh,
            pixels,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrows::NormalArrows;
    use crate::camera::Camera;
    use crate::debug_lines::DebugLines;
    use crate::gpu::LayerDraw;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
        px.iter().copied().cycle().take((w * h * 4) as usize).collect()
    }

    #[test]
    fn create_rejects_wrong_length() {
        let mut cpu = CpuBackend::new();
        assert!(cpu.create_texture(4, 4, &[0; 10]).is_err());
        assert!(cpu.create_texture(0, 4, &[]).is_err());
        assert_eq!(cpu.live_textures(), 0);
    }

    #[test]
    fn destroyed_handle_is_stale() {
        let mut cpu = CpuBackend::new();
        let id = cpu.create_texture(2, 2, &solid(2, 2, [1, 2, 3, 4])).unwrap();
        cpu.bind_paint_target(id).unwrap();
        cpu.destroy_texture(id);
        assert_eq!(cpu.paint_target(), None);
        assert!(matches!(cpu.read_pixels(id), Err(Error::StaleTexture)));
        let fresh = cpu.create_texture(2, 2, &solid(2, 2, [0; 4])).unwrap();
        assert_ne!(id, fresh);
        assert_eq!(cpu.texture_size(id), None);
    }

    #[test]
    fn paint_requires_bound_target() {
        let mut cpu = CpuBackend::new();
        let a = cpu.create_texture(8, 8, &solid(8, 8, [0; 4])).unwrap();
        let b = cpu.create_texture(8, 8, &solid(8, 8, [0; 4])).unwrap();
        let params = PaintParams {
            point: IVec2::new(4, 4),
            radius: 2,
            color: [1.0; 4],
            layer_position: IVec2::ZERO,
        };
        cpu.bind_paint_target(a).unwrap();
        assert!(cpu.paint(b, &params).is_err());
        cpu.bind_paint_target(b).unwrap();
        assert_eq!(cpu.paint_target(), Some(b));
        cpu.paint(b, &params).unwrap();
        assert_eq!(&cpu.read_pixels(b).unwrap()[(4 * 8 + 4) * 4..][..4], &[255; 4]);
    }

    #[test]
    fn normals_skip_transparent_texels() {
        let mut cpu = CpuBackend::new();
        let mut rgba = solid(4, 1, [0; 4]);
        rgba[4..8].copy_from_slice(&[10, 10, 10, 255]);
        let id = cpu.create_texture(4, 1, &rgba).unwrap();
        cpu.bind_normal_target(id).unwrap();
        cpu.generate_normals(id, IVec2::ZERO, &NormalArrows::new().gpu_block())
            .unwrap();
        let out = cpu.read_pixels(id).unwrap();
        assert_eq!(&out[0..4], &[0; 4]);
        assert_eq!(&out[4..8], &[127, 127, 255, 255]);
    }

    #[test]
    fn combine_skips_out_of_canvas_texels() {
        let mut cpu = CpuBackend::new();
        let id = cpu.create_texture(2, 2, &solid(2, 2, [0, 255, 0, 255])).unwrap();
        let out = cpu
            .combine(
                (3, 3),
                &[CombineInput {
                    texture: id,
                    position: IVec2::new(2, 2),
                    alpha: 1.0,
                }],
            )
            .unwrap();
        assert_eq!(out.len(), 3 * 3 * 4);
        assert_eq!(&out[(2 * 3 + 2) * 4..], &[0, 255, 0, 255]);
        assert_eq!(out[..(2 * 3 + 2) * 4].iter().filter(|&&b| b != 0).count(), 0);
    }

    #[test]
    fn render_draws_layer_under_camera() {
        let mut cpu = CpuBackend::new();
        let id = cpu.create_texture(10, 10, &solid(10, 10, [255, 0, 0, 255])).unwrap();
        let mut cam = Camera::default();
        cam.resize(20, 20);
        cam.frame_canvas((10, 10));
        let mut lines = [DebugLines::new(1.0)];
        let image = cpu
            .render(FrameInput {
                viewport: (20, 20),
                camera: cam.uniform(),
                clear_color: [0.0, 0.0, 0.0, 1.0],
                layers: &[LayerDraw {
                    texture: id,
                    position: IVec2::ZERO,
                    z_offset: 0.0,
                    alpha: 1.0,
                }],
                lines: &mut lines,
            })
            .unwrap()
            .unwrap();
        let centre = ((10 * 20 + 10) * 4) as usize;
        assert_eq!(&image.pixels[centre..centre + 4], &[255, 0, 0, 255]);
        assert_eq!(&image.pixels[0..4], &[0, 0, 0, 255]);
    }
}
