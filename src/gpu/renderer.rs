// ============================================================================
// GPU BACKEND — texture arena + LayerBackend over wgpu
// ============================================================================
//
// Owns every layer texture in a generation-checked arena.  Removing an entry
// drops its wgpu texture, views and bind group; a stale `TextureId` can never
// reach a newer texture.  Paint and normal passes write mip 0 and flag the
// chain stale; `render` rebuilds stale chains before sampling.
// ============================================================================

use glam::IVec2;
use slotmap::SlotMap;

use super::compositor::{Compositor, LayerInstance};
use super::compute::{CombinePass, NormalPass, PaintPass};
use super::context::GpuContext;
use super::texture::{readback_texture, LayerTexture, MipmapPipeline};
use super::{CombineInput, FrameInput, LayerBackend, PaintParams, TextureId, ViewportImage};
use crate::arrows::ArrowBlock;
use crate::error::{Error, Result};

pub struct GpuBackend {
    ctx: GpuContext,
    textures: SlotMap<TextureId, LayerTexture>,
    mipmap: MipmapPipeline,
    compositor: Compositor,
    paint: PaintPass,
    normals: NormalPass,
    combine: CombinePass,
    /// Reused staging buffer for readbacks.
    staging: Option<(wgpu::Buffer, u64)>,
}

impl GpuBackend {
    pub fn new(preferred_gpu: &str) -> Result<Self> {
        let ctx = GpuContext::new(preferred_gpu)?;
        ctx.scoped("create_pipelines", || {
            let device = &ctx.device;
            Ok((
                MipmapPipeline::new(device),
                Compositor::new(device),
                PaintPass::new(device),
                NormalPass::new(device),
                CombinePass::new(device),
            ))
        })
        .map(|(mipmap, compositor, paint, normals, combine)| Self {
            textures: SlotMap::with_key(),
            mipmap,
            compositor,
            paint,
            normals,
            combine,
            staging: None,
            ctx,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_memory(&self) -> usize {
        self.textures
            .values()
            .map(|t| t.width as usize * t.height as usize * 4)
            .sum()
    }
}

impl LayerBackend for GpuBackend {
    fn name(&self) -> &str {
        &self.ctx.adapter_name
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId> {
        if width == 0 || height == 0 || rgba.len() != width as usize * height as usize * 4 {
            return Err(Error::gpu(
                "create_texture",
                format!("{} bytes for a {width}x{height} texture", rgba.len()),
            ));
        }
        if !self.ctx.supports_size(width, height) {
            return Err(Error::gpu(
                "create_texture",
                format!("{width}x{height} exceeds device limit {}", self.ctx.max_texture_dim),
            ));
        }
        let layer = self.ctx.scoped("create_texture", || {
            Ok(LayerTexture::new(
                &self.ctx,
                &self.compositor.layer_bgl,
                &self.compositor.camera_buffer,
                &self.compositor.sampler,
                width,
                height,
                rgba,
                &self.mipmap,
            ))
        })?;
        let id = self.textures.insert(layer);
        tracing::debug!(?id, width, height, "texture created");
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.paint.bound_target() == Some(id) {
            self.paint.release();
        }
        if self.normals.bound_target() == Some(id) {
            self.normals.release();
        }
        if self.textures.remove(id).is_some() {
            tracing::debug!(?id, "texture destroyed");
        }
    }

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(id).map(|t| (t.width, t.height))
    }

    fn bind_paint_target(&mut self, id: TextureId) -> Result<()> {
        let layer = self.textures.get(id).ok_or(Error::StaleTexture)?;
        let device = &self.ctx.device;
        let paint = &mut self.paint;
        self.ctx.scoped("bind_paint_target", || {
            paint.bind(device, id, layer);
            Ok(())
        })
    }

    fn release_paint_target(&mut self) {
        self.paint.release();
    }

    fn paint(&mut self, id: TextureId, params: &PaintParams) -> Result<()> {
        let layer = self.textures.get_mut(id).ok_or(Error::StaleTexture)?;
        let paint = &self.paint;
        let ctx = &self.ctx;
        let touched = ctx.scoped("paint", || paint.paint(ctx, id, layer, params))?;
        if touched {
            layer.mips_dirty = true;
        }
        Ok(())
    }

    fn bind_normal_target(&mut self, id: TextureId) -> Result<()> {
        let layer = self.textures.get(id).ok_or(Error::StaleTexture)?;
        let device = &self.ctx.device;
        let normals = &mut self.normals;
        self.ctx.scoped("bind_normal_target", || {
            normals.bind(device, id, layer);
            Ok(())
        })
    }

    fn release_normal_target(&mut self) {
        self.normals.release();
    }

    fn generate_normals(
        &mut self,
        id: TextureId,
        layer_position: IVec2,
        arrows: &ArrowBlock,
    ) -> Result<()> {
        let layer = self.textures.get_mut(id).ok_or(Error::StaleTexture)?;
        let normals = &self.normals;
        let ctx = &self.ctx;
        ctx.scoped("generate_normals", || {
            normals.generate(ctx, id, layer, layer_position, arrows)
        })?;
        layer.mips_dirty = true;
        Ok(())
    }

    fn combine(&mut self, canvas: (u32, u32), layers: &[CombineInput]) -> Result<Vec<u8>> {
        let mut inputs = Vec::with_capacity(layers.len());
        for input in layers {
            let layer = self.textures.get(input.texture).ok_or(Error::StaleTexture)?;
            inputs.push((layer, *input));
        }
        let ctx = &self.ctx;
        let combine = &mut self.combine;
        let staging = &mut self.staging;
        ctx.scoped("combine", || combine.combine(ctx, canvas, &inputs, staging))
    }

    fn read_pixels(&mut self, id: TextureId) -> Result<Vec<u8>> {
        let layer = self.textures.get(id).ok_or(Error::StaleTexture)?;
        let ctx = &self.ctx;
        let staging = &mut self.staging;
        ctx.scoped("read_pixels", || {
            readback_texture(ctx, &layer.texture, layer.width, layer.height, staging)
        })
    }

    fn render(&mut self, frame: FrameInput<'_>) -> Result<Option<ViewportImage>> {
        let ctx = &self.ctx;
        let mipmap = &self.mipmap;
        let textures = &mut self.textures;
        let compositor = &mut self.compositor;
        let staging = &mut self.staging;
        ctx.scoped("render", || {
            for layer in textures.values_mut() {
                layer.refresh_mips(ctx, mipmap);
            }

            let mut draws = frame.layers.to_vec();
            draws.sort_by(|a, b| a.z_offset.total_cmp(&b.z_offset));
            let mut layers = Vec::with_capacity(draws.len());
            for draw in &draws {
                let texture = textures.get(draw.texture).ok_or(Error::StaleTexture)?;
                layers.push((texture, LayerInstance::new(draw, texture.width, texture.height)));
            }
            compositor.render(ctx, frame, &layers, staging)
        })
    }
}
