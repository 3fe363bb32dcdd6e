// ============================================================================
// LAYER TEXTURE — one layer's pixels on the GPU, plus mipmaps and readback
// ============================================================================

use super::context::GpuContext;
use super::{aligned_bytes_per_row, strip_row_padding};
use crate::error::{Error, Result};

pub const LAYER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A GPU-side texture holding a single layer's pixel data.
///
/// Compute passes write mip 0 through `storage_view`; the remaining levels are
/// flagged stale and rebuilt before the texture is next sampled, so a sampled
/// chain is always complete.
pub struct LayerTexture {
    pub texture: wgpu::Texture,
    /// Full mip chain, used for sampling.
    pub view: wgpu::TextureView,
    /// Mip 0 only, for storage bindings.
    pub storage_view: wgpu::TextureView,
    /// Camera uniform + texture + sampler for the layer render pass.
    pub bind_group: wgpu::BindGroup,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub mips_dirty: bool,
}

impl LayerTexture {
    /// Upload `data` (tight RGBA8 rows) and build the full mip chain.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &GpuContext,
        bind_group_layout: &wgpu::BindGroupLayout,
        camera_buffer: &wgpu::Buffer,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
        data: &[u8],
        mip_pipeline: &MipmapPipeline,
    ) -> Self {
        let device = &ctx.device;
        let mip_levels = Self::mip_level_count(width, height);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("LayerTexture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: LAYER_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let storage_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("LayerTexture storage view"),
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LayerTexture bind group"),
            layout: bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let mut layer = Self {
            texture,
            view,
            storage_view,
            bind_group,
            width,
            height,
            mip_levels,
            mips_dirty: true,
        };
        layer.refresh_mips(ctx, mip_pipeline);
        layer
    }

    /// Rebuild levels 1.. from level 0 if a pass wrote to it.
    pub fn refresh_mips(&mut self, ctx: &GpuContext, mip_pipeline: &MipmapPipeline) {
        if self.mips_dirty {
            mip_pipeline.generate(ctx, &self.texture, self.width, self.height, self.mip_levels);
            self.mips_dirty = false;
        }
    }

    /// Full chain down to 1×1.
    pub fn mip_level_count(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }
}

// ============================================================================
// MIPMAP GENERATION PIPELINE
// ============================================================================

/// Compute pipeline that generates successive mip levels from level 0.
pub struct MipmapPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl MipmapPipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mipmap_shader"),
            source: wgpu::ShaderSource::Wgsl(super::shaders::MIPMAP_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mipmap_bgl"),
            entries: &[
                super::compute::sampled_texture_entry(0),
                super::compute::storage_texture_entry(1),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mipmap_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("mipmap_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "cs_mipmap",
            compilation_options: Default::default(),
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }

    /// Generate mip levels 1..mip_levels from mip level 0 of the given texture.
    pub fn generate(
        &self,
        ctx: &GpuContext,
        texture: &wgpu::Texture,
        mut width: u32,
        mut height: u32,
        mip_levels: u32,
    ) {
        if mip_levels < 2 {
            return;
        }
        let device = &ctx.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mipmap_encoder"),
        });

        for level in 1..mip_levels {
            let src_view = texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: level - 1,
                mip_level_count: Some(1),
                ..Default::default()
            });
            let dst_view = texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: level,
                mip_level_count: Some(1),
                ..Default::default()
            });
            let dst_w = (width / 2).max(1);
            let dst_h = (height / 2).max(1);

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mipmap_bg"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&dst_view),
                    },
                ],
            });

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("mipmap_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(dst_w.div_ceil(16), dst_h.div_ceil(16), 1);
            }

            width = dst_w;
            height = dst_h;
        }

        ctx.submit_and_wait(encoder);
    }
}

// ============================================================================
// READBACK
// ============================================================================

/// Copy mip 0 of `texture` to host memory as tight RGBA8 rows.
///
/// `cached_staging` is grown as needed and reused across calls.
pub fn readback_texture(
    ctx: &GpuContext,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    cached_staging: &mut Option<(wgpu::Buffer, u64)>,
) -> Result<Vec<u8>> {
    let device = &ctx.device;

    let bytes_per_row = aligned_bytes_per_row(width);
    let buffer_size = bytes_per_row as u64 * height as u64;

    let entry = match cached_staging.take() {
        Some((buf, size)) if size >= buffer_size => (buf, size),
        _ => {
            let buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_staging"),
                size: buffer_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            (buf, buffer_size)
        }
    };
    let staging = &cached_staging.insert(entry).0;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..buffer_size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(Error::gpu("readback", e)),
        Err(e) => return Err(Error::gpu("readback", e)),
    }

    let result = {
        let mapped = slice.get_mapped_range();
        strip_row_padding(&mapped, width, height)
    };
    staging.unmap();
    Ok(result)
}
