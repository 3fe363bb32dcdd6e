// ============================================================================
// GPU COMPUTE PASSES — brush paint, normal generation, layer combine
// ============================================================================
//
// Each pass owns its pipeline, its uniform buffer and at most one live bind
// group.  Binding a new target drops the previous bind group first; every
// dispatch is its own submission and is waited on before returning.
// ============================================================================

use bytemuck::{Pod, Zeroable};
use glam::IVec2;

use super::context::GpuContext;
use super::texture::{readback_texture, LayerTexture, LAYER_FORMAT};
use super::{brush_bounds, brush_local, CombineInput, PaintParams, TextureId, WORKGROUP_SIZE};
use crate::arrows::ArrowBlock;
use crate::error::{Error, Result};

// ============================================================================
// SHARED HELPERS
// ============================================================================

pub(crate) fn sampled_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: LAYER_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    entry_point: &str,
    bgl: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module: &shader,
        entry_point,
        compilation_options: Default::default(),
    })
}

fn dispatch(
    ctx: &GpuContext,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    extent: (u32, u32),
    encoder: Option<wgpu::CommandEncoder>,
) {
    let mut encoder = encoder.unwrap_or_else(|| {
        ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(
            extent.0.div_ceil(WORKGROUP_SIZE),
            extent.1.div_ceil(WORKGROUP_SIZE),
            1,
        );
    }
    ctx.submit_and_wait(encoder);
}

// ============================================================================
// PAINT
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PaintUniform {
    color: [f32; 4],
    center: [i32; 2],
    origin: [u32; 2],
    extent: [u32; 2],
    radius: i32,
    _pad: u32,
}

/// The single reusable paint binding: one layer's mip 0 as a storage image.
struct PaintBinding {
    target: TextureId,
    bind_group: wgpu::BindGroup,
}

pub struct PaintPass {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    bound: Option<PaintBinding>,
}

impl PaintPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("paint_bgl"),
            entries: &[storage_texture_entry(0), uniform_entry(1)],
        });
        let pipeline =
            compute_pipeline(device, "paint_pipeline", super::shaders::PAINT_SHADER, "cs_paint", &bgl);
        let params = uniform_buffer(device, "paint_params", std::mem::size_of::<PaintUniform>() as u64);
        Self {
            pipeline,
            bgl,
            params,
            bound: None,
        }
    }

    pub fn bound_target(&self) -> Option<TextureId> {
        self.bound.as_ref().map(|b| b.target)
    }

    pub fn bind(&mut self, device: &wgpu::Device, id: TextureId, layer: &LayerTexture) {
        self.release();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("paint_bg"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&layer.storage_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.params.as_entire_binding(),
                },
            ],
        });
        self.bound = Some(PaintBinding {
            target: id,
            bind_group,
        });
    }

    pub fn release(&mut self) {
        self.bound = None;
    }

    /// Dispatch over the dab's bounding box only.  Returns whether any texel
    /// could have changed.
    pub fn paint(
        &self,
        ctx: &GpuContext,
        id: TextureId,
        layer: &LayerTexture,
        params: &PaintParams,
    ) -> Result<bool> {
        let binding = match &self.bound {
            Some(b) if b.target == id => b,
            _ => return Err(Error::gpu("paint", "texture is not the bound paint target")),
        };
        let Some((x, y, w, h)) = brush_bounds(params, layer.width, layer.height) else {
            return Ok(false);
        };
        let (cx, cy) = brush_local(params);
        let (Ok(cx), Ok(cy)) = (i32::try_from(cx), i32::try_from(cy)) else {
            return Ok(false);
        };
        let uniform = PaintUniform {
            color: params.color,
            center: [cx, cy],
            origin: [x, y],
            extent: [w, h],
            radius: params.radius,
            _pad: 0,
        };
        ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&uniform));
        dispatch(ctx, "paint_pass", &self.pipeline, &binding.bind_group, (w, h), None);
        Ok(true)
    }
}

// ============================================================================
// NORMAL GENERATION
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct NormalUniform {
    layer_position: [i32; 2],
    size: [u32; 2],
}

/// Bound normal target plus the read-only copy of it the shader samples.
struct NormalBinding {
    target: TextureId,
    scratch: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

pub struct NormalPass {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    arrows: wgpu::Buffer,
    params: wgpu::Buffer,
    bound: Option<NormalBinding>,
}

impl NormalPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("normal_bgl"),
            entries: &[
                sampled_texture_entry(0),
                storage_texture_entry(1),
                uniform_entry(2),
                uniform_entry(3),
            ],
        });
        let pipeline = compute_pipeline(
            device,
            "normal_pipeline",
            super::shaders::NORMAL_SHADER,
            "cs_normals",
            &bgl,
        );
        let arrows = uniform_buffer(device, "normal_arrows", ArrowBlock::BYTE_SIZE as u64);
        let params = uniform_buffer(device, "normal_params", std::mem::size_of::<NormalUniform>() as u64);
        Self {
            pipeline,
            bgl,
            arrows,
            params,
            bound: None,
        }
    }

    pub fn bound_target(&self) -> Option<TextureId> {
        self.bound.as_ref().map(|b| b.target)
    }

    pub fn bind(&mut self, device: &wgpu::Device, id: TextureId, layer: &LayerTexture) {
        self.release();
        let scratch = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("normal_source"),
            size: wgpu::Extent3d {
                width: layer.width,
                height: layer.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: LAYER_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let scratch_view = scratch.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("normal_bg"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&scratch_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&layer.storage_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.arrows.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.params.as_entire_binding(),
                },
            ],
        });
        self.bound = Some(NormalBinding {
            target: id,
            scratch,
            bind_group,
        });
    }

    pub fn release(&mut self) {
        self.bound = None;
    }

    pub fn generate(
        &self,
        ctx: &GpuContext,
        id: TextureId,
        layer: &LayerTexture,
        layer_position: IVec2,
        arrows: &ArrowBlock,
    ) -> Result<()> {
        let binding = match &self.bound {
            Some(b) if b.target == id => b,
            _ => return Err(Error::gpu("generate_normals", "texture is not the bound normal target")),
        };

        ctx.queue.write_buffer(&self.arrows, 0, &arrows.to_bytes());
        let uniform = NormalUniform {
            layer_position: layer_position.to_array(),
            size: [layer.width, layer.height],
        };
        ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&uniform));

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("normal_encoder"),
        });
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: &layer.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: &binding.scratch,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: layer.width,
                height: layer.height,
                depth_or_array_layers: 1,
            },
        );
        dispatch(
            ctx,
            "normal_pass",
            &self.pipeline,
            &binding.bind_group,
            (layer.width, layer.height),
            Some(encoder),
        );
        Ok(())
    }
}

// ============================================================================
// COMBINE (ping-pong over two canvas-sized images)
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CombineUniform {
    position: [i32; 2],
    layer_size: [u32; 2],
    canvas: [u32; 2],
    alpha: f32,
    _pad: f32,
}

pub struct CombinePass {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    ping_pong: Option<[wgpu::Texture; 2]>,
    pp_size: (u32, u32),
    /// The single combine binding, rebuilt for every layer.
    bound: Option<wgpu::BindGroup>,
}

impl CombinePass {
    pub fn new(device: &wgpu::Device) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("combine_bgl"),
            entries: &[
                sampled_texture_entry(0),
                sampled_texture_entry(1),
                storage_texture_entry(2),
                uniform_entry(3),
            ],
        });
        let pipeline = compute_pipeline(
            device,
            "combine_pipeline",
            super::shaders::COMBINE_SHADER,
            "cs_combine",
            &bgl,
        );
        let params = uniform_buffer(device, "combine_params", std::mem::size_of::<CombineUniform>() as u64);
        Self {
            pipeline,
            bgl,
            params,
            ping_pong: None,
            pp_size: (0, 0),
            bound: None,
        }
    }

    fn ensure_ping_pong(&mut self, device: &wgpu::Device, w: u32, h: u32) {
        if self.pp_size == (w, h) && self.ping_pong.is_some() {
            return;
        }
        let make = |label| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: LAYER_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };
        self.ping_pong = Some([make("combine_ping"), make("combine_pong")]);
        self.pp_size = (w, h);
    }

    /// Flatten `layers` back to front and read the result back.
    pub fn combine(
        &mut self,
        ctx: &GpuContext,
        canvas: (u32, u32),
        layers: &[(&LayerTexture, CombineInput)],
        staging: &mut Option<(wgpu::Buffer, u64)>,
    ) -> Result<Vec<u8>> {
        let (cw, ch) = canvas;
        if layers.is_empty() || cw == 0 || ch == 0 {
            return Ok(vec![0; cw as usize * ch as usize * 4]);
        }
        let device = &ctx.device;
        self.ensure_ping_pong(device, cw, ch);
        let Some(ping_pong) = &self.ping_pong else {
            return Err(Error::gpu("combine", "scratch images missing"));
        };
        let views = [
            ping_pong[0].create_view(&wgpu::TextureViewDescriptor::default()),
            ping_pong[1].create_view(&wgpu::TextureViewDescriptor::default()),
        ];

        // Start from a transparent accumulator.
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("combine_clear"),
        });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("combine_clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &views[0],
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        ctx.submit_and_wait(encoder);

        let mut src = 0;
        for (layer, input) in layers {
            let dst = 1 - src;
            let uniform = CombineUniform {
                position: input.position.to_array(),
                layer_size: [layer.width, layer.height],
                canvas: [cw, ch],
                alpha: input.alpha,
                _pad: 0.0,
            };
            ctx.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&uniform));

            self.bound = None;
            let bind_group = self.bound.insert(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("combine_bg"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&views[src]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&layer.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&views[dst]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.params.as_entire_binding(),
                    },
                ],
            }));
            dispatch(ctx, "combine_pass", &self.pipeline, bind_group, (cw, ch), None);
            src = dst;
        }
        self.bound = None;

        readback_texture(ctx, &ping_pong[src], cw, ch, staging)
    }
}
