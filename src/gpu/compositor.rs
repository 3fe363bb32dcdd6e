// ============================================================================
// COMPOSITOR — per-frame viewport rendering of layers and debug lines
// ============================================================================
//
// One render pass per frame into an offscreen colour + depth target:
//
//   1. Layers: one instanced quad draw per layer, back to front by ZOff.
//      Each draw binds that layer's own bind group (shared camera uniform +
//      texture + sampler); placement, depth and opacity come from the
//      instance buffer so editing them never touches a bind group.
//   2. Debug lines: each line set keeps its own vertex buffer, re-uploaded
//      only when the set reports a change.
//
// The colour target is then read back for display in egui.
// ============================================================================

use bytemuck::{Pod, Zeroable};

use super::context::GpuContext;
use super::texture::{readback_texture, LayerTexture};
use super::{FrameInput, LayerDraw, ViewportImage};
use crate::camera::CameraUniform;
use crate::debug_lines::{DebugLines, LineVertex};
use crate::error::Result;

const VIEWPORT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// ============================================================================
// UNIFORM / VERTEX TYPES
// ============================================================================

/// Per-draw layer parameters, fed as instance attributes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LayerInstance {
    pub position: [f32; 2],
    pub size: [f32; 2],
    pub depth: f32,
    pub alpha: f32,
}

impl LayerInstance {
    pub fn new(draw: &LayerDraw, width: u32, height: u32) -> Self {
        Self {
            position: draw.position.as_vec2().to_array(),
            size: [width as f32, height as f32],
            depth: depth_for_z(draw.z_offset),
            alpha: draw.alpha.clamp(0.0, 1.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct LineParams {
    alpha: f32,
    _pad: [f32; 3],
}

/// Map a layer's ZOff into (0, 1) clip depth: larger ZOff is nearer.
pub fn depth_for_z(z_offset: f32) -> f32 {
    (0.5 - z_offset.atan() / std::f32::consts::PI).clamp(0.0, 1.0)
}

/// Growable vertex/instance buffer, doubled when too small.
struct GrowBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    label: &'static str,
    usage: wgpu::BufferUsages,
}

impl GrowBuffer {
    fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages, capacity: u64) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: capacity,
                usage,
                mapped_at_creation: false,
            }),
            capacity,
            label,
            usage,
        }
    }

    fn write(&mut self, ctx: &GpuContext, bytes: &[u8]) {
        let needed = bytes.len() as u64;
        if needed > self.capacity {
            let mut capacity = self.capacity.max(256);
            while capacity < needed {
                capacity *= 2;
            }
            *self = Self::new(&ctx.device, self.label, self.usage, capacity);
        }
        if !bytes.is_empty() {
            ctx.queue.write_buffer(&self.buffer, 0, bytes);
        }
    }
}

/// GPU side of one `DebugLines` set.
struct LineSlot {
    vertices: GrowBuffer,
    vertex_count: u32,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct ViewportTargets {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    size: (u32, u32),
}

// ============================================================================
// COMPOSITOR
// ============================================================================

pub struct Compositor {
    layer_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    /// Bind group layout every `LayerTexture` is created against.
    pub layer_bgl: wgpu::BindGroupLayout,
    line_bgl: wgpu::BindGroupLayout,
    pub camera_buffer: wgpu::Buffer,
    pub sampler: wgpu::Sampler,
    instances: GrowBuffer,
    lines: Vec<LineSlot>,
    targets: Option<ViewportTargets>,
}

impl Compositor {
    pub fn new(device: &wgpu::Device) -> Self {
        let layer_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("layer_shader"),
            source: wgpu::ShaderSource::Wgsl(super::shaders::LAYER_SHADER.into()),
        });
        let line_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("line_shader"),
            source: wgpu::ShaderSource::Wgsl(super::shaders::LINE_SHADER.into()),
        });

        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let layer_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer_bgl"),
            entries: &[
                uniform_entry(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let line_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("line_bgl"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });

        let blend = Some(wgpu::BlendState::ALPHA_BLENDING);

        let layer_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("layer_pipeline_layout"),
            bind_group_layouts: &[&layer_bgl],
            push_constant_ranges: &[],
        });
        let layer_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("layer_pipeline"),
            layout: Some(&layer_layout),
            vertex: wgpu::VertexState {
                module: &layer_shader,
                entry_point: "vs_layer",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<LayerInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x2,
                        1 => Float32x2,
                        2 => Float32,
                        3 => Float32,
                    ],
                }],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &layer_shader,
                entry_point: "fs_layer",
                targets: &[Some(wgpu::ColorTargetState {
                    format: VIEWPORT_FORMAT,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        let line_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("line_pipeline_layout"),
            bind_group_layouts: &[&line_bgl],
            push_constant_ranges: &[],
        });
        let line_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("line_pipeline"),
            layout: Some(&line_layout),
            vertex: wgpu::VertexState {
                module: &line_shader,
                entry_point: "vs_line",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<LineVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x3],
                }],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &line_shader,
                entry_point: "fs_line",
                targets: &[Some(wgpu::ColorTargetState {
                    format: VIEWPORT_FORMAT,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera_uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Nearest when magnified so single pixels stay crisp; trilinear when
        // zoomed out.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("layer_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let instances = GrowBuffer::new(
            device,
            "layer_instances",
            wgpu::BufferUsages::VERTEX,
            (std::mem::size_of::<LayerInstance>() * 16) as u64,
        );

        Self {
            layer_pipeline,
            line_pipeline,
            layer_bgl,
            line_bgl,
            camera_buffer,
            sampler,
            instances,
            lines: Vec::new(),
            targets: None,
        }
    }

    fn ensure_targets(&mut self, device: &wgpu::Device, w: u32, h: u32) {
        if self.targets.as_ref().is_some_and(|t| t.size == (w, h)) {
            return;
        }
        let size = wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("viewport_color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: VIEWPORT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("viewport_depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        self.targets = Some(ViewportTargets {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            size: (w, h),
        });
    }

    fn sync_lines(&mut self, ctx: &GpuContext, sets: &mut [DebugLines]) {
        while self.lines.len() < sets.len() {
            let params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("line_params"),
                size: std::mem::size_of::<LineParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("line_bg"),
                layout: &self.line_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.camera_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: params.as_entire_binding(),
                    },
                ],
            });
            self.lines.push(LineSlot {
                vertices: GrowBuffer::new(&ctx.device, "line_vertices", wgpu::BufferUsages::VERTEX, 1024),
                vertex_count: 0,
                params,
                bind_group,
            });
        }

        for (slot, set) in self.lines.iter_mut().zip(sets.iter_mut()) {
            if set.take_dirty() {
                slot.vertices.write(ctx, bytemuck::cast_slice(set.vertices()));
                slot.vertex_count = set.vertices().len() as u32;
            }
            let params = LineParams {
                alpha: set.alpha,
                _pad: [0.0; 3],
            };
            ctx.queue.write_buffer(&slot.params, 0, bytemuck::bytes_of(&params));
        }
    }

    /// Draw one frame. `layers` must already be in back-to-front order.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        frame: FrameInput<'_>,
        layers: &[(&LayerTexture, LayerInstance)],
        staging: &mut Option<(wgpu::Buffer, u64)>,
    ) -> Result<Option<ViewportImage>> {
        let (w, h) = frame.viewport;
        if w == 0 || h == 0 {
            return Ok(None);
        }
        let device = &ctx.device;
        self.ensure_targets(device, w, h);
        self.sync_lines(ctx, frame.lines);
        ctx.queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&frame.camera));

        let instances: Vec<LayerInstance> = layers.iter().map(|(_, inst)| *inst).collect();
        self.instances.write(ctx, bytemuck::cast_slice(&instances));

        let Some(targets) = &self.targets else {
            return Ok(None);
        };
        let [r, g, b, a] = frame.clear_color.map(f64::from);
        let visible_lines = frame.lines.len().min(self.lines.len());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("viewport_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("viewport_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if !layers.is_empty() {
                pass.set_pipeline(&self.layer_pipeline);
                pass.set_vertex_buffer(0, self.instances.buffer.slice(..));
                for (i, (texture, _)) in layers.iter().enumerate() {
                    let i = i as u32;
                    pass.set_bind_group(0, &texture.bind_group, &[]);
                    pass.draw(0..6, i..i + 1);
                }
            }

            pass.set_pipeline(&self.line_pipeline);
            for (slot, set) in self.lines[..visible_lines].iter().zip(frame.lines.iter()) {
                if slot.vertex_count == 0 || set.alpha <= 0.0 {
                    continue;
                }
                pass.set_bind_group(0, &slot.bind_group, &[]);
                pass.set_vertex_buffer(0, slot.vertices.buffer.slice(..));
                pass.draw(0..slot.vertex_count, 0..1);
            }
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let pixels = readback_texture(ctx, &targets.color, w, h, staging)?;
        Ok(Some(ViewportImage {
            width: w,
            height: h,
            pixels,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn larger_z_is_nearer() {
        assert!(depth_for_z(1.0) < depth_for_z(0.0));
        assert!(depth_for_z(0.0) < depth_for_z(-3.0));
        assert!((depth_for_z(0.0) - 0.5).abs() < 1e-6);
        assert!(depth_for_z(1e9) >= 0.0 && depth_for_z(-1e9) <= 1.0);
    }

    #[test]
    fn instance_matches_vertex_layout() {
        assert_eq!(std::mem::size_of::<LayerInstance>(), 24);
        assert_eq!(std::mem::size_of::<LineParams>(), 16);
    }
}
