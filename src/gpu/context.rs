// ============================================================================
// GPU CONTEXT — wgpu Device, Queue, adapter initialization, error scopes
// ============================================================================

use std::sync::Arc;

use crate::error::{Error, Result};

/// Holds the core wgpu resources shared by every pass.
/// Created once at startup; without an adapter the CPU backend takes over.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
}

impl GpuContext {
    /// Tries a hardware adapter first, then the software fallback.
    ///
    /// eframe does not hand its device to application code, so the editor
    /// opens its own for compute and offscreen rendering.
    pub fn new(preferred_gpu: &str) -> Result<Self> {
        if let Some(ctx) = pollster::block_on(Self::new_async(preferred_gpu, false)) {
            return Ok(ctx);
        }
        tracing::warn!("hardware adapter unavailable, trying software fallback");
        pollster::block_on(Self::new_async(preferred_gpu, true)).ok_or(Error::NoAdapter)
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let wanted = preferred_gpu.trim().to_lowercase();
        let power = match wanted.as_str() {
            "low power" | "integrated" => wgpu::PowerPreference::LowPower,
            _ => wgpu::PowerPreference::HighPerformance,
        };

        // A name fragment picks a specific adapter; anything else goes by power preference.
        let named = if wanted.is_empty() || force_fallback {
            None
        } else {
            instance
                .enumerate_adapters(wgpu::Backends::all())
                .into_iter()
                .find(|a| a.get_info().name.to_lowercase().contains(&wanted))
        };
        let adapter = match named {
            Some(adapter) => adapter,
            None => {
                instance
                    .request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: power,
                        compatible_surface: None,
                        force_fallback_adapter: force_fallback,
                    })
                    .await?
            }
        };

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("NormalMaker GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        max_uniform_buffer_binding_size: limits.max_uniform_buffer_binding_size,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .map_err(|e| tracing::warn!(adapter = %adapter_name, "request_device failed: {e}"))
            .ok()?;

        device.on_uncaptured_error(Box::new(|e| {
            tracing::error!("uncaptured wgpu error: {e}");
        }));

        tracing::info!(adapter = %adapter_name, fallback = force_fallback, "GPU context ready");

        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
        })
    }

    /// Check if a texture of the given dimensions can be created.
    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    /// Submit one encoder and block until the device has finished it.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Run `f` inside validation + out-of-memory error scopes and turn any
    /// captured error into `Error::Gpu` tagged with `op`.
    pub fn scoped<T>(&self, op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(e) = validation.or(oom) {
            tracing::error!(op, "GPU error: {e}");
            return Err(Error::gpu(op, e));
        }
        out
    }
}
