//! WGPU-based video surface for VobPlayer
//!
//! Created on the event-loop thread from the window, then moved to the render
//! thread. Window resizes arrive through [`SurfaceSize`] and are applied at
//! the next present.

use crate::decoder::Frame;
use crate::renderer::pipeline::YuvPipeline;
use crate::renderer::texture::TextureManager;
use crate::renderer::{letterbox, SurfaceSize, VideoSurface};
use crate::utils::error::{IntoPlayerError, Result, VobPlayerError};
use std::sync::Arc;
use winit::window::Window;

/// WGPU surface implementation
pub struct WgpuSurface {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    pipeline: YuvPipeline,
    textures: TextureManager,

    /// Latest window size from the event loop
    size: Arc<SurfaceSize>,
}

impl WgpuSurface {
    /// Set up a device and surface for `window`
    pub fn new(window: Arc<Window>, size: Arc<SurfaceSize>) -> Result<Self> {
        pollster::block_on(Self::init(window, size))
    }

    async fn init(window: Arc<Window>, size: Arc<SurfaceSize>) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let inner = window.inner_size();
        size.set(inner.width, inner.height);

        let surface = instance
            .create_surface(window)
            .renderer_err("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .renderer_err("Failed to find suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("VobPlayer GPU Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .renderer_err("Failed to create GPU device")?;

        let caps = surface.get_capabilities(&adapter);

        // The shader already outputs gamma-encoded values
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| VobPlayerError::Renderer("Surface reports no formats".to_string()))?;

        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: inner.width.max(1),
            height: inner.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        log::info!(
            "Renderer: {} ({:?}), surface {:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format,
            surface_config.width,
            surface_config.height
        );

        let textures = TextureManager::new(&device);
        let pipeline = YuvPipeline::new(&device, textures.sampler(), format);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            pipeline,
            textures,
            size,
        })
    }

    /// Apply a pending window resize
    fn sync_size(&mut self) {
        let (width, height) = self.size.get();
        if width == 0 || height == 0 {
            return;
        }
        if (width, height) != (self.surface_config.width, self.surface_config.height) {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }
}

impl VideoSurface for WgpuSurface {
    fn upload(&mut self, frame: &Frame) -> Result<()> {
        if self.textures.upload(&self.device, &self.queue, frame)? {
            self.pipeline.planes_changed();
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.sync_size();

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(VobPlayerError::Renderer("Out of GPU memory".to_string()));
            }
            Err(e) => {
                log::warn!("Surface texture acquisition failed: {:?}", e);
                return Ok(());
            }
        };

        let view = surface_texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        let window = (self.surface_config.width, self.surface_config.height);
        let scale = letterbox(window, self.textures.aspect_ratio().unwrap_or(1.0));

        self.pipeline.draw(&self.device, &self.queue, &mut encoder, &view, &self.textures, scale);

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }
}
