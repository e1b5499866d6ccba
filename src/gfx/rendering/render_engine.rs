//! wgpu surface, device and frame submission
//!
//! The engine owns the window surface and the [`WgpuDevice`] every resource
//! wrapper talks to. Drawing code records into the device during the frame;
//! [`RenderEngine::render_frame`] replays that recording into the surface,
//! lets the UI draw on top, presents, and reports any validation errors wgpu
//! raised along the way.

use std::rc::Rc;
use std::sync::Arc;

use wgpu::TextureFormat;

use crate::error::AppError;
use crate::gfx::device::{SharedDevice, WgpuDevice};
use crate::gfx::resources::DepthTexture;

/// What happened to a frame handed to [`RenderEngine::render_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The surface was unavailable; the recorded work was discarded
    Skipped,
}

pub struct RenderEngine {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth_texture: DepthTexture,
    device: Rc<WgpuDevice>,
    shared: SharedDevice,
}

impl RenderEngine {
    /// Creates the surface, picks an adapter and opens the device
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<RenderEngine, AppError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let info = adapter.get_info();
        log::info!("adapter: {} ({:?}, {:?})", info.name, info.device_type, info.backend);

        let required_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features,
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or(AppError::NoSurfaceFormat)?;
        let alpha_mode = surface_capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("surface {}x{} {:?}", config.width, config.height, format);

        let depth_texture = DepthTexture::create(&device, &config, "depth_texture");

        let device = Rc::new(WgpuDevice::new(Arc::new(device), Arc::new(queue), format));
        let shared: SharedDevice = device.clone();

        Ok(RenderEngine {
            surface,
            config,
            depth_texture,
            device,
            shared,
        })
    }

    /// The device resource wrappers are created on
    pub fn device(&self) -> &SharedDevice {
        &self.shared
    }

    pub fn wgpu_device(&self) -> &WgpuDevice {
        &self.device
    }

    pub fn surface_format(&self) -> TextureFormat {
        self.config.format
    }

    pub fn get_surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigures the surface and recreates the depth buffer.
    /// Zero-sized requests (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(self.device.raw_device(), &self.config);
        self.depth_texture =
            DepthTexture::create(self.device.raw_device(), &self.config, "depth_texture");
    }

    /// Replays the frame recorded on the device into the surface, then runs
    /// `ui_callback` on the same encoder before presenting.
    pub fn render_frame<F>(&mut self, ui_callback: F) -> FrameStatus
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, reconfiguring");
                self.surface.configure(self.device.raw_device(), &self.config);
                self.discard_frame();
                return FrameStatus::Skipped;
            }
            Err(e) => {
                log::error!("failed to acquire surface texture: {e}");
                self.discard_frame();
                return FrameStatus::Skipped;
            }
        };
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let raw = self.device.raw_device();
        let queue = self.device.queue();
        let mut encoder = raw.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        self.device
            .flush(&mut encoder, &surface_view, &self.depth_texture.view);
        ui_callback(raw.as_ref(), queue.as_ref(), &mut encoder, &surface_view);

        queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();

        self.report_errors();
        FrameStatus::Presented
    }

    fn discard_frame(&self) {
        let dropped = self.device.discard_frame();
        if dropped > 0 {
            log::debug!("dropped {dropped} recorded passes");
        }
        self.report_errors();
    }

    fn report_errors(&self) {
        for error in self.device.drain_errors() {
            log::error!("GPU validation error: {error}");
        }
    }
}
