//! Core GPU context and device management.
//!
//! [`GpuContext`] holds the device, queue and window surface every other part of
//! the runtime records against. It is created once at startup from a winit
//! [`Window`] and passed by reference from then on.
//!
//! Device object creation is wrapped in [`GpuContext::scoped`], which turns
//! validation errors raised by wgpu into [`Error::ResourceCreation`] instead of
//! letting them reach the uncaptured error handler.
//!
//! # Example
//!
//! ```ignore
//! use mesh_nodes::{AppConfig, GpuContext};
//!
//! let gpu = GpuContext::new(window.clone(), &AppConfig::default())?;
//!
//! // Validation failures inside the closure come back as an error.
//! let buffer = gpu.scoped("scratch", |device| {
//!     device.create_buffer(&wgpu::BufferDescriptor {
//!         label: Some("Scratch"),
//!         size: 256,
//!         usage: wgpu::BufferUsages::STORAGE,
//!         mapped_at_creation: false,
//!     })
//! })?;
//! ```
//!
//! [`Window`]: winit::window::Window

use std::sync::Arc;

use winit::window::Window;

use crate::app::AppConfig;
use crate::error::{Error, Result};
use crate::memory::{BufferAllocator, BufferDesc};

/// Downlevel capabilities node graphs are emulated with.
const REQUIRED_DOWNLEVEL: &[(wgpu::DownlevelFlags, &str)] = &[
    (wgpu::DownlevelFlags::COMPUTE_SHADERS, "compute shaders"),
    (wgpu::DownlevelFlags::INDIRECT_EXECUTION, "indirect execution"),
    (wgpu::DownlevelFlags::VERTEX_STORAGE, "storage buffers in vertex shaders"),
];

/// Depth format used for mesh node depth testing.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Core GPU context holding wgpu resources.
///
/// This struct owns the surface frames are presented to, the device node
/// pipelines and backing memory are created on, and the queue recorded frames
/// are submitted to. The surface size is fixed for the life of the context.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
///
/// # Example
///
/// ```ignore
/// let gpu = GpuContext::new(window, &AppConfig::default())?;
/// let depth = gpu.create_depth_texture()?;
///
/// println!("{}x{} as {:?}", gpu.width(), gpu.height(), gpu.surface_format());
/// ```
pub struct GpuContext {
    /// The surface for presenting rendered frames to the window.
    pub surface: wgpu::Surface<'static>,
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create a new GPU context from a winit window.
    ///
    /// The adapter must support compute shaders, indirect execution and storage
    /// buffers in vertex shaders. The surface prefers a non-sRGB format so the
    /// colors written by mesh nodes reach the screen unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] if the adapter lacks a required capability, or any
    /// error from surface, adapter or device creation.
    pub fn new(window: Arc<Window>, app: &AppConfig) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        if let Some((_, missing)) = REQUIRED_DOWNLEVEL
            .iter()
            .find(|(flag, _)| !downlevel.flags.contains(*flag))
        {
            return Err(Error::Unsupported {
                missing: (*missing).to_string(),
            });
        }
        tracing::info!(adapter = %info.name, backend = ?info.backend, "adapter selected");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Mesh Nodes Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| Error::Unsupported {
                missing: "a presentable surface format".into(),
            })?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: app.frames_in_flight,
        };
        surface.configure(&device, &config);
        tracing::debug!(format = ?surface_format, frames = app.frames_in_flight, "surface configured");

        Ok(Self {
            surface,
            device,
            queue,
            config,
        })
    }

    /// Runs `f` inside a validation error scope.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceCreation`] naming `what` if any call made by `f` failed
    /// validation.
    pub fn scoped<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(Error::ResourceCreation {
                what: what.to_string(),
                message: error.to_string(),
            }),
            None => Ok(value),
        }
    }

    /// Creates a [`DEPTH_FORMAT`] target matching the surface size.
    ///
    /// Mesh node pipelines are built against the same format, so the view can
    /// be passed straight to
    /// [`GraphicsCommandList::om_set_render_targets`](crate::GraphicsCommandList::om_set_render_targets).
    pub fn create_depth_texture(&self) -> Result<wgpu::TextureView> {
        self.scoped("depth buffer", |device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Depth Texture"),
                size: wgpu::Extent3d {
                    width: self.width(),
                    height: self.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            texture.create_view(&wgpu::TextureViewDescriptor::default())
        })
    }

    /// Returns the current surface width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current surface height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Color format of the surface; mesh node programs render to it.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}

impl BufferAllocator for GpuContext {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<wgpu::Buffer> {
        self.scoped(&desc.label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&desc.label),
                size: desc.size,
                usage: desc.usages(),
                mapped_at_creation: false,
            })
        })
    }
}
