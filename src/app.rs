//! Window host and per-frame loop.
//!
//! [`run`] opens a fixed-size window, builds the snowflake graph once and then
//! dispatches it every frame until the window is closed. Startup is strictly
//! sequential: compile, build the topology, size and bind, then render.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::binder;
use crate::compiler::{Profile, ProgramCompiler};
use crate::dispatcher::FrameDispatcher;
use crate::error::{Error, Result};
use crate::fence::Fence;
use crate::gpu::{DEPTH_FORMAT, GpuContext};
use crate::runtime::{
    GraphicsCommandList, RootConstants, RootSignature, ScissorRect, StateObject, Viewport,
};
use crate::snowflake::{self, MAX_SNOWFLAKE_RECURSIONS};
use crate::state_object::RootSignatureDesc;
use crate::topology::{self, DEFAULT_FRAGMENT_ENTRY, GRAPH_NAME};

const SNOWFLAKE_SOURCE: &str = include_str!("shaders/snowflake.wgsl");
const CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Configuration for the app window.
///
/// # Example
/// ```ignore
/// let config = AppConfig::new()
///     .title("Snowflake")
///     .size(1024, 1024)
///     .frames_in_flight(3);
/// mesh_nodes::run(config)?;
/// ```
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Surface frame latency.
    pub frames_in_flight: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Hello Mesh Nodes".to_string(),
            width: 720,
            height: 720,
            frames_in_flight: 2,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the surface frame latency. Values below one are raised to one.
    pub fn frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }
}

/// Runs the snowflake harness until the window closes.
///
/// Opens the window, compiles `shaders/snowflake.wgsl` for both profiles,
/// builds and sizes the graph, then dispatches it once per frame. Escape or
/// closing the window ends the run.
///
/// # Example
/// ```ignore
/// fn main() -> mesh_nodes::Result<()> {
///     mesh_nodes::run(mesh_nodes::AppConfig::default())
/// }
/// ```
///
/// # Errors
///
/// The first error raised during startup or any frame. Every error ends the
/// session.
pub fn run(config: AppConfig) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = MeshNodesApp::Pending { config };
    event_loop.run_app(&mut app)?;

    match app {
        MeshNodesApp::Failed(error) => Err(error),
        _ => Ok(()),
    }
}

struct Session {
    window: Arc<Window>,
    gpu: GpuContext,
    state_object: StateObject,
    root_signature: RootSignature,
    dispatcher: FrameDispatcher<RootSignature, wgpu::Buffer>,
    fence: Fence,
    depth: wgpu::TextureView,
    start_time: Instant,
}

impl Session {
    fn new(event_loop: &ActiveEventLoop, config: &AppConfig) -> Result<Self> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let mut gpu = GpuContext::new(window.clone(), config)?;

        let (library, fragment) = {
            let mut compiler = ProgramCompiler::new();
            let library = compiler.compile(SNOWFLAKE_SOURCE, None, Profile::Library)?;
            let fragment = compiler.compile(
                SNOWFLAKE_SOURCE,
                Some(DEFAULT_FRAGMENT_ENTRY),
                Profile::Fragment,
            )?;
            (library, fragment)
        };

        let root_desc = RootSignatureDesc::with_constants();
        let state_object = topology::hello_mesh_nodes(&library, &fragment).build(
            &gpu,
            &root_desc,
            gpu.surface_format(),
            DEPTH_FORMAT,
        )?;
        let root_signature = RootSignature::new(&gpu, &root_desc)?;
        let desc = binder::prepare(&state_object, GRAPH_NAME, &mut gpu)?;
        let depth = gpu.create_depth_texture()?;

        let expected = snowflake::expand(MAX_SNOWFLAKE_RECURSIONS);
        tracing::info!(
            lines = expected.lines.len(),
            fills = expected.fills.len(),
            max_recursion = MAX_SNOWFLAKE_RECURSIONS,
            "expected draw records per frame"
        );

        Ok(Self {
            window,
            gpu,
            state_object,
            dispatcher: FrameDispatcher::new(root_signature.clone(), desc),
            root_signature,
            fence: Fence::new(),
            depth,
            start_time: Instant::now(),
        })
    }

    fn render(&mut self) -> Result<()> {
        let (width, height) = (self.gpu.width(), self.gpu.height());
        self.root_signature.write_constants(
            &self.gpu.queue,
            &RootConstants {
                resolution: [width as f32, height as f32],
                time: self.start_time.elapsed().as_secs_f32(),
                _pad: 0.0,
            },
        );

        let output = self.gpu.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut commands = GraphicsCommandList::new(&self.gpu, &self.state_object);
        commands.rs_set_viewport(Viewport::full(width, height));
        commands.rs_set_scissor_rect(ScissorRect::full(width, height));
        commands.clear_render_target_view(&view, CLEAR_COLOR);
        commands.clear_depth_stencil_view(&self.depth, 1.0);
        commands.om_set_render_targets(&view, Some(&self.depth));
        self.dispatcher.dispatch_frame(&mut commands)?;

        let submission = self.gpu.queue.submit(std::iter::once(commands.finish()));
        output.present();

        // Wait for the frame to finish before recording the next one.
        let value = self.fence.signal(&self.gpu.queue, submission);
        self.fence.wait(&self.gpu.device, value)
    }
}

enum MeshNodesApp {
    Pending { config: AppConfig },
    Running(Box<Session>),
    Failed(Error),
}

impl MeshNodesApp {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        tracing::error!(%error, "session ended");
        *self = MeshNodesApp::Failed(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for MeshNodesApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let MeshNodesApp::Pending { config } = self else {
            return;
        };
        match Session::new(event_loop, config) {
            Ok(session) => {
                session.window.request_redraw();
                *self = MeshNodesApp::Running(Box::new(session));
            }
            Err(error) => self.fail(event_loop, error),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let MeshNodesApp::Running(session) = self else {
            return;
        };

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                tracing::info!(frames = session.dispatcher.frames(), "closing");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => match session.render() {
                Ok(()) => session.window.request_redraw(),
                Err(error) => self.fail(event_loop, error),
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_snowflake_window() {
        let config = AppConfig::default();
        assert_eq!(config.title, "Hello Mesh Nodes");
        assert_eq!((config.width, config.height), (720, 720));
        assert_eq!(config.frames_in_flight, 2);
    }

    #[test]
    fn builder_overrides_and_clamps() {
        let config = AppConfig::new()
            .title("Snowflake")
            .size(1280, 720)
            .frames_in_flight(0);
        assert_eq!(config.title, "Snowflake");
        assert_eq!(config.width, 1280);
        assert_eq!(config.frames_in_flight, 1);
    }
}
