//! # Mesh Nodes
//!
//! **A recursive GPU node graph whose leaves draw.**
//!
//! A node graph is written as WGSL functions annotated with `//#` directives,
//! compiled, linked into a program object, sized for its worst case and then
//! dispatched once per frame from a single seed record. The bundled graph draws
//! a Koch snowflake: one entry node, one recursive node that splits edges until
//! its budget runs out, and two mesh nodes that rasterize fills and outlines.
//!
//! ## Quick Start
//!
//! ```ignore
//! fn main() -> mesh_nodes::Result<()> {
//!     mesh_nodes::run(mesh_nodes::AppConfig::default())
//! }
//! ```
//!
//! ## Pipeline
//!
//! - [`compiler`] turns WGSL into library and fragment modules.
//! - [`topology`] describes the graph and its draw state as a [`StateObjectDesc`].
//! - [`StateObject`] links the description and creates its pipelines.
//! - [`binder::prepare`] sizes the graph and allocates its backing memory.
//! - [`FrameDispatcher`] records the dispatch every frame.

mod app;
pub mod binder;
pub mod compiler;
pub mod dispatcher;
mod error;
mod fence;
mod gpu;
pub mod memory;
mod node;
pub mod program;
pub mod runtime;
pub mod snowflake;
pub mod state_object;
pub mod topology;

pub use app::{AppConfig, run};
pub use binder::{SetProgramDesc, SetWorkGraphFlags};
pub use dispatcher::{DispatchGraphDesc, FrameDispatcher, GraphCommands};
pub use error::{Error, GraphError, Result};
pub use fence::Fence;
pub use gpu::{DEPTH_FORMAT, GpuContext};
pub use node::{NodeId, NodeLaunch};
pub use program::{Program, ProgramIdentifier, ProgramKind, ProgramObject};
pub use runtime::{GraphicsCommandList, RootConstants, RootSignature, StateObject};
pub use state_object::StateObjectDesc;
pub use topology::GraphTopology;
