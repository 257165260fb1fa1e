//! Error types for the node-graph runtime.
//!
//! Every failure in this crate is fatal to the session that produced it, so the
//! variants are grouped by where they come from rather than by how to recover:
//! environment and support checks, GPU resource creation, compilation of the
//! graph source, and construction or use of the program object.

use thiserror::Error;

use crate::node::NodeId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// No adapter matched the surface and power preference.
    #[error("No suitable GPU adapter found: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),
    /// The adapter refused to create a logical device.
    #[error("Failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    /// The windowing event loop failed.
    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    /// The window could not be created.
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    /// The window surface could not be created.
    #[error("Failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    /// Acquiring the next swapchain image failed.
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    /// The adapter lacks a capability the node graph runtime depends on.
    #[error("Adapter does not support {missing}.")]
    Unsupported { missing: String },
    /// A device object creation call reported a validation error.
    #[error("Failed to create {what}: {message}")]
    ResourceCreation { what: String, message: String },
    /// Waiting on the device failed.
    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    /// The compiler reported a diagnostic for the graph or fragment source.
    #[error("Failed to compile `{entry}`: {message}")]
    Compile { entry: String, message: String },
    /// The requested entry point does not exist for the requested profile.
    #[error("Entry point `{entry}` not found for profile {profile}.")]
    MissingEntryPoint { entry: String, profile: String },
    /// A `//#` node directive could not be parsed.
    #[error("Directive error on line {line}: {message}")]
    Directive { line: usize, message: String },
    /// A global named by a node directive has an unusable declaration.
    #[error("Global `{global}` cannot be used by the node runtime: {message}")]
    Reflection { global: String, message: String },
    /// Program object creation was rejected.
    #[error("Program object creation failed: {0}")]
    Graph(#[from] GraphError),
    /// The program object does not expose the requested property view.
    #[error("Program object does not support {0} properties.")]
    UnsupportedProperties(&'static str),
    /// No program with this name exists in the program object.
    #[error("Program `{0}` not found.")]
    UnknownProgram(String),
    /// The bound backing memory is smaller than the program requires.
    #[error("Backing memory too small: {required} bytes required, {provided} provided.")]
    BackingMemory { required: u64, provided: u64 },
    /// A program identifier was bound to a command list recording another program object.
    #[error("Program identifier does not belong to this program object.")]
    ProgramMismatch,
    /// The backing memory range does not start on a region boundary.
    #[error("Backing memory offset {0} is not aligned to 256 bytes.")]
    MisalignedBackingMemory(u64),
    /// A graph was dispatched before a root signature was set.
    #[error("No graphics root signature set on the command list.")]
    RootSignatureNotSet,
    /// The bound root signature differs from the one the program was created with.
    #[error("Bound root signature does not match the program's global root signature.")]
    RootSignatureMismatch,
    /// Only work graphs can be set as the active program.
    #[error("Program identifier does not name a work graph.")]
    NotAWorkGraph,
    /// `dispatch_graph` was recorded before `set_program`.
    #[error("No program set on the command list.")]
    ProgramNotSet,
    /// Mesh nodes were launched without color and depth targets bound.
    #[error("Render targets must be set before dispatching a graph with mesh nodes.")]
    RenderTargetsNotSet,
    /// The requested entrypoint index is out of range or cannot be launched from the host.
    #[error("Entrypoint {index} cannot be launched: {reason}")]
    InvalidEntrypoint { index: u32, reason: String },
    /// The host input for a dispatch is not supported.
    #[error("Unsupported dispatch input: {0}")]
    DispatchInput(String),
}

/// Reasons a program object description is rejected at creation time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An export named by a generic program or library list does not exist in any module.
    #[error("Export `{0}` not found in any library module.")]
    MissingExport(String),
    /// Two linked libraries expose the same export name.
    #[error("Export `{0}` is exposed by more than one library.")]
    DuplicateExport(String),
    /// Two nodes resolve to the same identity.
    #[error("Node {0} is defined more than once.")]
    DuplicateNode(NodeId),
    /// A node output targets a node that is not part of the graph.
    #[error("Node {node} outputs to unknown node {target}.")]
    UnknownTarget { node: NodeId, target: NodeId },
    /// Mesh nodes are graph leaves.
    #[error("Mesh node {0} declares outputs.")]
    MeshNodeOutputs(NodeId),
    /// A node explicitly named by the graph description does not exist.
    #[error("Node {0} not found in any library or generic program.")]
    UnknownNode(NodeId),
    /// Two programs share a name.
    #[error("Program `{0}` is defined more than once.")]
    DuplicateProgram(String),
    /// A generic program lacks a draw-capable or fragment export.
    #[error("Generic program `{program}` is incomplete: {reason}")]
    IncompleteProgram { program: String, reason: String },
    /// A generic program attaches a subobject that is not a fixed-function template.
    #[error("Generic program `{program}` cannot attach a {kind} subobject.")]
    InvalidAttachment { program: String, kind: &'static str },
    /// A node statically uses a resource the runtime does not bind for it.
    #[error("Node {node} uses `{global}`, which is neither a declared queue, launch constants nor a root parameter.")]
    UndeclaredGlobal { node: NodeId, global: String },
    /// The record layout written by a producer differs from what the consumer reads.
    #[error("Record stride mismatch from {producer} to {consumer}: {written} vs {read} bytes.")]
    RecordLayoutMismatch {
        producer: NodeId,
        consumer: NodeId,
        written: u32,
        read: u32,
    },
    /// The graph contains a cycle that is not a node recursing into itself.
    #[error("Graph `{0}` contains a cycle through different nodes.")]
    Cycle(String),
    /// A node recurses into itself without a declared maximum recursion depth.
    #[error("Node {0} recurses without a maximum recursion depth.")]
    UnboundedRecursion(NodeId),
    /// A mesh launch override names a program that does not exist.
    #[error("Mesh launch override targets unknown program `{0}`.")]
    UnknownOverride(String),
    /// A required subobject is missing from the description.
    #[error("State object is missing a {0} subobject.")]
    MissingSubobject(&'static str),
    /// A subobject that may appear at most once appears more than once.
    #[error("State object contains more than one {0} subobject.")]
    DuplicateSubobject(&'static str),
    /// Graphs with mesh nodes must bind the global root signature through graphics state.
    #[error("Graph `{0}` contains mesh nodes but the state object config does not use graphics state for the global root signature.")]
    GraphicsStateRequired(String),
    /// The graph has no node that can be launched from the host.
    #[error("Graph `{0}` has no entrypoint.")]
    NoEntrypoint(String),
    /// A single level of a thread node would exceed the per-dispatch workgroup limit.
    #[error("Node {node} may receive {records} records in one level, over the limit of {limit}.")]
    DispatchLimit { node: NodeId, records: u64, limit: u64 },
}
