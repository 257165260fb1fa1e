//! Linked program objects.
//!
//! [`Program::link`] turns a [`StateObjectDesc`] into an immutable program: every
//! export is resolved to a compiled module, every node gets its final identity
//! (after mesh launch overrides), queues are reflected and checked between
//! producers and consumers, and each graph is ordered topologically.
//!
//! A program never touches the GPU. The runtime wraps it in a
//! [`StateObject`](crate::runtime::StateObject) that owns the pipelines.

mod link;
mod properties;
mod sizing;

pub use properties::{StateObjectProperties, WorkGraphProperties};
pub use sizing::{
    BackingLayout, MAX_RECORDS_PER_LEVEL, MemoryRequirements, QueueRegion, REGION_ALIGNMENT,
};

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::compiler::CompiledModule;
use crate::compiler::reflect::{QueueLayout, UniformLayout};
use crate::error::Result;
use crate::node::{NodeId, NodeLaunch};
use crate::state_object::{
    DepthStencilDesc, RasterizerDesc, RootSignatureDesc, StateObjectConfig, StateObjectDesc,
    StateObjectType,
};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Kind of program an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    WorkGraph,
    Generic,
}

/// Opaque identifier of a program inside a program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramIdentifier {
    pub(crate) object: u64,
    pub(crate) kind: ProgramKind,
    pub(crate) index: u32,
}

impl ProgramIdentifier {
    pub fn kind(&self) -> ProgramKind {
        self.kind
    }
}

/// Anything that exposes program property views.
///
/// Either view may be unsupported by a particular object, in which case the
/// accessor returns `None`.
pub trait ProgramObject {
    fn state_object_properties(&self) -> Option<StateObjectProperties<'_>>;
    fn work_graph_properties(&self) -> Option<WorkGraphProperties<'_>>;
}

/// A node queue output resolved against its target.
#[derive(Debug, Clone)]
pub struct LinkedOutput {
    /// Index of the target node in its graph.
    pub target: usize,
    pub max_records: u32,
    pub queue: QueueLayout,
    /// The node outputs to itself.
    pub recursive: bool,
}

/// A node with its final identity and reflected resources.
#[derive(Debug, Clone)]
pub struct LinkedNode {
    pub id: NodeId,
    pub launch: NodeLaunch,
    pub export: String,
    /// Index into [`Program::modules`].
    pub module: usize,
    /// Declared maximum recursion depth.
    pub max_recursion: Option<u32>,
    /// The node outputs to itself.
    pub recursive: bool,
    pub input: Option<QueueLayout>,
    pub launch_info: Option<UniformLayout>,
    pub outputs: Vec<LinkedOutput>,
    /// Vertices drawn per record (mesh nodes).
    pub vertices: u32,
    /// Generic program rasterizing this node (mesh nodes).
    pub program: Option<usize>,
}

impl LinkedNode {
    pub fn max_recursion_depth(&self) -> u32 {
        self.max_recursion.unwrap_or(0)
    }

    /// Number of launched recursion levels.
    pub fn levels(&self) -> u32 {
        if self.recursive {
            self.max_recursion_depth() + 1
        } else {
            1
        }
    }

    /// Number of queue levels, including the sink behind the last launched level.
    pub fn queue_levels(&self) -> u32 {
        if self.recursive {
            self.levels() + 1
        } else {
            1
        }
    }

    /// A node the host can launch without passing record data.
    pub fn is_parameterless(&self) -> bool {
        self.input.is_none()
    }
}

/// A graph after linking.
#[derive(Debug, Clone)]
pub struct LinkedGraph {
    pub name: String,
    pub nodes: Vec<LinkedNode>,
    /// Node indices in entrypoint order.
    pub entrypoints: Vec<usize>,
    /// Node indices in execution order, ignoring self recursion.
    pub order: Vec<usize>,
}

impl LinkedGraph {
    pub fn node_index(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    pub fn has_mesh_nodes(&self) -> bool {
        self.nodes.iter().any(|n| n.launch == NodeLaunch::Mesh)
    }
}

/// A draw-capable export bound to a fragment export and its fixed-function state.
#[derive(Debug, Clone)]
pub struct LinkedGenericProgram {
    pub name: String,
    pub mesh_export: String,
    pub mesh_module: usize,
    pub fragment_export: String,
    pub fragment_module: usize,
    pub rasterizer: RasterizerDesc,
    pub depth_stencil: DepthStencilDesc,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub color_formats: Vec<wgpu::TextureFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputLimits {
    pub records: u32,
    pub node_inputs: u32,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            records: 1,
            node_inputs: 1,
        }
    }
}

/// An immutable, linked program object.
pub struct Program {
    serial: u64,
    ty: StateObjectType,
    config: StateObjectConfig,
    root_signature: RootSignatureDesc,
    modules: Vec<CompiledModule>,
    graphs: Vec<LinkedGraph>,
    programs: Vec<LinkedGenericProgram>,
    input_limits: Mutex<Vec<InputLimits>>,
}

impl Program {
    /// Links a state object description.
    ///
    /// # Errors
    ///
    /// [`Error::Graph`](crate::Error::Graph) for structural problems with the
    /// description and [`Error::Reflection`](crate::Error::Reflection) when a
    /// global named by a directive cannot serve as a queue or launch constants.
    pub fn link(desc: &StateObjectDesc) -> Result<Self> {
        let linked = link::link(desc)?;
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            serial,
            graphs = linked.graphs.len(),
            programs = linked.programs.len(),
            modules = linked.modules.len(),
            "linked program object"
        );

        Ok(Self {
            serial,
            ty: desc.state_object_type(),
            config: linked.config,
            root_signature: linked.root_signature,
            modules: linked.modules,
            input_limits: Mutex::new(vec![InputLimits::default(); linked.graphs.len()]),
            graphs: linked.graphs,
            programs: linked.programs,
        })
    }

    pub fn state_object_type(&self) -> StateObjectType {
        self.ty
    }

    pub fn config(&self) -> StateObjectConfig {
        self.config
    }

    pub fn root_signature(&self) -> &RootSignatureDesc {
        &self.root_signature
    }

    /// Compiled modules the program was linked from, kept alive with it.
    pub fn modules(&self) -> &[CompiledModule] {
        &self.modules
    }

    pub fn graphs(&self) -> &[LinkedGraph] {
        &self.graphs
    }

    pub fn graph(&self, index: u32) -> Option<&LinkedGraph> {
        self.graphs.get(index as usize)
    }

    pub fn generic_programs(&self) -> &[LinkedGenericProgram] {
        &self.programs
    }

    /// Returns whether `identifier` was issued by this program object.
    pub fn owns(&self, identifier: &ProgramIdentifier) -> bool {
        identifier.object == self.serial
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn input_limits(&self, graph: u32) -> InputLimits {
        self.input_limits
            .lock()
            .get(graph as usize)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn set_input_limits(&self, graph: u32, limits: InputLimits) {
        if let Some(slot) = self.input_limits.lock().get_mut(graph as usize) {
            *slot = limits;
        }
    }
}

impl ProgramObject for Program {
    fn state_object_properties(&self) -> Option<StateObjectProperties<'_>> {
        Some(StateObjectProperties::new(self))
    }

    fn work_graph_properties(&self) -> Option<WorkGraphProperties<'_>> {
        match self.ty {
            StateObjectType::Executable => Some(WorkGraphProperties::new(self)),
            StateObjectType::Collection => None,
        }
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("serial", &self.serial)
            .field("type", &self.ty)
            .field("graphs", &self.graphs.iter().map(|g| &g.name).collect::<Vec<_>>())
            .finish()
    }
}
