//! Declarative state object descriptions.
//!
//! A [`StateObjectDesc`] is an ordered list of [`Subobject`]s. Nothing is
//! validated while the list is assembled; linking the description into a
//! [`Program`](crate::program::Program) resolves exports, node identities and
//! template attachments in one pass and reports the first problem it finds.
//!
//! # Example
//!
//! ```ignore
//! let mut desc = StateObjectDesc::new(StateObjectType::Executable);
//! desc.add(StateObjectConfig::graphics_root_signature());
//! desc.add(RootSignatureDesc::with_constants());
//! let graph = desc.add(WorkGraphDesc::new("Hello Mesh Nodes").include_all_available_nodes());
//! desc.add(LibraryDesc::new(&library));
//! desc.add(LibraryDesc::new(&fragment));
//!
//! let raster = desc.add(RasterizerDesc::solid_no_cull());
//! desc.add(
//!     GenericProgramDesc::new()
//!         .export("LineMeshShader")
//!         .export("MeshNodePixelShader")
//!         .attach(raster),
//! );
//! ```

mod templates;

pub use templates::{CullMode, DepthStencilDesc, FillMode, RasterizerDesc, RenderTargetFormats};

use crate::compiler::CompiledModule;
use crate::node::NodeId;

/// Whether a state object can be executed or only linked into others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateObjectType {
    #[default]
    Executable,
    Collection,
}

/// Global state object configuration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateObjectConfig {
    /// The global root signature is bound with the graphics root signature call.
    /// Graphs containing mesh nodes require this.
    pub work_graphs_use_graphics_state_for_global_root_signature: bool,
}

impl StateObjectConfig {
    /// Configuration for graphs that contain draw-capable nodes.
    pub fn graphics_root_signature() -> Self {
        Self {
            work_graphs_use_graphics_state_for_global_root_signature: true,
        }
    }
}

/// Kind of a root signature parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootParameter {
    /// A uniform buffer of `size` bytes at `binding` in the root group.
    ConstantBuffer { binding: u32, size: u64 },
}

/// Layout of the bind group shared by every node of a program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
}

impl RootSignatureDesc {
    /// A root signature with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A root signature exposing [`RootConstants`](crate::runtime::RootConstants) at binding 0.
    pub fn with_constants() -> Self {
        Self {
            parameters: vec![RootParameter::ConstantBuffer {
                binding: 0,
                size: std::mem::size_of::<crate::runtime::RootConstants>() as u64,
            }],
        }
    }

    /// Returns whether `binding` is declared by this root signature.
    pub fn declares(&self, binding: u32) -> bool {
        self.parameters
            .iter()
            .any(|RootParameter::ConstantBuffer { binding: b, .. }| *b == binding)
    }
}

/// Renames the node created by a generic program.
///
/// The program's implicit node (named after its draw-capable entry point) is
/// removed from the graph and replaced by `new_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshLaunchOverride {
    pub program: String,
    pub new_name: NodeId,
}

/// Declares one node graph inside the state object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkGraphDesc {
    pub name: String,
    /// Every node found in the linked libraries and generic programs joins the graph.
    pub include_all_available_nodes: bool,
    /// Nodes added explicitly, used when `include_all_available_nodes` is off.
    pub nodes: Vec<NodeId>,
    /// Nodes that are entrypoints even though other nodes target them.
    pub entrypoints: Vec<NodeId>,
    pub mesh_launch_overrides: Vec<MeshLaunchOverride>,
}

impl WorkGraphDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include_all_available_nodes: false,
            nodes: Vec::new(),
            entrypoints: Vec::new(),
            mesh_launch_overrides: Vec::new(),
        }
    }

    pub fn include_all_available_nodes(mut self) -> Self {
        self.include_all_available_nodes = true;
        self
    }

    pub fn node(mut self, id: NodeId) -> Self {
        self.nodes.push(id);
        self
    }

    pub fn entrypoint(mut self, id: NodeId) -> Self {
        self.entrypoints.push(id);
        self
    }

    /// Gives the node built from generic program `program` the public name `new_name`.
    pub fn override_mesh_launch(&mut self, program: impl Into<String>, new_name: NodeId) {
        self.mesh_launch_overrides.push(MeshLaunchOverride {
            program: program.into(),
            new_name,
        });
    }
}

/// A compiled module linked into the state object.
#[derive(Debug, Clone)]
pub struct LibraryDesc {
    pub module: CompiledModule,
    /// Exports made visible; `None` exposes every export of the module.
    pub exports: Option<Vec<String>>,
}

impl LibraryDesc {
    pub fn new(module: &CompiledModule) -> Self {
        Self {
            module: module.clone(),
            exports: None,
        }
    }

    pub fn with_exports<I, S>(module: &CompiledModule, exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            module: module.clone(),
            exports: Some(exports.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns whether this library exposes `name`.
    pub fn exposes(&self, name: &str) -> bool {
        self.module.export(name).is_some()
            && self
                .exports
                .as_ref()
                .is_none_or(|list| list.iter().any(|e| e == name))
    }
}

/// Binds a draw-capable entry point and a fragment entry point into one program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenericProgramDesc {
    /// Program name; defaults to the draw-capable export's name.
    pub name: Option<String>,
    pub exports: Vec<String>,
    /// Attached templates.
    pub subobjects: Vec<SubobjectId>,
}

impl GenericProgramDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn export(mut self, name: impl Into<String>) -> Self {
        self.exports.push(name.into());
        self
    }

    pub fn attach(mut self, subobject: SubobjectId) -> Self {
        self.subobjects.push(subobject);
        self
    }
}

/// Handle to a subobject inside its [`StateObjectDesc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubobjectId(usize);

/// One entry of a state object description.
#[derive(Debug, Clone)]
pub enum Subobject {
    Config(StateObjectConfig),
    GlobalRootSignature(RootSignatureDesc),
    WorkGraph(WorkGraphDesc),
    Library(LibraryDesc),
    Rasterizer(RasterizerDesc),
    DepthStencil(DepthStencilDesc),
    DepthStencilFormat(wgpu::TextureFormat),
    RenderTargetFormats(RenderTargetFormats),
    GenericProgram(GenericProgramDesc),
}

impl Subobject {
    /// Human readable kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Subobject::Config(_) => "state object config",
            Subobject::GlobalRootSignature(_) => "global root signature",
            Subobject::WorkGraph(_) => "work graph",
            Subobject::Library(_) => "library",
            Subobject::Rasterizer(_) => "rasterizer",
            Subobject::DepthStencil(_) => "depth stencil",
            Subobject::DepthStencilFormat(_) => "depth stencil format",
            Subobject::RenderTargetFormats(_) => "render target formats",
            Subobject::GenericProgram(_) => "generic program",
        }
    }

    /// Returns whether this subobject can be attached to a generic program.
    pub fn is_template(&self) -> bool {
        matches!(
            self,
            Subobject::Rasterizer(_)
                | Subobject::DepthStencil(_)
                | Subobject::DepthStencilFormat(_)
                | Subobject::RenderTargetFormats(_)
        )
    }
}

macro_rules! impl_into_subobject {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Subobject {
                fn from(value: $ty) -> Self {
                    Subobject::$variant(value)
                }
            }
        )*
    };
}

impl_into_subobject! {
    StateObjectConfig => Config,
    RootSignatureDesc => GlobalRootSignature,
    WorkGraphDesc => WorkGraph,
    LibraryDesc => Library,
    RasterizerDesc => Rasterizer,
    DepthStencilDesc => DepthStencil,
    wgpu::TextureFormat => DepthStencilFormat,
    RenderTargetFormats => RenderTargetFormats,
    GenericProgramDesc => GenericProgram,
}

/// An ordered list of subobjects describing a state object.
#[derive(Debug, Clone, Default)]
pub struct StateObjectDesc {
    ty: StateObjectType,
    subobjects: Vec<Subobject>,
}

impl StateObjectDesc {
    pub fn new(ty: StateObjectType) -> Self {
        Self {
            ty,
            subobjects: Vec::new(),
        }
    }

    pub fn state_object_type(&self) -> StateObjectType {
        self.ty
    }

    /// Appends a subobject and returns its handle.
    pub fn add(&mut self, subobject: impl Into<Subobject>) -> SubobjectId {
        self.subobjects.push(subobject.into());
        SubobjectId(self.subobjects.len() - 1)
    }

    pub fn get(&self, id: SubobjectId) -> Option<&Subobject> {
        self.subobjects.get(id.0)
    }

    /// Mutable access to a work graph subobject, for adding overrides after declaration.
    pub fn work_graph_mut(&mut self, id: SubobjectId) -> Option<&mut WorkGraphDesc> {
        match self.subobjects.get_mut(id.0) {
            Some(Subobject::WorkGraph(graph)) => Some(graph),
            _ => None,
        }
    }

    pub fn subobjects(&self) -> &[Subobject] {
        &self.subobjects
    }

    pub fn libraries(&self) -> impl Iterator<Item = &LibraryDesc> {
        self.subobjects.iter().filter_map(|s| match s {
            Subobject::Library(lib) => Some(lib),
            _ => None,
        })
    }

    pub fn work_graphs(&self) -> impl Iterator<Item = &WorkGraphDesc> {
        self.subobjects.iter().filter_map(|s| match s {
            Subobject::WorkGraph(graph) => Some(graph),
            _ => None,
        })
    }

    pub fn generic_programs(&self) -> impl Iterator<Item = &GenericProgramDesc> {
        self.subobjects.iter().filter_map(|s| match s {
            Subobject::GenericProgram(program) => Some(program),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subobject_ids_are_stable() {
        let mut desc = StateObjectDesc::new(StateObjectType::Executable);
        let config = desc.add(StateObjectConfig::graphics_root_signature());
        let raster = desc.add(RasterizerDesc::solid_no_cull());
        let graph = desc.add(WorkGraphDesc::new("graph"));

        assert!(matches!(desc.get(config), Some(Subobject::Config(_))));
        assert!(desc.get(raster).is_some_and(Subobject::is_template));
        assert!(desc.work_graph_mut(raster).is_none());

        desc.work_graph_mut(graph)
            .unwrap()
            .override_mesh_launch("program", NodeId::new("Renamed", 0));
        let overrides = &desc.work_graphs().next().unwrap().mesh_launch_overrides;
        assert_eq!(overrides[0].new_name, NodeId::new("Renamed", 0));
    }

    #[test]
    fn root_constants_live_at_binding_zero() {
        let root = RootSignatureDesc::with_constants();
        assert!(root.declares(0));
        assert!(!root.declares(1));
        assert!(!RootSignatureDesc::empty().declares(0));
    }
}
