//! Graph topology builder.
//!
//! [`GraphTopology`] assembles the state object description for one node graph
//! out of compiled modules:
//!
//! - the global configuration and root signature,
//! - a single work graph that picks up every available node,
//! - the node libraries and the shared fragment module,
//! - one set of fixed-function templates shared by all mesh nodes,
//! - one generic program per mesh node export, pairing it with the fragment entry.
//!
//! A mesh node whose export carries no explicit identity can be given one with
//! [`GraphTopology::rename`]. The renamed program joins the graph under the new
//! name only; the name derived from its export is dropped.
//!
//! # Example
//!
//! ```ignore
//! let state_object = topology::hello_mesh_nodes(&library, &fragment)
//!     .build(&gpu, &RootSignatureDesc::with_constants(), gpu.surface_format(), DEPTH_FORMAT)?;
//! ```

use naga::ShaderStage;

use crate::compiler::CompiledModule;
use crate::error::{GraphError, Result};
use crate::gpu::GpuContext;
use crate::node::{NodeId, NodeLaunch};
use crate::runtime::StateObject;
use crate::state_object::{
    DepthStencilDesc, GenericProgramDesc, LibraryDesc, RasterizerDesc, RenderTargetFormats,
    RootSignatureDesc, StateObjectConfig, StateObjectDesc, StateObjectType, WorkGraphDesc,
};

/// Name of the snowflake work graph.
pub const GRAPH_NAME: &str = "Hello Mesh Nodes";

/// Fragment entry point every mesh node rasterizes through unless told otherwise.
pub const DEFAULT_FRAGMENT_ENTRY: &str = "MeshNodePixelShader";

/// Declarative description of one node graph, built up before linking.
#[derive(Debug, Clone)]
pub struct GraphTopology {
    name: String,
    libraries: Vec<CompiledModule>,
    fragment: Option<CompiledModule>,
    fragment_entry: String,
    renames: Vec<(String, NodeId)>,
}

impl GraphTopology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            libraries: Vec::new(),
            fragment: None,
            fragment_entry: DEFAULT_FRAGMENT_ENTRY.to_string(),
            renames: Vec::new(),
        }
    }

    /// Adds a node library. Every node it exports joins the graph.
    pub fn library(mut self, module: &CompiledModule) -> Self {
        self.libraries.push(module.clone());
        self
    }

    /// Sets the module holding the fragment entry point of every mesh node.
    pub fn fragment(mut self, module: &CompiledModule) -> Self {
        self.fragment = Some(module.clone());
        self
    }

    pub fn fragment_entry(mut self, entry: impl Into<String>) -> Self {
        self.fragment_entry = entry.into();
        self
    }

    /// Binds the mesh node built from `export` into the graph as `id`.
    pub fn rename(mut self, export: impl Into<String>, id: NodeId) -> Self {
        self.renames.push((export.into(), id));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds the state object description.
    ///
    /// # Errors
    ///
    /// [`GraphError::MissingExport`] if no fragment module exporting the fragment
    /// entry was supplied.
    pub fn describe(
        &self,
        root_signature: &RootSignatureDesc,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Result<StateObjectDesc> {
        let fragment = self
            .fragment
            .as_ref()
            .filter(|m| m.export(&self.fragment_entry).is_some())
            .ok_or_else(|| GraphError::MissingExport(self.fragment_entry.clone()))?;

        let mut desc = StateObjectDesc::new(StateObjectType::Executable);
        desc.add(StateObjectConfig::graphics_root_signature());
        desc.add(root_signature.clone());
        let graph = desc.add(WorkGraphDesc::new(&self.name).include_all_available_nodes());
        for library in &self.libraries {
            desc.add(LibraryDesc::new(library));
        }
        desc.add(LibraryDesc::with_exports(fragment, [self.fragment_entry.as_str()]));

        let raster = desc.add(RasterizerDesc::solid_no_cull());
        let depth = desc.add(DepthStencilDesc::default());
        let depth_format = desc.add(depth_format);
        let targets = desc.add(RenderTargetFormats::single(color_format));

        for library in &self.libraries {
            for export in library.exports() {
                let Some(node) = export.directives.as_ref().and_then(|d| d.node.as_ref()) else {
                    continue;
                };
                if export.stage != ShaderStage::Vertex || node.launch != NodeLaunch::Mesh {
                    continue;
                }

                let renamed = self
                    .renames
                    .iter()
                    .find(|(name, _)| name == &export.name)
                    .map(|(_, id)| id);
                let public = renamed
                    .or(node.id.as_ref())
                    .map_or(export.name.as_str(), |id| id.name.as_str());
                let program = format!("{public}GenericProgram");

                desc.add(
                    GenericProgramDesc::new()
                        .named(&program)
                        .export(&export.name)
                        .export(&self.fragment_entry)
                        .attach(raster)
                        .attach(depth)
                        .attach(depth_format)
                        .attach(targets),
                );
                if let (Some(id), Some(graph)) = (renamed, desc.work_graph_mut(graph)) {
                    graph.override_mesh_launch(&program, id.clone());
                }
                tracing::debug!(export = %export.name, program, "generic program declared");
            }
        }
        Ok(desc)
    }

    /// Describes, links and creates the state object on `gpu`.
    pub fn build(
        &self,
        gpu: &GpuContext,
        root_signature: &RootSignatureDesc,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Result<StateObject> {
        let desc = self.describe(root_signature, color_format, depth_format)?;
        StateObject::new(gpu, &desc)
    }
}

/// The snowflake graph: every node of `library`, shading through `fragment`,
/// with the unnamed triangle mesh node bound as `TriangleMeshNode`.
pub fn hello_mesh_nodes(library: &CompiledModule, fragment: &CompiledModule) -> GraphTopology {
    GraphTopology::new(GRAPH_NAME)
        .library(library)
        .fragment(fragment)
        .rename("TriangleMeshShader", NodeId::new("TriangleMeshNode", 0))
}

#[cfg(test)]
pub(crate) fn snowflake_program() -> crate::program::Program {
    use crate::compiler::{Profile, ProgramCompiler};

    let source = include_str!("shaders/snowflake.wgsl");
    let mut compiler = ProgramCompiler::new();
    let library = compiler.compile(source, None, Profile::Library).unwrap();
    let fragment = compiler
        .compile(source, Some(DEFAULT_FRAGMENT_ENTRY), Profile::Fragment)
        .unwrap();
    let desc = hello_mesh_nodes(&library, &fragment)
        .describe(
            &RootSignatureDesc::with_constants(),
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Depth32Float,
        )
        .unwrap();
    crate::program::Program::link(&desc).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Profile, ProgramCompiler};
    use crate::error::Error;
    use crate::program::ProgramObject;
    use crate::state_object::Subobject;

    const SOURCE: &str = include_str!("shaders/snowflake.wgsl");

    fn library() -> CompiledModule {
        ProgramCompiler::new()
            .compile(SOURCE, None, Profile::Library)
            .unwrap()
    }

    #[test]
    fn renamed_node_replaces_its_implicit_name() {
        let program = snowflake_program();
        let graph = &program.graphs()[0];
        assert!(graph.node_index(&NodeId::new("TriangleMeshNode", 0)).is_some());
        assert!(graph.node_index(&NodeId::new("TriangleMeshShader", 0)).is_none());

        let triangle = &graph.nodes[graph.node_index(&NodeId::new("TriangleMeshNode", 0)).unwrap()];
        assert_eq!(triangle.export, "TriangleMeshShader");
    }

    #[test]
    fn one_generic_program_per_mesh_export() {
        let library = library();
        let fragment = ProgramCompiler::new()
            .compile(SOURCE, Some(DEFAULT_FRAGMENT_ENTRY), Profile::Fragment)
            .unwrap();
        let desc = hello_mesh_nodes(&library, &fragment)
            .describe(
                &RootSignatureDesc::with_constants(),
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureFormat::Depth32Float,
            )
            .unwrap();

        let names: Vec<_> = desc
            .generic_programs()
            .filter_map(|p| p.name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["LineMeshNodeGenericProgram", "TriangleMeshNodeGenericProgram"]
        );
        let overrides = &desc.work_graphs().next().unwrap().mesh_launch_overrides;
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].program, "TriangleMeshNodeGenericProgram");

        let templates = desc.subobjects().iter().filter(|s| s.is_template()).count();
        assert_eq!(templates, 4);
        assert!(matches!(
            desc.subobjects().first(),
            Some(Subobject::Config(config))
                if config.work_graphs_use_graphics_state_for_global_root_signature
        ));
    }

    #[test]
    fn fragment_module_is_required() {
        let library = library();
        let result = GraphTopology::new(GRAPH_NAME).library(&library).describe(
            &RootSignatureDesc::with_constants(),
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Depth32Float,
        );
        assert!(matches!(
            result,
            Err(Error::Graph(GraphError::MissingExport(entry))) if entry == DEFAULT_FRAGMENT_ENTRY
        ));
    }

    #[test]
    fn snowflake_links_with_a_single_entrypoint() {
        let program = snowflake_program();
        let properties = program.work_graph_properties().unwrap();
        let graph = properties.work_graph_index(GRAPH_NAME).unwrap();
        assert_eq!(properties.num_nodes(graph), 4);
        assert_eq!(properties.num_entrypoints(graph), 1);
        assert_eq!(
            properties.entrypoint_index(graph, &NodeId::new("EntryNode", 0)),
            Some(0)
        );
    }
}
