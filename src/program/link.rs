use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::{LinkedGenericProgram, LinkedGraph, LinkedNode, LinkedOutput};
use crate::compiler::reflect::{self, NODE_GROUP, QueueLayout, ROOT_GROUP};
use crate::compiler::{CompiledModule, Export, NodeDirective, RecursionBound};
use crate::error::{Error, GraphError, Result};
use crate::node::{NodeId, NodeLaunch};
use crate::runtime::NodeLaunchConstants;
use crate::state_object::{
    DepthStencilDesc, GenericProgramDesc, RootSignatureDesc, StateObjectConfig,
    StateObjectDesc, Subobject, WorkGraphDesc,
};

pub(super) struct Linked {
    pub config: StateObjectConfig,
    pub root_signature: RootSignatureDesc,
    pub modules: Vec<CompiledModule>,
    pub graphs: Vec<LinkedGraph>,
    pub programs: Vec<LinkedGenericProgram>,
}

/// An export visible to the state object, with the module it lives in.
struct Exposed<'d> {
    module: usize,
    export: &'d Export,
}

impl Exposed<'_> {
    fn node(&self) -> Option<&NodeDirective> {
        self.export.directives.as_ref()?.node.as_ref()
    }
}

struct Candidate<'d> {
    id: NodeId,
    exposed: &'d Exposed<'d>,
    program: Option<usize>,
}

pub(super) fn link(desc: &StateObjectDesc) -> Result<Linked> {
    let config = at_most_one(desc, |s| match s {
        Subobject::Config(config) => Some(*config),
        _ => None,
    })?
    .unwrap_or_default();
    let root_signature = at_most_one(desc, |s| match s {
        Subobject::GlobalRootSignature(root) => Some(root.clone()),
        _ => None,
    })?
    .unwrap_or_default();

    let mut modules: Vec<CompiledModule> = Vec::new();
    let mut exposed: Vec<(String, Exposed<'_>)> = Vec::new();
    for library in desc.libraries() {
        if let Some(list) = &library.exports
            && let Some(missing) = list.iter().find(|name| library.module.export(name).is_none())
        {
            return Err(GraphError::MissingExport(missing.clone()).into());
        }

        let module = match modules.iter().position(|m| m.ptr_eq(&library.module)) {
            Some(index) => index,
            None => {
                modules.push(library.module.clone());
                modules.len() - 1
            }
        };

        for export in library.module.exports() {
            if !library.exposes(&export.name) {
                continue;
            }
            if exposed.iter().any(|(name, e)| name == &export.name && e.module != module) {
                return Err(GraphError::DuplicateExport(export.name.clone()).into());
            }
            if exposed.iter().all(|(name, _)| name != &export.name) {
                exposed.push((export.name.clone(), Exposed { module, export }));
            }
        }
    }

    if desc.work_graphs().next().is_some() && modules.is_empty() {
        return Err(GraphError::MissingSubobject("library").into());
    }

    let mut programs = Vec::new();
    let mut program_nodes = Vec::new();
    for program in desc.generic_programs() {
        let (linked, mesh) = link_generic_program(desc, program, &exposed)?;
        if programs
            .iter()
            .any(|p: &LinkedGenericProgram| p.name == linked.name)
        {
            return Err(GraphError::DuplicateProgram(linked.name).into());
        }
        let id = mesh
            .node()
            .and_then(|n| n.id.clone())
            .unwrap_or_else(|| NodeId::new(&linked.mesh_export, 0));
        program_nodes.push((id, mesh));
        programs.push(linked);
    }

    for (name, e) in &exposed {
        let is_mesh = e.node().is_some_and(|n| n.launch == NodeLaunch::Mesh);
        if is_mesh && programs.iter().all(|p| &p.mesh_export != name) {
            tracing::debug!(export = %name, "mesh node export has no generic program, skipped");
        }
    }

    let mut graphs = Vec::new();
    for graph in desc.work_graphs() {
        let mut candidates: Vec<Candidate<'_>> = exposed
            .iter()
            .filter_map(|(name, e)| {
                let node = e.node()?;
                (node.launch == NodeLaunch::Thread).then(|| Candidate {
                    id: node.id.clone().unwrap_or_else(|| NodeId::new(name, 0)),
                    exposed: e,
                    program: None,
                })
            })
            .collect();

        let mut renamed = HashMap::new();
        for o in &graph.mesh_launch_overrides {
            if programs.iter().all(|p| p.name != o.program) {
                return Err(GraphError::UnknownOverride(o.program.clone()).into());
            }
            renamed.insert(o.program.as_str(), o.new_name.clone());
        }
        for (index, (id, mesh)) in program_nodes.iter().enumerate() {
            let id = renamed
                .get(programs[index].name.as_str())
                .cloned()
                .unwrap_or_else(|| id.clone());
            candidates.push(Candidate {
                id,
                exposed: mesh,
                program: Some(index),
            });
        }

        let linked = link_graph(graph, candidates, &modules, &programs, &config, &root_signature)?;
        tracing::debug!(
            graph = %linked.name,
            nodes = linked.nodes.len(),
            entrypoints = linked.entrypoints.len(),
            "linked graph"
        );
        graphs.push(linked);
    }

    Ok(Linked {
        config,
        root_signature,
        modules,
        graphs,
        programs,
    })
}

fn at_most_one<T>(
    desc: &StateObjectDesc,
    pick: impl Fn(&Subobject) -> Option<T>,
) -> Result<Option<T>> {
    let mut found = None;
    for subobject in desc.subobjects() {
        if let Some(value) = pick(subobject) {
            if found.is_some() {
                return Err(GraphError::DuplicateSubobject(subobject.kind()).into());
            }
            found = Some(value);
        }
    }
    Ok(found)
}

fn find_export<'d>(
    exposed: &'d [(String, Exposed<'d>)],
    name: &str,
) -> std::result::Result<&'d Exposed<'d>, GraphError> {
    exposed
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, e)| e)
        .ok_or_else(|| GraphError::MissingExport(name.to_string()))
}

fn link_generic_program<'d>(
    desc: &'d StateObjectDesc,
    program: &GenericProgramDesc,
    exposed: &'d [(String, Exposed<'d>)],
) -> Result<(LinkedGenericProgram, &'d Exposed<'d>)> {
    let label = program
        .name
        .clone()
        .or_else(|| program.exports.first().cloned())
        .unwrap_or_default();
    let incomplete = |reason: &str| GraphError::IncompleteProgram {
        program: label.clone(),
        reason: reason.to_string(),
    };

    let mut mesh = None;
    let mut fragment = None;
    for name in &program.exports {
        let e = find_export(exposed, name)?;
        let slot = match e.export.stage {
            naga::ShaderStage::Fragment => &mut fragment,
            naga::ShaderStage::Vertex
                if e.node().is_some_and(|n| n.launch == NodeLaunch::Mesh) =>
            {
                &mut mesh
            }
            _ => return Err(incomplete(&format!("`{name}` is neither a mesh node nor a fragment export")).into()),
        };
        if slot.replace((name, e)).is_some() {
            return Err(incomplete("more than one export for the same stage").into());
        }
    }
    let (mesh_name, mesh) = mesh.ok_or_else(|| incomplete("no mesh node export"))?;
    let (fragment_name, fragment) = fragment.ok_or_else(|| incomplete("no fragment export"))?;

    let mut rasterizer = None;
    let mut depth_stencil = None;
    let mut depth_format = None;
    let mut color_formats = None;
    let mut seen = HashSet::new();
    for &id in &program.subobjects {
        let subobject = desc.get(id).ok_or_else(|| GraphError::InvalidAttachment {
            program: label.clone(),
            kind: "missing",
        })?;
        if !subobject.is_template() {
            return Err(GraphError::InvalidAttachment {
                program: label.clone(),
                kind: subobject.kind(),
            }
            .into());
        }
        if !seen.insert(subobject.kind()) {
            return Err(GraphError::DuplicateSubobject(subobject.kind()).into());
        }
        match subobject {
            Subobject::Rasterizer(r) => rasterizer = Some(*r),
            Subobject::DepthStencil(d) => depth_stencil = Some(*d),
            Subobject::DepthStencilFormat(f) => depth_format = Some(*f),
            Subobject::RenderTargetFormats(f) => color_formats = Some(f.formats.clone()),
            _ => {}
        }
    }

    let color_formats = color_formats
        .filter(|formats| !formats.is_empty())
        .ok_or_else(|| incomplete("no render target formats attached"))?;
    if depth_stencil.is_some_and(|d: DepthStencilDesc| d.depth_enable) && depth_format.is_none() {
        return Err(incomplete("depth testing needs a depth stencil format").into());
    }

    Ok((
        LinkedGenericProgram {
            name: program.name.clone().unwrap_or_else(|| mesh_name.clone()),
            mesh_export: mesh_name.clone(),
            mesh_module: mesh.module,
            fragment_export: fragment_name.clone(),
            fragment_module: fragment.module,
            rasterizer: rasterizer.unwrap_or_default(),
            depth_stencil: depth_stencil.unwrap_or_default(),
            depth_format,
            color_formats,
        },
        mesh,
    ))
}

fn link_graph(
    graph: &WorkGraphDesc,
    candidates: Vec<Candidate<'_>>,
    modules: &[CompiledModule],
    programs: &[LinkedGenericProgram],
    config: &StateObjectConfig,
    root: &RootSignatureDesc,
) -> Result<LinkedGraph> {
    let selected: Vec<Candidate<'_>> = if graph.include_all_available_nodes {
        candidates
    } else {
        let mut candidates: Vec<Option<Candidate<'_>>> = candidates.into_iter().map(Some).collect();
        let mut selected = Vec::with_capacity(graph.nodes.len());
        for id in &graph.nodes {
            let slot = candidates
                .iter_mut()
                .find(|c| c.as_ref().is_some_and(|c| &c.id == id))
                .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
            match slot.take() {
                Some(candidate) => selected.push(candidate),
                None => return Err(GraphError::DuplicateNode(id.clone()).into()),
            }
        }
        selected
    };

    let mut ids = HashSet::new();
    for candidate in &selected {
        if !ids.insert(&candidate.id) {
            return Err(GraphError::DuplicateNode(candidate.id.clone()).into());
        }
    }
    for id in &graph.entrypoints {
        if !ids.contains(id) {
            return Err(GraphError::UnknownNode(id.clone()).into());
        }
    }

    let mut nodes = Vec::with_capacity(selected.len());
    let mut declared_outputs = Vec::with_capacity(selected.len());
    for candidate in &selected {
        let (node, outputs) = link_node(candidate, modules, programs, root)?;
        nodes.push(node);
        declared_outputs.push(outputs);
    }

    for (index, outputs) in declared_outputs.into_iter().enumerate() {
        for (target, max_records, queue) in outputs {
            let target_id = NodeId::new(&target, 0);
            let producer = &nodes[index];
            let target = nodes
                .iter()
                .position(|n| n.id == target_id)
                .ok_or_else(|| GraphError::UnknownTarget {
                    node: producer.id.clone(),
                    target: target_id.clone(),
                })?;
            check_record_layout(producer, &queue, &nodes[target])?;

            let recursive = target == index;
            if recursive && nodes[index].max_recursion.is_none() {
                return Err(GraphError::UnboundedRecursion(nodes[index].id.clone()).into());
            }
            nodes[index].recursive |= recursive;
            nodes[index].outputs.push(LinkedOutput {
                target,
                max_records,
                queue,
                recursive,
            });
        }
    }

    let entrypoints: Vec<usize> = (0..nodes.len())
        .filter(|&i| {
            let flagged = selected[i].exposed.node().is_some_and(|n| n.entry);
            let listed = graph.entrypoints.contains(&nodes[i].id);
            let fed = nodes
                .iter()
                .enumerate()
                .any(|(p, n)| p != i && n.outputs.iter().any(|o| o.target == i));
            flagged || listed || !fed
        })
        .collect();
    if entrypoints.is_empty() {
        return Err(GraphError::NoEntrypoint(graph.name.clone()).into());
    }

    let mut dag = DiGraph::<usize, ()>::new();
    let handles: Vec<_> = (0..nodes.len()).map(|i| dag.add_node(i)).collect();
    for (i, node) in nodes.iter().enumerate() {
        for output in node.outputs.iter().filter(|o| !o.recursive) {
            dag.add_edge(handles[i], handles[output.target], ());
        }
    }
    let order = toposort(&dag, None)
        .map_err(|_| GraphError::Cycle(graph.name.clone()))?
        .into_iter()
        .map(|handle| dag[handle])
        .collect();

    let linked = LinkedGraph {
        name: graph.name.clone(),
        nodes,
        entrypoints,
        order,
    };
    if linked.has_mesh_nodes() && !config.work_graphs_use_graphics_state_for_global_root_signature {
        return Err(GraphError::GraphicsStateRequired(graph.name.clone()).into());
    }
    Ok(linked)
}

type DeclaredOutput = (String, u32, QueueLayout);

fn link_node(
    candidate: &Candidate<'_>,
    modules: &[CompiledModule],
    programs: &[LinkedGenericProgram],
    root: &RootSignatureDesc,
) -> Result<(LinkedNode, Vec<DeclaredOutput>)> {
    let export = candidate.exposed.export;
    let module = &modules[candidate.exposed.module];
    let naga = module.naga();
    let Some(directive) = candidate.exposed.node() else {
        return Err(GraphError::UnknownNode(candidate.id.clone()).into());
    };
    let launch = directive.launch;

    let max_recursion = match &directive.max_recursion {
        None => None,
        Some(RecursionBound::Literal(depth)) => Some(*depth),
        Some(RecursionBound::Constant(name)) => Some(
            reflect::constant_u32(naga, name).ok_or_else(|| Error::Reflection {
                global: name.clone(),
                message: "max_recursion must name an integer constant".to_string(),
            })?,
        ),
    };

    let input = directive
        .input
        .as_deref()
        .map(|global| reflect::queue_layout(naga, global))
        .transpose()?;
    if let Some(queue) = &input {
        match launch {
            NodeLaunch::Thread if !queue.writable => {
                return Err(access_error(queue, "thread node queues must be read_write"));
            }
            NodeLaunch::Mesh if queue.writable => {
                return Err(access_error(queue, "mesh node inputs must be read-only"));
            }
            _ => {}
        }
    }

    let launch_info = directive
        .launch_info
        .as_deref()
        .map(|global| {
            reflect::uniform_layout(naga, global, size_of::<NodeLaunchConstants>() as u32)
        })
        .transpose()?;

    let declared = export
        .directives
        .as_ref()
        .map(|d| d.outputs.as_slice())
        .unwrap_or_default();
    if launch == NodeLaunch::Mesh && !declared.is_empty() {
        return Err(GraphError::MeshNodeOutputs(candidate.id.clone()).into());
    }
    let mut outputs = Vec::with_capacity(declared.len());
    let mut queues: HashSet<&str> = input.iter().map(|q| q.global.as_str()).collect();
    for output in declared {
        if !queues.insert(output.queue.as_str()) {
            return Err(Error::Reflection {
                global: output.queue.clone(),
                message: "a global can back only one queue of a node".to_string(),
            });
        }
        let queue = reflect::queue_layout(naga, &output.queue)?;
        if !queue.writable {
            return Err(access_error(&queue, "output queues must be read_write"));
        }
        outputs.push((output.target.clone(), output.max_records, queue));
    }

    let mut bound: HashSet<&str> = outputs.iter().map(|(_, _, q)| q.global.as_str()).collect();
    bound.extend(input.iter().map(|q| q.global.as_str()));
    bound.extend(launch_info.iter().map(|u| u.global.as_str()));
    for used in reflect::used_globals(naga, module.info(), export.entry_index) {
        let declared = match used.group {
            ROOT_GROUP => root.declares(used.binding),
            NODE_GROUP => bound.contains(used.name.as_str()),
            _ => false,
        };
        if !declared {
            return Err(GraphError::UndeclaredGlobal {
                node: candidate.id.clone(),
                global: used.name,
            }
            .into());
        }
    }

    if let Some(program) = candidate.program.map(|p| &programs[p]) {
        let fragment_module = &modules[program.fragment_module];
        let entry = fragment_module
            .export(&program.fragment_export)
            .map(|e| e.entry_index)
            .ok_or_else(|| GraphError::MissingExport(program.fragment_export.clone()))?;
        for used in reflect::used_globals(fragment_module.naga(), fragment_module.info(), entry) {
            if used.group != ROOT_GROUP || !root.declares(used.binding) {
                return Err(GraphError::UndeclaredGlobal {
                    node: candidate.id.clone(),
                    global: used.name,
                }
                .into());
            }
        }
    }

    let node = LinkedNode {
        id: candidate.id.clone(),
        launch,
        export: export.name.clone(),
        module: candidate.exposed.module,
        max_recursion,
        recursive: false,
        input,
        launch_info,
        outputs: Vec::new(),
        vertices: directive.vertices.unwrap_or(0),
        program: candidate.program,
    };
    Ok((node, outputs))
}

fn access_error(queue: &QueueLayout, message: &str) -> Error {
    Error::Reflection {
        global: queue.global.clone(),
        message: message.to_string(),
    }
}

fn check_record_layout(producer: &LinkedNode, written: &QueueLayout, consumer: &LinkedNode) -> Result<()> {
    let mismatch = |read: u32| GraphError::RecordLayoutMismatch {
        producer: producer.id.clone(),
        consumer: consumer.id.clone(),
        written: written.record_stride,
        read,
    };
    let Some(read) = &consumer.input else {
        return Err(mismatch(0).into());
    };
    if read.record_stride != written.record_stride
        || read.records_offset != written.records_offset
        || read.count_offset != written.count_offset
    {
        return Err(mismatch(read.record_stride).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Profile, ProgramCompiler};
    use crate::program::Program;
    use crate::state_object::{
        LibraryDesc, RasterizerDesc, RenderTargetFormats, StateObjectType,
    };

    const SNOWFLAKE: &str = include_str!("../shaders/snowflake.wgsl");
    const COLOR: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
    const DEPTH: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    struct Options {
        config: bool,
        rename: bool,
        library: bool,
        fragment: bool,
        root: RootSignatureDesc,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                config: true,
                rename: true,
                library: true,
                fragment: true,
                root: RootSignatureDesc::with_constants(),
            }
        }
    }

    fn snowflake_desc(options: Options) -> StateObjectDesc {
        let mut compiler = ProgramCompiler::new();
        let library = compiler.compile(SNOWFLAKE, None, Profile::Library).unwrap();
        let fragment = compiler
            .compile(SNOWFLAKE, Some("MeshNodePixelShader"), Profile::Fragment)
            .unwrap();

        let mut desc = StateObjectDesc::new(StateObjectType::Executable);
        if options.config {
            desc.add(StateObjectConfig::graphics_root_signature());
        }
        desc.add(options.root);
        let graph = desc.add(WorkGraphDesc::new("Hello Mesh Nodes").include_all_available_nodes());
        if options.library {
            desc.add(LibraryDesc::new(&library));
        }
        if options.fragment {
            desc.add(LibraryDesc::new(&fragment));
        }

        let raster = desc.add(RasterizerDesc::solid_no_cull());
        let depth = desc.add(DepthStencilDesc::default());
        let depth_format = desc.add(DEPTH);
        let targets = desc.add(RenderTargetFormats::single(COLOR));
        for mesh in ["LineMeshShader", "TriangleMeshShader"] {
            desc.add(
                GenericProgramDesc::new()
                    .named(format!("{mesh}Program"))
                    .export(mesh)
                    .export("MeshNodePixelShader")
                    .attach(raster)
                    .attach(depth)
                    .attach(depth_format)
                    .attach(targets),
            );
        }
        if options.rename {
            desc.work_graph_mut(graph).unwrap().override_mesh_launch(
                "TriangleMeshShaderProgram",
                NodeId::new("TriangleMeshNode", 0),
            );
        }
        desc
    }

    fn library_desc(source: &str) -> StateObjectDesc {
        let module = ProgramCompiler::new()
            .compile(source, None, Profile::Library)
            .unwrap();
        let mut desc = StateObjectDesc::new(StateObjectType::Executable);
        desc.add(RootSignatureDesc::empty());
        desc.add(WorkGraphDesc::new("graph").include_all_available_nodes());
        desc.add(LibraryDesc::new(&module));
        desc
    }

    const QUEUES: &str = r#"
struct Rec { v: u32 }
struct WideRec { v: vec4u }
struct Q { count: atomic<u32>, @align(16) records: array<Rec> }
struct W { count: atomic<u32>, @align(16) records: array<WideRec> }
@group(1) @binding(0) var<storage, read_write> a_in: Q;
@group(1) @binding(1) var<storage, read_write> a_out: Q;
@group(1) @binding(2) var<storage, read_write> b_in: Q;
@group(1) @binding(3) var<storage, read_write> b_out: Q;
@group(1) @binding(4) var<storage, read_write> wide_in: W;
"#;

    #[test]
    fn snowflake_graph_links() {
        let program = Program::link(&snowflake_desc(Options::default())).unwrap();
        let graph = &program.graphs()[0];

        let ids: Vec<String> = graph.nodes.iter().map(|n| n.id.to_string()).collect();
        assert_eq!(
            ids,
            vec!["EntryNode[0]", "SnowflakeNode[0]", "LineMeshNode[0]", "TriangleMeshNode[0]"]
        );
        assert_eq!(graph.entrypoints, vec![0]);

        let snowflake = &graph.nodes[1];
        assert!(snowflake.recursive);
        assert_eq!(snowflake.max_recursion, Some(3));
        assert_eq!(snowflake.levels(), 4);
        assert_eq!(snowflake.queue_levels(), 5);
        assert!(snowflake.launch_info.is_some());
        assert_eq!(snowflake.outputs.len(), 3);

        let triangle = &graph.nodes[3];
        assert_eq!(triangle.launch, NodeLaunch::Mesh);
        assert_eq!(triangle.vertices, 3);
        assert_eq!(triangle.input.as_ref().unwrap().record_stride, 32);
        let program_index = triangle.program.unwrap();
        assert_eq!(
            program.generic_programs()[program_index].mesh_export,
            "TriangleMeshShader"
        );

        let position = |i: usize| graph.order.iter().position(|&n| n == i).unwrap();
        assert!(position(0) < position(1));
        assert!(position(1) < position(2));
        assert!(position(1) < position(3));
    }

    #[test]
    fn implicit_mesh_name_is_not_a_target() {
        let err = Program::link(&snowflake_desc(Options {
            rename: false,
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::UnknownTarget { node, target })
                if node == NodeId::new("EntryNode", 0)
                    && target == NodeId::new("TriangleMeshNode", 0)
        ));
    }

    #[test]
    fn fragment_library_is_required() {
        let err = Program::link(&snowflake_desc(Options {
            fragment: false,
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::MissingExport(name)) if name == "MeshNodePixelShader"
        ));
    }

    #[test]
    fn work_graphs_need_a_library() {
        let err = Program::link(&snowflake_desc(Options {
            library: false,
            fragment: false,
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::MissingSubobject("library"))));
    }

    #[test]
    fn mesh_nodes_need_graphics_root_state() {
        let err = Program::link(&snowflake_desc(Options {
            config: false,
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::GraphicsStateRequired(_))));
    }

    #[test]
    fn root_parameters_must_be_declared() {
        let err = Program::link(&snowflake_desc(Options {
            root: RootSignatureDesc::empty(),
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::UndeclaredGlobal { node, global })
                if node == NodeId::new("LineMeshNode", 0) && global == "root"
        ));
    }

    #[test]
    fn override_must_name_a_program() {
        let mut desc = snowflake_desc(Options::default());
        let mut second = WorkGraphDesc::new("second");
        second.override_mesh_launch("NoSuchProgram", NodeId::new("X", 0));
        desc.add(second);
        assert!(matches!(
            Program::link(&desc),
            Err(Error::Graph(GraphError::UnknownOverride(name))) if name == "NoSuchProgram"
        ));
    }

    #[test]
    fn recursion_needs_a_bound() {
        let source = format!(
            "{QUEUES}
//# node(launch = thread, entry, input = a_in)
//# output(A, max_records = 1, queue = a_out)
@compute @workgroup_size(1)
fn A() {{ let slot = atomicAdd(&a_out.count, 1u); a_out.records[slot].v = slot; }}
"
        );
        assert!(matches!(
            Program::link(&library_desc(&source)),
            Err(Error::Graph(GraphError::UnboundedRecursion(id))) if id == NodeId::new("A", 0)
        ));
    }

    #[test]
    fn cycles_between_nodes_are_rejected() {
        let source = format!(
            "{QUEUES}
//# node(launch = thread, entry, input = a_in)
//# output(B, max_records = 1, queue = a_out)
@compute @workgroup_size(1)
fn A() {{ let slot = atomicAdd(&a_out.count, 1u); a_out.records[slot].v = slot; }}

//# node(launch = thread, input = b_in)
//# output(A, max_records = 1, queue = b_out)
@compute @workgroup_size(1)
fn B() {{ let slot = atomicAdd(&b_out.count, 1u); b_out.records[slot].v = slot; }}
"
        );
        assert!(matches!(
            Program::link(&library_desc(&source)),
            Err(Error::Graph(GraphError::Cycle(name))) if name == "graph"
        ));
    }

    #[test]
    fn record_strides_must_agree() {
        let source = format!(
            "{QUEUES}
//# node(launch = thread)
//# output(Wide, max_records = 1, queue = a_out)
@compute @workgroup_size(1)
fn Narrow() {{ let slot = atomicAdd(&a_out.count, 1u); a_out.records[slot].v = slot; }}

//# node(launch = thread, input = wide_in)
@compute @workgroup_size(1)
fn Wide() {{ let n = atomicLoad(&wide_in.count); }}
"
        );
        assert!(matches!(
            Program::link(&library_desc(&source)),
            Err(Error::Graph(GraphError::RecordLayoutMismatch { written: 4, read: 16, .. }))
        ));
    }

    #[test]
    fn listed_entrypoints_join_flagged_ones() {
        let mut desc = library_desc(&format!(
            "{QUEUES}
//# node(launch = thread, entry)
//# output(B, max_records = 1, queue = a_out)
@compute @workgroup_size(1)
fn A() {{ let slot = atomicAdd(&a_out.count, 1u); a_out.records[slot].v = slot; }}

//# node(launch = thread, input = b_in)
@compute @workgroup_size(1)
fn B() {{ let n = atomicLoad(&b_in.count); }}
"
        ));
        desc.add(
            WorkGraphDesc::new("listed")
                .include_all_available_nodes()
                .entrypoint(NodeId::new("B", 0)),
        );

        let program = Program::link(&desc).unwrap();
        assert_eq!(program.graphs()[0].entrypoints, vec![0]);
        assert_eq!(program.graphs()[1].entrypoints, vec![0, 1]);
    }

    #[test]
    fn explicit_node_lists_must_resolve() {
        let mut desc = library_desc(&format!(
            "{QUEUES}
//# node(launch = thread)
@compute @workgroup_size(1)
fn Only() {{}}
"
        ));
        desc.add(WorkGraphDesc::new("listed").node(NodeId::new("Missing", 0)));
        assert!(matches!(
            Program::link(&desc),
            Err(Error::Graph(GraphError::UnknownNode(id))) if id == NodeId::new("Missing", 0)
        ));
    }

    #[test]
    fn generic_programs_need_render_targets() {
        let mut desc = snowflake_desc(Options::default());
        desc.add(
            GenericProgramDesc::new()
                .named("Bare")
                .export("LineMeshShader")
                .export("MeshNodePixelShader"),
        );
        assert!(matches!(
            Program::link(&desc),
            Err(Error::Graph(GraphError::IncompleteProgram { program, .. })) if program == "Bare"
        ));
    }
}
