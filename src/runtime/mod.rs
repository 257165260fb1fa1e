//! GPU realization of linked programs.
//!
//! A [`StateObject`] owns one pipeline per node, the bind group layouts the
//! pipelines were built against, and the launch constants of every recursion
//! level. Per-dispatch objects that depend on the bound backing memory live in
//! [`ExecutionBindings`](bindings::ExecutionBindings), cached on the state
//! object and rebuilt only when a different range is bound.
//!
//! Recording happens through [`GraphicsCommandList`].

mod bindings;
mod command_list;
mod root_signature;

pub use bindings::NodeLaunchConstants;
pub use command_list::{GraphicsCommandList, ScissorRect, Viewport};
pub use root_signature::{RootConstants, RootSignature};

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::gpu::GpuContext;
use crate::memory::BufferRange;
use crate::node::NodeLaunch;
use crate::program::{
    BackingLayout, LinkedGraph, LinkedNode, Program, ProgramObject, StateObjectProperties,
    WorkGraphProperties,
};
use crate::state_object::StateObjectDesc;
use bindings::{BindingKey, BindingSources, ExecutionBindings};

pub(crate) enum NodePipeline {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

struct GraphPipelines {
    node_layouts: Vec<wgpu::BindGroupLayout>,
    pipelines: Vec<NodePipeline>,
    launch_buffer: Option<wgpu::Buffer>,
    launch_slots: Vec<Vec<Option<u64>>>,
    bindings: Mutex<Option<Arc<ExecutionBindings>>>,
}

struct Inner {
    program: Program,
    graphs: Vec<GraphPipelines>,
}

/// An executable program object.
///
/// Clones share the same pipelines. Property queries are answered by the
/// linked [`Program`] inside.
#[derive(Clone)]
pub struct StateObject {
    inner: Arc<Inner>,
}

impl StateObject {
    /// Links `desc` and creates every pipeline it describes.
    ///
    /// # Errors
    ///
    /// Any linking error from [`Program::link`], or
    /// [`Error::ResourceCreation`](crate::Error::ResourceCreation) if the device
    /// rejects a shader module or pipeline.
    pub fn new(gpu: &GpuContext, desc: &StateObjectDesc) -> Result<Self> {
        let program = Program::link(desc)?;

        let graphs = gpu.scoped("program object", |device| {
            let shaders: Vec<wgpu::ShaderModule> = program
                .modules()
                .iter()
                .enumerate()
                .map(|(index, module)| {
                    device.create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(&format!("Node Module {index}")),
                        source: wgpu::ShaderSource::Wgsl(module.source().into()),
                    })
                })
                .collect();
            let root_layout = root_signature::layout(device, program.root_signature());

            program
                .graphs()
                .iter()
                .map(|graph| create_graph(device, &gpu.queue, &program, graph, &shaders, &root_layout))
                .collect::<Vec<_>>()
        })?;

        tracing::info!(
            graphs = graphs.len(),
            nodes = program.graphs().iter().map(|g| g.nodes.len()).sum::<usize>(),
            programs = program.generic_programs().len(),
            "program object created"
        );

        Ok(Self {
            inner: Arc::new(Inner { program, graphs }),
        })
    }

    /// The linked program this state object executes.
    pub fn program(&self) -> &Program {
        &self.inner.program
    }

    pub(crate) fn pipeline(&self, graph: u32, node: usize) -> Option<&NodePipeline> {
        self.inner.graphs.get(graph as usize)?.pipelines.get(node)
    }

    /// Bind groups and indirect arguments for `backing`, reusing the previous
    /// set when the same range is bound again.
    pub(crate) fn execution_bindings(
        &self,
        gpu: &GpuContext,
        graph: u32,
        layout: BackingLayout,
        backing: Option<&BufferRange<wgpu::Buffer>>,
        max_input_records: u32,
    ) -> Result<Arc<ExecutionBindings>> {
        let linked = self.inner.program.graph(graph).ok_or_else(|| {
            crate::Error::UnknownProgram(format!("work graph #{graph}"))
        })?;
        let pipelines = &self.inner.graphs[graph as usize];
        let key = BindingKey {
            graph,
            buffer: backing.map(|b| b.buffer.clone()),
            offset: backing.map_or(0, |b| b.offset),
            size: backing.map_or(0, |b| b.size),
            max_input_records,
        };

        let mut cached = pipelines.bindings.lock();
        if let Some(existing) = cached.as_ref().filter(|b| b.key == key) {
            return Ok(existing.clone());
        }

        let sources = BindingSources {
            graph: linked,
            node_layouts: &pipelines.node_layouts,
            launch_buffer: pipelines.launch_buffer.as_ref(),
            launch_slots: &pipelines.launch_slots,
        };
        let created = gpu.scoped("work graph bindings", |device| {
            bindings::create(device, &gpu.queue, &sources, key, layout, backing)
        })??;
        let created = Arc::new(created);
        *cached = Some(created.clone());
        Ok(created)
    }
}

impl ProgramObject for StateObject {
    fn state_object_properties(&self) -> Option<StateObjectProperties<'_>> {
        self.inner.program.state_object_properties()
    }

    fn work_graph_properties(&self) -> Option<WorkGraphProperties<'_>> {
        self.inner.program.work_graph_properties()
    }
}

impl std::fmt::Debug for StateObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateObject")
            .field("program", &self.inner.program)
            .finish()
    }
}

fn create_graph(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    program: &Program,
    graph: &LinkedGraph,
    shaders: &[wgpu::ShaderModule],
    root_layout: &wgpu::BindGroupLayout,
) -> GraphPipelines {
    let node_layouts: Vec<wgpu::BindGroupLayout> = graph
        .nodes
        .iter()
        .map(|node| node_layout(device, node))
        .collect();

    let pipelines = graph
        .nodes
        .iter()
        .zip(&node_layouts)
        .map(|(node, node_layout)| {
            let label = node.id.to_string();
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&label),
                bind_group_layouts: &[root_layout, node_layout],
                push_constant_ranges: &[],
            });
            match (node.launch, node.program) {
                (NodeLaunch::Mesh, Some(index)) => NodePipeline::Render(render_pipeline(
                    device,
                    program,
                    index,
                    &label,
                    &layout,
                    shaders,
                )),
                _ => NodePipeline::Compute(device.create_compute_pipeline(
                    &wgpu::ComputePipelineDescriptor {
                        label: Some(&label),
                        layout: Some(&layout),
                        module: &shaders[node.module],
                        entry_point: Some(&node.export),
                        compilation_options: Default::default(),
                        cache: None,
                    },
                )),
            }
        })
        .collect();

    let launch_slots = bindings::launch_slots(graph);
    let contents = bindings::launch_constants(graph, &launch_slots);
    let launch_buffer = (!contents.is_empty()).then(|| {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Launch Constants"),
            size: contents.len() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&buffer, 0, &contents);
        buffer
    });

    GraphPipelines {
        node_layouts,
        pipelines,
        launch_buffer,
        launch_slots,
        bindings: Mutex::new(None),
    }
}

/// Group 1 layout of a node: its input queue, launch constants and outputs.
fn node_layout(device: &wgpu::Device, node: &LinkedNode) -> wgpu::BindGroupLayout {
    let visibility = match node.launch {
        NodeLaunch::Thread => wgpu::ShaderStages::COMPUTE,
        NodeLaunch::Mesh => wgpu::ShaderStages::VERTEX,
    };
    let storage = |read_only| wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Storage { read_only },
        has_dynamic_offset: false,
        min_binding_size: None,
    };

    let mut entries = BTreeMap::new();
    if let Some(queue) = &node.input {
        entries.insert(queue.binding, storage(!queue.writable));
    }
    if let Some(info) = &node.launch_info {
        entries.insert(
            info.binding,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        );
    }
    for output in &node.outputs {
        entries.insert(output.queue.binding, storage(false));
    }

    let entries: Vec<wgpu::BindGroupLayoutEntry> = entries
        .into_iter()
        .map(|(binding, ty)| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty,
            count: None,
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{} Queues", node.id)),
        entries: &entries,
    })
}

fn render_pipeline(
    device: &wgpu::Device,
    program: &Program,
    index: usize,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shaders: &[wgpu::ShaderModule],
) -> wgpu::RenderPipeline {
    let generic = &program.generic_programs()[index];
    let targets: Vec<Option<wgpu::ColorTargetState>> = generic
        .color_formats
        .iter()
        .map(|&format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shaders[generic.mesh_module],
            entry_point: Some(&generic.mesh_export),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shaders[generic.fragment_module],
            entry_point: Some(&generic.fragment_export),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: generic.rasterizer.primitive_state(),
        depth_stencil: generic
            .depth_format
            .map(|format| generic.depth_stencil.depth_stencil_state(format)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
