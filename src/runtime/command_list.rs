//! Command recording for state objects.
//!
//! A graph dispatch is recorded as ordinary passes:
//!
//! 1. With [`SetWorkGraphFlags::Initialize`](crate::binder::SetWorkGraphFlags)
//!    the whole backing range is cleared.
//! 2. The chosen entrypoint runs as a direct compute dispatch, one invocation per
//!    input record.
//! 3. Every other thread node runs in execution order, one indirect dispatch per
//!    recursion level. The group count is copied out of the queue header first.
//! 4. All mesh nodes draw in a single render pass, instance count copied from
//!    their queue headers the same way.
//! 5. Queue counts are cleared, leaving the backing memory ready for the next
//!    dispatch.

use std::sync::Arc;

use super::bindings::{ExecutionBindings, count_patch_offset};
use super::{NodePipeline, RootSignature, StateObject};
use crate::binder::SetProgramDesc;
use crate::dispatcher::{DispatchGraphDesc, GraphCommands};
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::memory::BufferRange;
use crate::node::NodeLaunch;
use crate::program::{LinkedGraph, ProgramKind, ProgramObject, REGION_ALIGNMENT};

/// Viewport transform applied to mesh node output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Covers a `width` x `height` target with the full depth range.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Pixel rectangle outside of which mesh node output is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl ScissorRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }
}

struct RenderTargets {
    color: wgpu::TextureView,
    depth: Option<wgpu::TextureView>,
}

struct BoundGraph {
    graph: u32,
    bindings: Arc<ExecutionBindings>,
    backing: Option<BufferRange<wgpu::Buffer>>,
    initialize: bool,
    max_input_records: u32,
}

/// Records graph dispatches and the render state mesh nodes draw with.
///
/// Finish the list with [`finish`](Self::finish) and submit the returned
/// command buffer to the queue.
pub struct GraphicsCommandList<'a> {
    gpu: &'a GpuContext,
    state_object: StateObject,
    encoder: wgpu::CommandEncoder,
    root: Option<RootSignature>,
    program: Option<BoundGraph>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    targets: Option<RenderTargets>,
}

impl<'a> GraphicsCommandList<'a> {
    pub fn new(gpu: &'a GpuContext, state_object: &StateObject) -> Self {
        let encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Graphics Command List"),
            });
        Self {
            gpu,
            state_object: state_object.clone(),
            encoder,
            root: None,
            program: None,
            viewport: None,
            scissor: None,
            targets: None,
        }
    }

    pub fn rs_set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn rs_set_scissor_rect(&mut self, rect: ScissorRect) {
        self.scissor = Some(rect);
    }

    /// Clears `view` to `color`.
    pub fn clear_render_target_view(&mut self, view: &wgpu::TextureView, color: [f32; 4]) {
        let [r, g, b, a] = color.map(f64::from);
        self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Render Target"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    /// Clears the depth of `view` to `depth`.
    pub fn clear_depth_stencil_view(&mut self, view: &wgpu::TextureView, depth: f32) {
        self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Depth"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    /// Sets the targets mesh nodes draw into.
    pub fn om_set_render_targets(&mut self, color: &wgpu::TextureView, depth: Option<&wgpu::TextureView>) {
        self.targets = Some(RenderTargets {
            color: color.clone(),
            depth: depth.cloned(),
        });
    }

    pub fn finish(self) -> wgpu::CommandBuffer {
        self.encoder.finish()
    }

    fn launch_threads(
        &mut self,
        graph: &LinkedGraph,
        bound: &BoundGraph,
        root: &RootSignature,
        entry: usize,
    ) -> Result<()> {
        for &index in &graph.order {
            let node = &graph.nodes[index];
            if index == entry || node.launch != NodeLaunch::Thread || node.input.is_none() {
                continue;
            }
            let Some(NodePipeline::Compute(pipeline)) = self.state_object.pipeline(bound.graph, index)
            else {
                continue;
            };
            for level in 0..node.levels() {
                let (args, slot) = patch_count(&mut self.encoder, graph, bound, index, level)?;
                let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&format!("{} Level {level}", node.id)),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, root.bind_group(), &[]);
                pass.set_bind_group(1, bound.bindings.group(index, level), &[]);
                pass.dispatch_workgroups_indirect(args, slot);
            }
            tracing::trace!(node = %node.id, levels = node.levels(), "thread node recorded");
        }
        Ok(())
    }

    fn draw_mesh_nodes(&mut self, graph: &LinkedGraph, bound: &BoundGraph, root: &RootSignature) -> Result<()> {
        let meshes: Vec<usize> = graph
            .order
            .iter()
            .copied()
            .filter(|&i| graph.nodes[i].launch == NodeLaunch::Mesh && graph.nodes[i].input.is_some())
            .collect();
        if meshes.is_empty() {
            return Ok(());
        }
        let targets = self.targets.as_ref().ok_or(Error::RenderTargetsNotSet)?;

        let mut draws = Vec::with_capacity(meshes.len());
        for &index in &meshes {
            draws.push((index, patch_count(&mut self.encoder, graph, bound, index, 0)?));
        }

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Mesh Nodes"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: targets.depth.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some(v) = self.viewport {
            pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
        }
        if let Some(s) = self.scissor {
            pass.set_scissor_rect(
                s.left,
                s.top,
                s.right.saturating_sub(s.left),
                s.bottom.saturating_sub(s.top),
            );
        }
        pass.set_bind_group(0, root.bind_group(), &[]);

        for (index, (args, slot)) in draws {
            let Some(NodePipeline::Render(pipeline)) = self.state_object.pipeline(bound.graph, index) else {
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, bound.bindings.group(index, 0), &[]);
            pass.draw_indirect(args, slot);
            tracing::trace!(node = %graph.nodes[index].id, "mesh node recorded");
        }
        Ok(())
    }
}

/// Copies the record count of `(node, level)` into its indirect argument slot.
fn patch_count<'b>(
    encoder: &mut wgpu::CommandEncoder,
    graph: &LinkedGraph,
    bound: &'b BoundGraph,
    node: usize,
    level: u32,
) -> Result<(&'b wgpu::Buffer, u64)> {
    let missing = || Error::DispatchInput(format!("{} level {level} has no queue", graph.nodes[node].id));
    let region = bound.bindings.layout.region(node, level).ok_or_else(missing)?;
    let slot = bound.bindings.args_slot(node, level).ok_or_else(missing)?;
    let (Some(args), Some(backing)) = (bound.bindings.args.as_ref(), bound.backing.as_ref()) else {
        return Err(missing());
    };
    encoder.copy_buffer_to_buffer(
        &backing.buffer,
        backing.offset + region.count_offset,
        args,
        slot + count_patch_offset(graph.nodes[node].launch),
        4,
    );
    Ok((args, slot))
}

impl GraphCommands for GraphicsCommandList<'_> {
    type Buffer = wgpu::Buffer;
    type RootSignature = RootSignature;

    fn set_graphics_root_signature(&mut self, root_signature: &RootSignature) {
        self.root = Some(root_signature.clone());
    }

    fn set_program(&mut self, desc: &SetProgramDesc<wgpu::Buffer>) -> Result<()> {
        if desc.program_type != ProgramKind::WorkGraph || desc.program.kind() != ProgramKind::WorkGraph {
            return Err(Error::NotAWorkGraph);
        }
        let program = self.state_object.program();
        if !program.owns(&desc.program) {
            return Err(Error::ProgramMismatch);
        }
        let properties = self
            .state_object
            .work_graph_properties()
            .ok_or(Error::UnsupportedProperties("work graph"))?;
        let graph = desc.program.index;
        let layout = properties.backing_layout(graph)?;

        match &desc.backing_memory {
            Some(range) if range.offset % REGION_ALIGNMENT != 0 => {
                return Err(Error::MisalignedBackingMemory(range.offset));
            }
            Some(range) if range.size < layout.size => {
                return Err(Error::BackingMemory {
                    required: layout.size,
                    provided: range.size,
                });
            }
            None if layout.size > 0 => {
                return Err(Error::BackingMemory {
                    required: layout.size,
                    provided: 0,
                });
            }
            _ => {}
        }

        let max_input_records = properties.maximum_input_records(graph);
        let bindings = self.state_object.execution_bindings(
            self.gpu,
            graph,
            layout,
            desc.backing_memory.as_ref(),
            max_input_records,
        )?;
        self.program = Some(BoundGraph {
            graph,
            bindings,
            backing: desc.backing_memory.clone(),
            initialize: desc.is_initializing(),
            max_input_records,
        });
        Ok(())
    }

    fn dispatch_graph(&mut self, desc: &DispatchGraphDesc<'_>) -> Result<()> {
        let mut bound = self.program.take().ok_or(Error::ProgramNotSet)?;
        let result = self.record_dispatch(&bound, desc);
        if result.is_ok() {
            bound.initialize = false;
        }
        self.program = Some(bound);
        result
    }
}

impl GraphicsCommandList<'_> {
    fn record_dispatch(&mut self, bound: &BoundGraph, desc: &DispatchGraphDesc<'_>) -> Result<()> {
        let root = self.root.clone().ok_or(Error::RootSignatureNotSet)?;
        let state_object = self.state_object.clone();
        let program = state_object.program();
        if root.desc() != program.root_signature() {
            return Err(Error::RootSignatureMismatch);
        }
        let graph = program
            .graph(bound.graph)
            .ok_or_else(|| Error::UnknownProgram(format!("work graph #{}", bound.graph)))?;

        let entry = *graph
            .entrypoints
            .get(desc.entrypoint_index as usize)
            .ok_or_else(|| Error::InvalidEntrypoint {
                index: desc.entrypoint_index,
                reason: format!("graph has {} entrypoints", graph.entrypoints.len()),
            })?;
        if !graph.nodes[entry].is_parameterless() {
            return Err(Error::InvalidEntrypoint {
                index: desc.entrypoint_index,
                reason: "entrypoints with record input cannot be launched from the host".into(),
            });
        }
        if desc.records.is_some() || desc.record_stride != 0 {
            return Err(Error::DispatchInput("record payloads are not supported".into()));
        }
        if desc.num_records > bound.max_input_records {
            return Err(Error::DispatchInput(format!(
                "{} records exceed the maximum of {}",
                desc.num_records, bound.max_input_records
            )));
        }
        if graph.has_mesh_nodes() && self.targets.is_none() {
            return Err(Error::RenderTargetsNotSet);
        }

        if bound.initialize {
            if let Some(backing) = &bound.backing {
                self.encoder
                    .clear_buffer(&backing.buffer, backing.offset, Some(backing.size));
            }
        }

        let Some(NodePipeline::Compute(pipeline)) = state_object.pipeline(bound.graph, entry) else {
            return Err(Error::InvalidEntrypoint {
                index: desc.entrypoint_index,
                reason: "entrypoint is not a thread node".into(),
            });
        };
        {
            let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&graph.nodes[entry].id.to_string()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, root.bind_group(), &[]);
            pass.set_bind_group(1, bound.bindings.group(entry, 0), &[]);
            pass.dispatch_workgroups(desc.num_records, 1, 1);
        }

        self.launch_threads(graph, bound, &root, entry)?;
        self.draw_mesh_nodes(graph, bound, &root)?;

        if let Some(backing) = &bound.backing {
            for region in &bound.bindings.layout.regions {
                self.encoder
                    .clear_buffer(&backing.buffer, backing.offset + region.count_offset, Some(4));
            }
        }

        tracing::trace!(
            graph = %graph.name,
            entrypoint = desc.entrypoint_index,
            records = desc.num_records,
            "graph dispatch recorded"
        );
        Ok(())
    }
}
