//! Per-backing-memory bind groups and indirect arguments.

use crate::error::{Error, Result};
use crate::memory::BufferRange;
use crate::node::NodeLaunch;
use crate::program::{BackingLayout, LinkedGraph, REGION_ALIGNMENT};

/// Launch constants of one recursion level.
///
/// # WGSL Declaration
///
/// ```wgsl
/// struct NodeLaunchConstants {
///     remaining_recursion_levels: u32,
///     recursion_level: u32,
///     max_recursion_depth: u32,
///     _pad: u32,
/// }
/// ```
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NodeLaunchConstants {
    pub remaining_recursion_levels: u32,
    pub recursion_level: u32,
    pub max_recursion_depth: u32,
    pub _pad: u32,
}

impl NodeLaunchConstants {
    pub fn for_level(max_recursion_depth: u32, level: u32) -> Self {
        Self {
            remaining_recursion_levels: max_recursion_depth.saturating_sub(level),
            recursion_level: level,
            max_recursion_depth,
            _pad: 0,
        }
    }
}

/// Byte size of one indirect argument slot.
pub(crate) const ARGS_SLOT_SIZE: u64 = 16;

/// Offset of the launch constants of `(node, level)` in the launch constants buffer.
pub(crate) fn launch_slots(graph: &LinkedGraph) -> Vec<Vec<Option<u64>>> {
    let mut next = 0;
    graph
        .nodes
        .iter()
        .map(|node| {
            (0..node.levels())
                .map(|_| {
                    node.launch_info.as_ref().map(|_| {
                        let offset = next;
                        next += REGION_ALIGNMENT;
                        offset
                    })
                })
                .collect()
        })
        .collect()
}

/// Initial contents of the launch constants buffer.
pub(crate) fn launch_constants(graph: &LinkedGraph, slots: &[Vec<Option<u64>>]) -> Vec<u8> {
    let size = slots
        .iter()
        .flatten()
        .flatten()
        .map(|offset| offset + REGION_ALIGNMENT)
        .max()
        .unwrap_or(0);
    let mut bytes = vec![0u8; size as usize];
    for (node, levels) in graph.nodes.iter().zip(slots) {
        for (level, slot) in levels.iter().enumerate() {
            if let Some(offset) = slot {
                let constants = NodeLaunchConstants::for_level(node.max_recursion_depth(), level as u32);
                let start = *offset as usize;
                bytes[start..start + size_of::<NodeLaunchConstants>()]
                    .copy_from_slice(bytemuck::bytes_of(&constants));
            }
        }
    }
    bytes
}

/// Initial indirect arguments, one slot per launched queue region.
///
/// Thread levels hold `[groups, 1, 1, 0]` with the group count patched in from the
/// queue count. Mesh levels hold `[vertices, instances, 0, 0]` with the instance
/// count patched in.
pub(crate) fn indirect_args(graph: &LinkedGraph, layout: &BackingLayout) -> Vec<[u32; 4]> {
    layout
        .regions
        .iter()
        .map(|region| {
            let node = &graph.nodes[region.node];
            match node.launch {
                NodeLaunch::Thread => [0, 1, 1, 0],
                NodeLaunch::Mesh => [node.vertices, 0, 0, 0],
            }
        })
        .collect()
}

/// Offset inside an argument slot that receives the queue count.
pub(crate) fn count_patch_offset(launch: NodeLaunch) -> u64 {
    match launch {
        NodeLaunch::Thread => 0,
        NodeLaunch::Mesh => 4,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BindingKey {
    pub graph: u32,
    pub buffer: Option<wgpu::Buffer>,
    pub offset: u64,
    pub size: u64,
    pub max_input_records: u32,
}

/// GPU objects tied to one backing memory range.
pub(crate) struct ExecutionBindings {
    pub key: BindingKey,
    pub layout: BackingLayout,
    pub args: Option<wgpu::Buffer>,
    /// Bind group 1 of every launched `(node, level)`.
    pub groups: Vec<Vec<wgpu::BindGroup>>,
}

impl ExecutionBindings {
    /// Index of the argument slot of a region.
    pub fn args_slot(&self, node: usize, level: u32) -> Option<u64> {
        self.layout
            .regions
            .iter()
            .position(|r| r.node == node && r.level == level)
            .map(|i| i as u64 * ARGS_SLOT_SIZE)
    }

    pub fn group(&self, node: usize, level: u32) -> Option<&wgpu::BindGroup> {
        self.groups.get(node)?.get(level as usize)
    }
}

pub(crate) struct BindingSources<'a> {
    pub graph: &'a LinkedGraph,
    pub node_layouts: &'a [wgpu::BindGroupLayout],
    pub launch_buffer: Option<&'a wgpu::Buffer>,
    pub launch_slots: &'a [Vec<Option<u64>>],
}

pub(crate) fn create(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    sources: &BindingSources<'_>,
    key: BindingKey,
    layout: BackingLayout,
    backing: Option<&BufferRange<wgpu::Buffer>>,
) -> Result<ExecutionBindings> {
    let graph = sources.graph;

    let args = if layout.regions.is_empty() {
        None
    } else {
        let contents = indirect_args(graph, &layout);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Work Graph Indirect Arguments"),
            size: contents.len() as u64 * ARGS_SLOT_SIZE,
            usage: wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&contents));
        Some(buffer)
    };

    let mut groups = Vec::with_capacity(graph.nodes.len());
    for (index, node) in graph.nodes.iter().enumerate() {
        let mut levels = Vec::with_capacity(node.levels() as usize);
        for level in 0..node.levels() {
            let mut entries = Vec::new();
            if let Some(queue) = &node.input {
                entries.push(wgpu::BindGroupEntry {
                    binding: queue.binding,
                    resource: region_binding(graph, &layout, backing, index, level)?,
                });
            }
            if let (Some(info), Some(buffer), Some(offset)) = (
                &node.launch_info,
                sources.launch_buffer,
                sources.launch_slots[index][level as usize],
            ) {
                entries.push(wgpu::BindGroupEntry {
                    binding: info.binding,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset,
                        size: wgpu::BufferSize::new(size_of::<NodeLaunchConstants>() as u64),
                    }),
                });
            }
            for output in &node.outputs {
                let target_level = if output.recursive { level + 1 } else { 0 };
                entries.push(wgpu::BindGroupEntry {
                    binding: output.queue.binding,
                    resource: region_binding(graph, &layout, backing, output.target, target_level)?,
                });
            }

            levels.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} Level {level}", node.id)),
                layout: &sources.node_layouts[index],
                entries: &entries,
            }));
        }
        groups.push(levels);
    }

    tracing::debug!(
        graph = %graph.name,
        regions = layout.regions.len(),
        bytes = layout.size,
        "created execution bindings"
    );
    Ok(ExecutionBindings {
        key,
        layout,
        args,
        groups,
    })
}

fn region_binding<'b>(
    graph: &LinkedGraph,
    layout: &BackingLayout,
    backing: Option<&'b BufferRange<wgpu::Buffer>>,
    node: usize,
    level: u32,
) -> Result<wgpu::BindingResource<'b>> {
    let region = layout.region(node, level).ok_or_else(|| {
        Error::DispatchInput(format!("no queue region for {} level {level}", graph.nodes[node].id))
    })?;
    let backing = backing.ok_or(Error::BackingMemory {
        required: layout.size,
        provided: 0,
    })?;
    Ok(wgpu::BindingResource::Buffer(wgpu::BufferBinding {
        buffer: &backing.buffer,
        offset: backing.offset + region.offset,
        size: wgpu::BufferSize::new(region.size),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::snowflake_program;

    #[test]
    fn launch_constants_count_down_per_level() {
        let level = NodeLaunchConstants::for_level(3, 1);
        assert_eq!(level.remaining_recursion_levels, 2);
        assert_eq!(level.recursion_level, 1);
        assert_eq!(NodeLaunchConstants::for_level(3, 3).remaining_recursion_levels, 0);
        assert_eq!(std::mem::size_of::<NodeLaunchConstants>(), 16);
    }

    #[test]
    fn only_nodes_with_launch_info_get_slots() {
        let program = snowflake_program();
        let graph = &program.graphs()[0];
        let slots = launch_slots(graph);
        let snowflake = graph.nodes.iter().position(|n| n.id.name == "SnowflakeNode").unwrap();

        assert_eq!(slots[snowflake], vec![Some(0), Some(256), Some(512), Some(768)]);
        let others: Vec<_> = slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != snowflake)
            .flat_map(|(_, s)| s.iter())
            .collect();
        assert!(others.iter().all(|s| s.is_none()));

        let bytes = launch_constants(graph, &slots);
        assert_eq!(bytes.len(), 1024);
        let deepest: NodeLaunchConstants = bytemuck::pod_read_unaligned(&bytes[768..784]);
        assert_eq!(deepest.remaining_recursion_levels, 0);
        assert_eq!(deepest.max_recursion_depth, 3);
    }

    #[test]
    fn indirect_arguments_match_launch_kind() {
        let program = snowflake_program();
        let graph = &program.graphs()[0];
        let layout = BackingLayout::compute(graph, 1).unwrap();
        let args = indirect_args(graph, &layout);
        assert_eq!(args.len(), layout.regions.len());

        for (region, slot) in layout.regions.iter().zip(&args) {
            let node = &graph.nodes[region.node];
            match node.launch {
                NodeLaunch::Thread => assert_eq!(slot, &[0, 1, 1, 0]),
                NodeLaunch::Mesh => assert_eq!(slot[0], node.vertices),
            }
        }
        assert_eq!(count_patch_offset(NodeLaunch::Mesh), 4);
    }
}
