//! Worst-case backing memory layout.
//!
//! Every node with an input queue gets one region per queue level. A region is a
//! queue header followed by room for the most records any execution can append
//! to that level, so a graph never runs out of queue space mid-dispatch.

use super::{LinkedGraph, LinkedNode};
use crate::error::{GraphError, Result};
use crate::node::NodeLaunch;

/// Alignment of every queue region and of the backing memory itself.
pub const REGION_ALIGNMENT: u64 = 256;

/// Most records a single thread node level may launch in one indirect dispatch.
pub const MAX_RECORDS_PER_LEVEL: u64 = 65535;

/// Backing memory a work graph needs to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRequirements {
    pub min_size_in_bytes: u64,
    pub max_size_in_bytes: u64,
    pub size_granularity_in_bytes: u64,
}

impl MemoryRequirements {
    pub(crate) fn exact(size: u64) -> Self {
        Self {
            min_size_in_bytes: size,
            max_size_in_bytes: size,
            size_granularity_in_bytes: REGION_ALIGNMENT,
        }
    }
}

/// One queue level inside the backing memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRegion {
    /// Index of the node in its graph.
    pub node: usize,
    pub level: u32,
    /// Offset of the region from the start of the backing range.
    pub offset: u64,
    pub size: u64,
    /// Records the region can hold.
    pub capacity: u64,
    /// Offset of the record count from the start of the backing range.
    pub count_offset: u64,
    /// Contributions to this region are discarded by the graph.
    pub sink: bool,
}

/// Placement of every queue region of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackingLayout {
    pub regions: Vec<QueueRegion>,
    pub size: u64,
}

impl BackingLayout {
    /// Lays out `graph` for dispatches of at most `max_input_records` records per entrypoint.
    ///
    /// # Errors
    ///
    /// [`GraphError::DispatchLimit`] if some thread node level could receive more
    /// records than a single dispatch can launch.
    pub fn compute(graph: &LinkedGraph, max_input_records: u32) -> Result<Self> {
        let invocations = worst_case_invocations(graph, u64::from(max_input_records.max(1)))?;

        let mut regions = Vec::new();
        let mut size = 0;
        for (index, node) in graph.nodes.iter().enumerate() {
            let Some(queue) = &node.input else {
                continue;
            };
            for level in 0..node.queue_levels() {
                let sink = node.recursive && level == node.levels();
                let capacity = if sink {
                    1
                } else {
                    invocations[index][level as usize].max(1)
                };
                let bytes = u64::from(queue.records_offset)
                    + capacity * u64::from(queue.record_stride);
                let region_size = bytes.next_multiple_of(REGION_ALIGNMENT);
                regions.push(QueueRegion {
                    node: index,
                    level,
                    offset: size,
                    size: region_size,
                    capacity,
                    count_offset: size + u64::from(queue.count_offset),
                    sink,
                });
                size += region_size;
            }
        }

        Ok(Self { regions, size })
    }

    pub fn region(&self, node: usize, level: u32) -> Option<&QueueRegion> {
        self.regions
            .iter()
            .find(|r| r.node == node && r.level == level)
    }

    pub fn requirements(&self) -> MemoryRequirements {
        MemoryRequirements::exact(self.size)
    }
}

/// Worst-case invocations of every launched level of every node.
pub(crate) fn worst_case_invocations(
    graph: &LinkedGraph,
    max_input_records: u64,
) -> Result<Vec<Vec<u64>>> {
    let mut invocations: Vec<Vec<u64>> = graph
        .nodes
        .iter()
        .map(|n| vec![0; n.levels() as usize])
        .collect();
    for &entry in &graph.entrypoints {
        invocations[entry][0] = invocations[entry][0].saturating_add(max_input_records);
    }

    for &index in &graph.order {
        let node = &graph.nodes[index];
        for level in 0..node.levels() {
            let launched = invocations[index][level as usize];
            check_dispatch_limit(node, launched)?;

            for output in &node.outputs {
                let records = launched.saturating_mul(u64::from(output.max_records));
                if output.recursive {
                    let next = level as usize + 1;
                    if let Some(slot) = invocations[index].get_mut(next) {
                        *slot = slot.saturating_add(records);
                    }
                } else {
                    let slot = &mut invocations[output.target][0];
                    *slot = slot.saturating_add(records);
                }
            }
        }
    }
    Ok(invocations)
}

fn check_dispatch_limit(node: &LinkedNode, records: u64) -> Result<()> {
    if node.launch == NodeLaunch::Thread && records > MAX_RECORDS_PER_LEVEL {
        return Err(GraphError::DispatchLimit {
            node: node.id.clone(),
            records,
            limit: MAX_RECORDS_PER_LEVEL,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::topology::snowflake_program;

    #[test]
    fn snowflake_capacities_follow_subdivision() {
        let program = snowflake_program();
        let graph = &program.graphs()[0];
        let layout = BackingLayout::compute(graph, 1).unwrap();

        let snowflake = graph.nodes.iter().position(|n| n.id.name == "SnowflakeNode").unwrap();
        let line = graph.nodes.iter().position(|n| n.id.name == "LineMeshNode").unwrap();
        let triangle = graph.nodes.iter().position(|n| n.id.name == "TriangleMeshNode").unwrap();

        let capacities: Vec<u64> = (0..5)
            .map(|level| layout.region(snowflake, level).unwrap().capacity)
            .collect();
        assert_eq!(capacities, vec![3, 12, 48, 192, 1]);
        assert!(layout.region(snowflake, 4).unwrap().sink);
        assert_eq!(layout.region(line, 0).unwrap().capacity, 255);
        assert_eq!(layout.region(triangle, 0).unwrap().capacity, 256);

        // The parameterless entry needs no region of its own.
        assert!(layout.region(graph.entrypoints[0], 0).is_none());
    }

    #[test]
    fn regions_are_aligned_and_packed() {
        let program = snowflake_program();
        let layout = BackingLayout::compute(&program.graphs()[0], 1).unwrap();

        let mut end = 0;
        for region in &layout.regions {
            assert_eq!(region.offset, end);
            assert_eq!(region.offset % REGION_ALIGNMENT, 0);
            assert_eq!(region.size % REGION_ALIGNMENT, 0);
            assert!(region.size >= 16 + region.capacity * 16);
            end += region.size;
        }
        assert_eq!(layout.size, end);
        assert_eq!(layout.requirements().min_size_in_bytes, layout.size);
        assert_eq!(layout.requirements().max_size_in_bytes, layout.size);
    }

    #[test]
    fn more_input_records_need_more_memory() {
        let program = snowflake_program();
        let graph = &program.graphs()[0];
        let one = BackingLayout::compute(graph, 1).unwrap();
        let two = BackingLayout::compute(graph, 2).unwrap();
        assert!(two.size > one.size);
    }

    #[test]
    fn oversized_levels_hit_the_dispatch_limit() {
        let program = snowflake_program();
        // 3 * 4^3 * 1000 records reach the deepest snowflake level.
        let err = BackingLayout::compute(&program.graphs()[0], 1000).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::DispatchLimit { limit: MAX_RECORDS_PER_LEVEL, .. })
        ));
    }
}
