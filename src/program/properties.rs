//! Property views over a linked program.

use super::sizing::{BackingLayout, MemoryRequirements};
use super::{InputLimits, LinkedGraph, Program, ProgramIdentifier, ProgramKind};
use crate::error::{Error, Result};
use crate::node::NodeId;

/// Program lookup by name.
#[derive(Debug, Clone, Copy)]
pub struct StateObjectProperties<'p> {
    program: &'p Program,
}

impl<'p> StateObjectProperties<'p> {
    pub(crate) fn new(program: &'p Program) -> Self {
        Self { program }
    }

    /// Returns the identifier of the work graph or generic program called `name`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownProgram`] if nothing in the program object has that name.
    pub fn program_identifier(&self, name: &str) -> Result<ProgramIdentifier> {
        let graph = self.program.graphs().iter().position(|g| g.name == name);
        let generic = || {
            self.program
                .generic_programs()
                .iter()
                .position(|p| p.name == name)
        };
        let (kind, index) = match graph {
            Some(index) => (ProgramKind::WorkGraph, index),
            None => (
                ProgramKind::Generic,
                generic().ok_or_else(|| Error::UnknownProgram(name.to_string()))?,
            ),
        };
        Ok(ProgramIdentifier {
            object: self.program.serial(),
            kind,
            index: index as u32,
        })
    }
}

/// Queries and sizing controls for the work graphs of a program.
///
/// Graphs, nodes and entrypoints are addressed by index. Out of range indices
/// report zero counts or `None`.
#[derive(Debug, Clone, Copy)]
pub struct WorkGraphProperties<'p> {
    program: &'p Program,
}

impl<'p> WorkGraphProperties<'p> {
    pub(crate) fn new(program: &'p Program) -> Self {
        Self { program }
    }

    pub fn work_graph_count(&self) -> u32 {
        self.program.graphs().len() as u32
    }

    pub fn work_graph_index(&self, name: &str) -> Option<u32> {
        self.program
            .graphs()
            .iter()
            .position(|g| g.name == name)
            .map(|i| i as u32)
    }

    pub fn num_nodes(&self, graph: u32) -> u32 {
        self.program.graph(graph).map_or(0, |g| g.nodes.len() as u32)
    }

    pub fn node_index(&self, graph: u32, id: &NodeId) -> Option<u32> {
        self.program
            .graph(graph)?
            .node_index(id)
            .map(|i| i as u32)
    }

    pub fn num_entrypoints(&self, graph: u32) -> u32 {
        self.program
            .graph(graph)
            .map_or(0, |g| g.entrypoints.len() as u32)
    }

    pub fn entrypoint_index(&self, graph: u32, id: &NodeId) -> Option<u32> {
        let graph = self.program.graph(graph)?;
        let node = graph.node_index(id)?;
        graph
            .entrypoints
            .iter()
            .position(|&e| e == node)
            .map(|i| i as u32)
    }

    /// Sets the largest dispatch the backing memory of `graph` must accommodate.
    ///
    /// `records` is the most input records any one dispatch passes and
    /// `node_inputs` the most entrypoints one dispatch feeds. Both are clamped to
    /// at least one.
    pub fn set_maximum_input_records(&self, graph: u32, records: u32, node_inputs: u32) {
        self.program.set_input_limits(
            graph,
            InputLimits {
                records: records.max(1),
                node_inputs: node_inputs.max(1),
            },
        );
        tracing::debug!(graph, records, node_inputs, "maximum input records set");
    }

    pub fn maximum_input_records(&self, graph: u32) -> u32 {
        self.program.input_limits(graph).records
    }

    /// Backing memory `graph` needs under the current input limits.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownProgram`] for an out of range graph index, and
    /// [`GraphError::DispatchLimit`](crate::GraphError::DispatchLimit) if the
    /// limits make a level too large to launch.
    pub fn memory_requirements(&self, graph: u32) -> Result<MemoryRequirements> {
        Ok(self.backing_layout(graph)?.requirements())
    }

    pub(crate) fn backing_layout(&self, graph: u32) -> Result<BackingLayout> {
        BackingLayout::compute(self.linked(graph)?, self.maximum_input_records(graph))
    }

    pub(crate) fn linked(&self, graph: u32) -> Result<&'p LinkedGraph> {
        self.program
            .graph(graph)
            .ok_or_else(|| Error::UnknownProgram(format!("work graph #{graph}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Profile, ProgramCompiler};
    use crate::program::ProgramObject;
    use crate::state_object::{LibraryDesc, StateObjectDesc, StateObjectType};
    use crate::topology::{GRAPH_NAME, snowflake_program};

    #[test]
    fn identifiers_resolve_by_name() {
        let program = snowflake_program();
        let properties = program.state_object_properties().unwrap();

        let graph = properties.program_identifier(GRAPH_NAME).unwrap();
        assert_eq!(graph.kind(), ProgramKind::WorkGraph);
        assert!(program.owns(&graph));

        let generic = properties
            .program_identifier("LineMeshNodeGenericProgram")
            .unwrap();
        assert_eq!(generic.kind(), ProgramKind::Generic);

        assert!(matches!(
            properties.program_identifier("Missing"),
            Err(Error::UnknownProgram(name)) if name == "Missing"
        ));
    }

    #[test]
    fn identifiers_belong_to_one_program_object() {
        let first = snowflake_program();
        let second = snowflake_program();
        let id = first
            .state_object_properties()
            .unwrap()
            .program_identifier(GRAPH_NAME)
            .unwrap();
        assert!(first.owns(&id));
        assert!(!second.owns(&id));
    }

    #[test]
    fn node_and_entrypoint_indices() {
        let program = snowflake_program();
        let properties = program.work_graph_properties().unwrap();
        let graph = properties.work_graph_index(GRAPH_NAME).unwrap();

        assert_eq!(properties.work_graph_count(), 1);
        assert_eq!(properties.num_nodes(graph), 4);
        assert_eq!(properties.num_entrypoints(graph), 1);
        assert_eq!(
            properties.entrypoint_index(graph, &NodeId::new("EntryNode", 0)),
            Some(0)
        );
        assert_eq!(
            properties.entrypoint_index(graph, &NodeId::new("SnowflakeNode", 0)),
            None
        );
        assert!(properties
            .node_index(graph, &NodeId::new("TriangleMeshNode", 0))
            .is_some());
        assert_eq!(properties.num_nodes(7), 0);
        assert!(properties.work_graph_index("Missing").is_none());
    }

    #[test]
    fn input_limits_drive_memory_requirements() {
        let program = snowflake_program();
        let properties = program.work_graph_properties().unwrap();

        assert_eq!(properties.maximum_input_records(0), 1);
        let single = properties.memory_requirements(0).unwrap();
        assert!(single.min_size_in_bytes > 0);
        assert_eq!(single.size_granularity_in_bytes, 256);

        properties.set_maximum_input_records(0, 2, 1);
        assert_eq!(properties.maximum_input_records(0), 2);
        assert!(properties.memory_requirements(0).unwrap().min_size_in_bytes > single.min_size_in_bytes);

        properties.set_maximum_input_records(0, 0, 0);
        assert_eq!(properties.maximum_input_records(0), 1);
        assert!(properties.memory_requirements(3).is_err());
    }

    #[test]
    fn collections_have_no_work_graph_view() {
        let source = include_str!("../shaders/snowflake.wgsl");
        let library = ProgramCompiler::new()
            .compile(source, None, Profile::Library)
            .unwrap();
        let mut desc = StateObjectDesc::new(StateObjectType::Collection);
        desc.add(LibraryDesc::new(&library));

        let program = Program::link(&desc).unwrap();
        assert!(program.work_graph_properties().is_none());
        assert!(program.state_object_properties().is_some());
    }
}
