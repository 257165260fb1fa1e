//! Graph sizing and program binding.
//!
//! [`prepare`] runs once per session. It sizes the named graph for a single seed
//! record, allocates backing memory when the graph needs any, and returns the
//! [`SetProgramDesc`] the frame dispatcher binds every frame.

use crate::error::{Error, Result};
use crate::memory::{BufferAllocator, BufferDesc, BufferRange};
use crate::program::{ProgramIdentifier, ProgramKind, ProgramObject};

/// How a bound work graph treats its backing memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetWorkGraphFlags {
    /// Backing memory holds whatever the previous dispatch left behind.
    #[default]
    None,
    /// Backing memory is initialized before the next dispatch.
    Initialize,
}

/// Everything needed to make a program the active one on a command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetProgramDesc<B> {
    pub program_type: ProgramKind,
    pub program: ProgramIdentifier,
    pub flags: SetWorkGraphFlags,
    /// Absent when the graph needs no backing memory.
    pub backing_memory: Option<BufferRange<B>>,
}

impl<B> SetProgramDesc<B> {
    pub fn is_initializing(&self) -> bool {
        self.flags == SetWorkGraphFlags::Initialize
    }
}

const BACKING_MEMORY_LABEL: &str = "Work Graph Backing Memory";

/// Sizes `graph_name` inside `program` and builds its dispatch descriptor.
///
/// The graph is configured for dispatches of exactly one input record. Backing
/// memory of the reported maximum size is allocated through `allocator` unless
/// the graph needs none.
///
/// # Errors
///
/// - [`Error::UnsupportedProperties`] if `program` lacks either property view.
/// - [`Error::UnknownProgram`] if no graph is called `graph_name`.
/// - Any error from sizing the graph or from `allocator`.
///
/// # Example
///
/// ```ignore
/// let desc = binder::prepare(&state_object, "Hello Mesh Nodes", &mut gpu)?;
/// let mut dispatcher = FrameDispatcher::new(root_signature, desc);
/// ```
pub fn prepare<P, A>(program: &P, graph_name: &str, allocator: &mut A) -> Result<SetProgramDesc<A::Buffer>>
where
    P: ProgramObject + ?Sized,
    A: BufferAllocator,
{
    let state_object = program
        .state_object_properties()
        .ok_or(Error::UnsupportedProperties("state object"))?;
    let work_graph = program
        .work_graph_properties()
        .ok_or(Error::UnsupportedProperties("work graph"))?;

    let index = work_graph
        .work_graph_index(graph_name)
        .ok_or_else(|| Error::UnknownProgram(graph_name.to_string()))?;

    work_graph.set_maximum_input_records(index, 1, 1);
    let requirements = work_graph.memory_requirements(index)?;

    let backing_memory = if requirements.max_size_in_bytes > 0 {
        let size = requirements.max_size_in_bytes;
        let buffer = allocator.create_buffer(&BufferDesc::unordered_access(BACKING_MEMORY_LABEL, size))?;
        tracing::info!(graph = graph_name, bytes = size, "allocated backing memory");
        Some(BufferRange::whole(buffer, size))
    } else {
        tracing::info!(graph = graph_name, "graph needs no backing memory");
        None
    };

    let program = state_object.program_identifier(graph_name)?;
    Ok(SetProgramDesc {
        program_type: ProgramKind::WorkGraph,
        program,
        flags: SetWorkGraphFlags::Initialize,
        backing_memory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Profile, ProgramCompiler};
    use crate::memory::{HeapType, ResourceFlags};
    use crate::program::Program;
    use crate::state_object::{
        LibraryDesc, RootSignatureDesc, StateObjectDesc, StateObjectType, WorkGraphDesc,
    };
    use crate::topology::{GRAPH_NAME, snowflake_program};

    /// Hands out sequential buffer handles and remembers every request.
    #[derive(Default)]
    struct RecordingAllocator {
        requests: Vec<BufferDesc>,
        fail: bool,
    }

    impl BufferAllocator for RecordingAllocator {
        type Buffer = usize;

        fn create_buffer(&mut self, desc: &BufferDesc) -> Result<usize> {
            if self.fail {
                return Err(Error::ResourceCreation {
                    what: desc.label.clone(),
                    message: "out of memory".into(),
                });
            }
            self.requests.push(desc.clone());
            Ok(self.requests.len() - 1)
        }
    }

    #[test]
    fn snowflake_gets_exactly_sized_backing_memory() {
        let program = snowflake_program();
        let mut allocator = RecordingAllocator::default();
        let desc = prepare(&program, GRAPH_NAME, &mut allocator).unwrap();

        let properties = program.work_graph_properties().unwrap();
        assert_eq!(properties.maximum_input_records(0), 1);
        let required = properties.memory_requirements(0).unwrap().max_size_in_bytes;

        assert_eq!(allocator.requests.len(), 1);
        let request = &allocator.requests[0];
        assert_eq!(request.size, required);
        assert_eq!(request.heap, HeapType::Default);
        assert_eq!(request.flags, ResourceFlags::AllowUnorderedAccess);

        assert!(desc.is_initializing());
        assert_eq!(desc.program_type, ProgramKind::WorkGraph);
        assert!(program.owns(&desc.program));
        assert_eq!(
            desc.backing_memory,
            Some(BufferRange {
                buffer: 0,
                offset: 0,
                size: required
            })
        );
    }

    #[test]
    fn unknown_graph_allocates_nothing() {
        let program = snowflake_program();
        let mut allocator = RecordingAllocator::default();
        assert!(matches!(
            prepare(&program, "Goodbye Mesh Nodes", &mut allocator),
            Err(Error::UnknownProgram(name)) if name == "Goodbye Mesh Nodes"
        ));
        assert!(allocator.requests.is_empty());
    }

    #[test]
    fn queue_free_graph_has_no_backing_memory() {
        let source = "//# node(launch = thread)\n@compute @workgroup_size(1)\nfn Solo() {}\n";
        let library = ProgramCompiler::new()
            .compile(source, None, Profile::Library)
            .unwrap();
        let mut desc = StateObjectDesc::new(StateObjectType::Executable);
        desc.add(RootSignatureDesc::empty());
        desc.add(WorkGraphDesc::new("solo").include_all_available_nodes());
        desc.add(LibraryDesc::new(&library));
        let program = Program::link(&desc).unwrap();

        let mut allocator = RecordingAllocator::default();
        let prepared = prepare(&program, "solo", &mut allocator).unwrap();
        assert!(allocator.requests.is_empty());
        assert!(prepared.backing_memory.is_none());
        assert!(prepared.is_initializing());
    }

    #[test]
    fn collections_cannot_be_prepared() {
        let source = include_str!("shaders/snowflake.wgsl");
        let library = ProgramCompiler::new()
            .compile(source, None, Profile::Library)
            .unwrap();
        let mut desc = StateObjectDesc::new(StateObjectType::Collection);
        desc.add(LibraryDesc::new(&library));
        let program = Program::link(&desc).unwrap();

        assert!(matches!(
            prepare(&program, GRAPH_NAME, &mut RecordingAllocator::default()),
            Err(Error::UnsupportedProperties("work graph"))
        ));
    }

    #[test]
    fn allocation_failures_propagate() {
        let program = snowflake_program();
        let mut allocator = RecordingAllocator {
            fail: true,
            ..Default::default()
        };
        assert!(matches!(
            prepare(&program, GRAPH_NAME, &mut allocator),
            Err(Error::ResourceCreation { .. })
        ));
    }
}
