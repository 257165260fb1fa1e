//! Node identity and launch kinds.

use std::fmt;

/// The public identity of a node inside a graph: a name plus an array slot.
///
/// Nodes that share a name but differ in index form a node array. Outputs
/// always address index 0 of their target name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    /// Node name, as referenced by output directives.
    pub name: String,
    /// Array slot within the name.
    pub index: u32,
}

impl NodeId {
    /// Creates a node identity from a name and array index.
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.index)
    }
}

/// How a node is launched for the records it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLaunch {
    /// One compute invocation per input record.
    Thread,
    /// One draw instance per input record, rasterized through a generic program.
    Mesh,
}

impl NodeLaunch {
    /// Returns the keyword used by node directives for this launch kind.
    pub fn keyword(self) -> &'static str {
        match self {
            NodeLaunch::Thread => "thread",
            NodeLaunch::Mesh => "mesh",
        }
    }

    /// Parses a directive keyword back into a launch kind.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        [NodeLaunch::Thread, NodeLaunch::Mesh]
            .into_iter()
            .find(|launch| launch.keyword() == keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::new("TriangleMeshNode", 0).to_string(), "TriangleMeshNode[0]");
    }

    #[test]
    fn launch_keywords() {
        assert_eq!(NodeLaunch::from_keyword("thread"), Some(NodeLaunch::Thread));
        assert_eq!(NodeLaunch::from_keyword(NodeLaunch::Mesh.keyword()), Some(NodeLaunch::Mesh));
        assert_eq!(NodeLaunch::from_keyword("broadcasting"), None);
    }

    #[test]
    fn node_ids_order_by_name_then_index() {
        let mut ids = vec![
            NodeId::new("b", 0),
            NodeId::new("a", 2),
            NodeId::new("a", 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![NodeId::new("a", 1), NodeId::new("a", 2), NodeId::new("b", 0)]
        );
    }
}
