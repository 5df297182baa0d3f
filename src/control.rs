//! Control-flow primitives emitted by nodes to influence subsequent
//! scheduling.
//!
//! Frontier commands are kept separate from state updates so nodes can
//! express routing intent without mutating application state directly. The
//! barrier aggregates these directives in a deterministic order and the
//! runner reconciles them with the graph's static and conditional edges.

use serde::{Deserialize, Serialize};

use crate::types::NodeKind;

/// Route identifier used by frontier commands.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRoute {
    /// Route to another node in the graph.
    Node(NodeKind),
}

impl NodeRoute {
    /// Return the concrete `NodeKind` for this route.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        match self {
            NodeRoute::Node(kind) => kind,
        }
    }

    /// Clone the underlying `NodeKind`.
    #[must_use]
    pub fn to_node_kind(&self) -> NodeKind {
        self.kind().clone()
    }
}

impl From<NodeKind> for NodeRoute {
    fn from(kind: NodeKind) -> Self {
        NodeRoute::Node(kind)
    }
}

impl From<&str> for NodeRoute {
    fn from(name: &str) -> Self {
        NodeRoute::Node(NodeKind::from(name))
    }
}

/// Command emitted by a node to manipulate the next frontier.
///
/// `Replace` overrides every route the node's static and conditional edges
/// would have produced; `Append` adds routes on top of them. At most one
/// `Replace` per node is honored per super-step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrontierCommand {
    /// Append additional routes to the node's computed routes.
    Append(Vec<NodeRoute>),
    /// Replace the node's computed routes entirely.
    Replace(Vec<NodeRoute>),
}
