//! Core identifier types for the plait workflow engine.
//!
//! This module defines [`NodeKind`], the stable string-keyed identifier for
//! nodes in a workflow graph. Graph topology is keyed by these identifiers
//! rather than by function references, which keeps cycle detection, routing,
//! and persistence simple graph-theoretic operations.
//!
//! For runtime execution types (thread ids, step numbers), see
//! [`crate::runtimes::types`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// `NodeKind` serves as a unique identifier for nodes in the workflow
/// execution graph. The virtual `Start` and `End` variants mark graph
/// boundaries and are never executed; all real work happens in `Custom`
/// nodes.
///
/// # Persistence
///
/// `NodeKind` supports serialization for checkpointing through both serde
/// and the [`encode`](Self::encode)/[`decode`](Self::decode) methods.
///
/// # Examples
///
/// ```rust
/// use plait::types::NodeKind;
///
/// let start = NodeKind::Start;
/// let worker = NodeKind::Custom("worker".to_string());
///
/// let encoded = worker.encode();
/// assert_eq!(encoded, "Custom:worker");
/// assert_eq!(NodeKind::decode(&encoded), worker);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point. Has no implementation and no incoming edges;
    /// edges leaving `Start` define the initial frontier.
    Start,

    /// Virtual exit point. Has no implementation and no outgoing edges;
    /// a frontier containing only `End` terminates the run.
    End,

    /// Application node identified by a user-defined string, unique within
    /// the graph.
    Custom(String),
}

impl NodeKind {
    /// Encode a NodeKind into its persisted string form.
    ///
    /// - `Start` → `"Start"`
    /// - `End` → `"End"`
    /// - `Custom("X")` → `"Custom:X"`
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Decode a persisted string form back into a NodeKind.
    ///
    /// Unrecognized formats fall back to `Custom(s)` for forward
    /// compatibility.
    pub fn decode(s: &str) -> Self {
        if s == "Start" {
            NodeKind::Start
        } else if s == "End" {
            NodeKind::End
        } else if let Some(rest) = s.strip_prefix("Custom:") {
            NodeKind::Custom(rest.to_string())
        } else {
            NodeKind::Custom(s.to_string())
        }
    }

    /// Returns `true` if this is the virtual [`Start`](Self::Start) node.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Returns `true` if this is the virtual [`End`](Self::End) node.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns `true` if this is an application node.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// The routing label for this node, as returned by conditional edge
    /// routers: `"Start"`, `"End"`, or the custom name.
    #[must_use]
    pub fn as_label(&self) -> &str {
        match self {
            Self::Start => "Start",
            Self::End => "End",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

// Developer experience: allow string literals where a NodeKind is expected.
impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        NodeKind::from(s.as_str())
    }
}
