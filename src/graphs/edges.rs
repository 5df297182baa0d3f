//! Edge types and routing functions for graph flow.
//!
//! Edges are modelled as a tagged union rather than a trait hierarchy so
//! the compiler's validation logic stays exhaustive and easy to test:
//!
//! - [`Edge::Direct`] — unconditional node→node routing
//! - [`Edge::Conditional`] — a router picks among declared target labels
//! - [`Edge::Dynamic`] — a router emits zero or more [`Dispatch`] packets,
//!   each becoming an independent parallel invocation in the next
//!   super-step

use serde_json::Value;
use std::sync::Arc;

use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Routing function for conditional edges.
///
/// Evaluated once per super-step for each node that reached the edge;
/// returns one or more target labels (`"End"`, `"Start"`, or custom node
/// names). Labels outside the edge's declared target set are skipped with
/// a warning at runtime.
///
/// # Examples
///
/// ```rust
/// use plait::graphs::EdgeRouter;
/// use std::sync::Arc;
///
/// let route: EdgeRouter = Arc::new(|snapshot| {
///     if snapshot.get("approved").and_then(|v| v.as_bool()).unwrap_or(false) {
///         vec!["deploy".to_string()]
///     } else {
///         vec!["End".to_string()]
///     }
/// });
/// # let _ = route;
/// ```
pub type EdgeRouter = Arc<dyn Fn(&StateSnapshot) -> Vec<String> + Send + Sync + 'static>;

/// Routing function for dynamic fan-out edges.
///
/// Returns any number of destination/payload packets; cardinality is
/// resolved at runtime, enabling patterns like "one worker per planned
/// section".
pub type DispatchRouter = Arc<dyn Fn(&StateSnapshot) -> Vec<Dispatch> + Send + Sync + 'static>;

/// A destination/payload pair emitted by a dynamic edge.
///
/// Each packet becomes its own task in the next super-step; packets are
/// never deduplicated, so `k` packets produce exactly `k` invocations.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    /// Target node to invoke.
    pub to: NodeKind,
    /// Payload handed to the invocation via
    /// [`NodeContext::payload`](crate::node::NodeContext::payload).
    pub payload: Value,
}

impl Dispatch {
    pub fn new(to: impl Into<NodeKind>, payload: Value) -> Self {
        Self {
            to: to.into(),
            payload,
        }
    }
}

/// One outgoing routing rule of a node.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional edge to a fixed target.
    Direct(NodeKind),
    /// State-dependent routing among a declared set of targets.
    Conditional(ConditionalEdge),
    /// Runtime fan-out into destination/payload packets.
    Dynamic(DynamicEdge),
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional(ce) => f
                .debug_struct("Conditional")
                .field("targets", &ce.targets)
                .finish(),
            Edge::Dynamic(_) => f.debug_struct("Dynamic").finish(),
        }
    }
}

/// A conditional edge: router plus its declared target set.
///
/// The declared set is what the compiler validates; the router may only
/// route within it.
#[derive(Clone)]
pub struct ConditionalEdge {
    router: EdgeRouter,
    targets: Vec<NodeKind>,
}

impl ConditionalEdge {
    pub fn new(router: EdgeRouter, targets: Vec<NodeKind>) -> Self {
        Self { router, targets }
    }

    /// The routing function.
    #[must_use]
    pub fn router(&self) -> &EdgeRouter {
        &self.router
    }

    /// The declared target set.
    #[must_use]
    pub fn targets(&self) -> &[NodeKind] {
        &self.targets
    }

    /// Whether `label` resolves to a declared target.
    #[must_use]
    pub fn declares_label(&self, label: &str) -> bool {
        self.targets.iter().any(|t| t.as_label() == label)
    }
}

/// A dynamic fan-out edge.
#[derive(Clone)]
pub struct DynamicEdge {
    router: DispatchRouter,
}

impl DynamicEdge {
    pub fn new(router: DispatchRouter) -> Self {
        Self { router }
    }

    /// The fan-out routing function.
    #[must_use]
    pub fn router(&self) -> &DispatchRouter {
        &self.router
    }
}
