//! GraphBuilder: fluent construction of workflow graphs.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::edges::{ConditionalEdge, DispatchRouter, DynamicEdge, Edge, EdgeRouter};
use crate::node::Node;
use crate::runtimes::RuntimeConfig;
use crate::state::StateSchema;
use crate::types::NodeKind;

/// Builder for workflow graphs.
///
/// Collects the state schema, node registry, and edge table before
/// [`compile`](Self::compile) validates everything and produces an
/// executable [`App`](crate::app::App).
///
/// # Required configuration
///
/// - A state schema (defaults to empty — fine for graphs whose nodes only
///   route)
/// - At least one edge from the virtual `NodeKind::Start`
/// - At least one statically known path to `NodeKind::End`
///
/// `Start` and `End` are virtual endpoints: never register them with
/// [`add_node`](Self::add_node).
///
/// # Examples
///
/// ```rust
/// use plait::graphs::GraphBuilder;
/// use plait::node::{FnNode, NodePartial};
/// use plait::reducers::ReducerSpec;
/// use plait::state::StateSchema;
/// use plait::types::NodeKind;
/// use serde_json::json;
///
/// let app = GraphBuilder::new()
///     .with_schema(
///         StateSchema::builder()
///             .field("count", ReducerSpec::Sum)
///             .build(),
///     )
///     .add_node("tally", FnNode::new(|_s, _c| async move {
///         Ok(NodePartial::new().with_value("count", json!(1)))
///     }))
///     .add_edge(NodeKind::Start, "tally")
///     .add_edge("tally", NodeKind::End)
///     .compile()
///     .unwrap();
/// # let _ = app;
/// ```
pub struct GraphBuilder {
    /// State schema frozen at compile time.
    pub schema: StateSchema,
    /// Registry of all nodes in the graph, keyed by their identifier.
    pub nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    /// Outgoing edges per node.
    pub edges: FxHashMap<NodeKind, Vec<Edge>>,
    /// Runtime configuration for the compiled application.
    pub runtime_config: RuntimeConfig,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates a new, empty graph builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema: StateSchema::default(),
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Sets the state schema. Once the graph compiles, the field set and
    /// reducer assignment are immutable for the life of the graph.
    #[must_use]
    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Registers a node implementation under the given identifier.
    ///
    /// `Start` and `End` are virtual: attempts to register them are
    /// ignored with a warning.
    #[must_use]
    pub fn add_node(mut self, id: impl Into<NodeKind>, node: impl Node + 'static) -> Self {
        let id = id.into();
        match id {
            NodeKind::Start | NodeKind::End => {
                tracing::warn!(
                    ?id,
                    "ignoring registration of virtual node kind (Start/End are virtual)"
                );
            }
            _ => {
                self.nodes.insert(id, Arc::new(node));
            }
        }
        self
    }

    /// Adds an unconditional edge between two nodes.
    ///
    /// Multiple edges from one node fan out; multiple edges into one node
    /// fan in.
    #[must_use]
    pub fn add_edge(mut self, from: impl Into<NodeKind>, to: impl Into<NodeKind>) -> Self {
        self.edges
            .entry(from.into())
            .or_default()
            .push(Edge::Direct(to.into()));
        self
    }

    /// Adds a conditional edge.
    ///
    /// `router` is evaluated once per super-step for each node that
    /// reached it and returns target labels; `targets` declares the set of
    /// labels it may legally return, which the compiler validates against
    /// the node registry.
    #[must_use]
    pub fn add_conditional_edge<I, T>(
        mut self,
        from: impl Into<NodeKind>,
        router: EdgeRouter,
        targets: I,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeKind>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        self.edges
            .entry(from.into())
            .or_default()
            .push(Edge::Conditional(ConditionalEdge::new(router, targets)));
        self
    }

    /// Adds a dynamic fan-out edge.
    ///
    /// `router` emits destination/payload packets at runtime; each packet
    /// becomes an independent parallel invocation in the next super-step.
    /// Destinations are resolved at runtime and therefore exempt from
    /// compile-time target validation.
    #[must_use]
    pub fn add_dynamic_edge(mut self, from: impl Into<NodeKind>, router: DispatchRouter) -> Self {
        self.edges
            .entry(from.into())
            .or_default()
            .push(Edge::Dynamic(DynamicEdge::new(router)));
        self
    }

    /// Configures runtime settings for the compiled application.
    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }
}
