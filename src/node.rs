//! Node execution framework: the [`Node`] trait, execution context, partial
//! state updates, and error handling.
//!
//! A node is a named, replay-safe unit of work. It receives an immutable
//! [`StateSnapshot`] plus a [`NodeContext`] and returns a [`NodePartial`]
//! describing the state fields it wants to update and, optionally, a
//! routing command. Nodes never mutate shared state directly; the executor
//! merges partials through the per-field reducers at the barrier.
//!
//! # Interrupts
//!
//! A node may pause the whole run by calling
//! [`NodeContext::interrupt`]. On first execution the call suspends the
//! node and surfaces the payload to the external caller; when the thread is
//! later resumed with a value, the node function re-runs from its start and
//! the same call site returns the supplied value instead of suspending.
//! Code before the interrupt call executes again on every resume, so it
//! must be side-effect free or idempotent.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::control::FrontierCommand;
use crate::event_bus::{Event, EventEmitter};
use crate::state::StateSnapshot;

/// Update map produced by a node: state field name → update value.
pub type UpdateMap = FxHashMap<String, Value>;

/// Core trait defining executable workflow nodes.
///
/// # Design principles
///
/// - **Replay-safe**: a node may run more than once for the same step
///   (interrupt resume re-executes it); observable effects must tolerate
///   that.
/// - **Focused**: one node, one responsibility.
/// - **Observable**: use [`NodeContext::emit`] for progress events instead
///   of printing.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use plait::node::{Node, NodeContext, NodeError, NodePartial};
/// use plait::state::StateSnapshot;
/// use serde_json::json;
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Node for Greeter {
///     async fn run(
///         &self,
///         snapshot: StateSnapshot,
///         ctx: NodeContext,
///     ) -> Result<NodePartial, NodeError> {
///         let topic = snapshot.get("topic").cloned().unwrap_or(json!("world"));
///         ctx.emit("greeting", "composing")?;
///         Ok(NodePartial::new().with_value("answer", json!(format!("hello, {topic}"))))
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node against a state snapshot.
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError>;
}

/// Adapter turning an async closure into a [`Node`].
///
/// ```rust
/// use plait::node::{FnNode, NodePartial};
/// use serde_json::json;
///
/// let node = FnNode::new(|_snapshot, _ctx| async move {
///     Ok(NodePartial::new().with_value("count", json!(1)))
/// });
/// # let _ = node;
/// ```
pub struct FnNode<F> {
    func: F,
}

impl<F, Fut> FnNode<F>
where
    F: Fn(StateSnapshot, NodeContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<NodePartial, NodeError>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Node for FnNode<F>
where
    F: Fn(StateSnapshot, NodeContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<NodePartial, NodeError>> + Send,
{
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError> {
        (self.func)(snapshot, ctx).await
    }
}

/// Execution context passed to a node invocation.
///
/// Carries the node's identity, the current step, the dynamic fan-out
/// payload (when the invocation was produced by a dispatch edge), the event
/// emitter, and the interrupt/resume machinery.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Identifier of this node within the graph.
    pub node_id: String,
    /// Current super-step number.
    pub step: u64,
    payload: Option<Value>,
    emitter: EventEmitter,
    resumes: Arc<Vec<Value>>,
    interrupt_seq: Arc<AtomicUsize>,
}

impl NodeContext {
    pub(crate) fn new(
        node_id: String,
        step: u64,
        payload: Option<Value>,
        emitter: EventEmitter,
        resumes: Arc<Vec<Value>>,
    ) -> Self {
        Self {
            node_id,
            step,
            payload,
            emitter,
            resumes,
            interrupt_seq: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The payload attached by the dispatch edge that produced this
    /// invocation, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Emit a node-scoped event enriched with this context's metadata.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.emitter
            .emit(Event::node_message_with_meta(
                self.node_id.clone(),
                self.step,
                scope,
                message,
            ))
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }

    /// Suspend the run and surface `payload` to the external caller.
    ///
    /// On the first execution this returns an error that the node must
    /// propagate (use `?`); the executor captures it, persists a
    /// checkpoint, and reports the payload. When the thread is resumed
    /// with a value, the node re-runs and the same call — identified by
    /// its ordinal position within the node's execution — returns that
    /// value instead of suspending.
    ///
    /// ```rust,no_run
    /// # use plait::node::{NodeContext, NodeError};
    /// # use serde_json::{json, Value};
    /// # async fn inside_a_node(ctx: &NodeContext) -> Result<(), NodeError> {
    /// let approval: Value = ctx.interrupt(json!({"q": "deploy to prod?"}))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn interrupt(&self, payload: impl Into<Value>) -> Result<Value, NodeError> {
        let ordinal = self.interrupt_seq.fetch_add(1, Ordering::SeqCst);
        if let Some(answer) = self.resumes.get(ordinal) {
            return Ok(answer.clone());
        }
        Err(NodeError::Interrupted(InterruptSignal {
            payload: payload.into(),
            ordinal,
        }))
    }
}

/// Suspension raised by [`NodeContext::interrupt`].
///
/// Not a failure: the executor intercepts it, persists the pending state,
/// and reports the payload to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterruptSignal {
    /// Payload surfaced to the external caller.
    pub payload: Value,
    /// Ordinal position of the interrupt call within the node's execution.
    pub ordinal: usize,
}

/// Partial state update returned by node execution.
///
/// All parts are optional; a node updates only the fields it cares about.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodePartial {
    /// State field updates, merged through each field's reducer.
    pub update: Option<UpdateMap>,
    /// Routing command overriding or extending the node's static edges.
    pub route: Option<FrontierCommand>,
}

impl NodePartial {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole update map.
    #[must_use]
    pub fn with_update(mut self, update: UpdateMap) -> Self {
        self.update = Some(update);
        self
    }

    /// Insert a single field update.
    #[must_use]
    pub fn with_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.update
            .get_or_insert_with(UpdateMap::default)
            .insert(field.into(), value);
        self
    }

    /// Attach a frontier command.
    #[must_use]
    pub fn with_route(mut self, route: FrontierCommand) -> Self {
        self.route = Some(route);
        self
    }
}

/// Errors that can occur when using NodeContext methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    /// Event could not be sent because the bus is disconnected.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(plait::node::event_bus_unavailable),
        help("The event bus may be disconnected. Check the runner lifecycle.")
    )]
    EventBusUnavailable,
}

/// Errors that can occur during node execution.
///
/// Everything except [`Interrupted`](Self::Interrupted) is fatal for the
/// super-step: no checkpoint is written for the failed step and the run is
/// resumable from the last successful checkpoint.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(plait::node::missing_input),
        help("Check that an upstream node produced the required field.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(plait::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(plait::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(plait::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// Event bus communication error.
    #[error("event bus error: {0}")]
    #[diagnostic(code(plait::node::event_bus))]
    EventBus(#[from] NodeContextError),

    /// The node suspended awaiting external input. Control flow, not a
    /// failure; intercepted by the executor.
    #[error("node suspended awaiting external input")]
    #[diagnostic(code(plait::node::interrupted))]
    Interrupted(InterruptSignal),
}
