use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scope label of the diagnostic event emitted when a run's event stream is
/// finished; consumers can use it to stop draining a channel.
pub const STREAM_END_SCOPE: &str = "__plait_stream_end__";

/// An observable occurrence during workflow execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    /// Message emitted by node code through its context.
    Node(NodeEvent),
    /// One super-step completed: which nodes ran and what changed.
    Step(StepEvent),
    /// Full merged state after a super-step (values stream mode only).
    Values(ValuesEvent),
    /// Engine-level diagnostic message.
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// Node-scoped message carrying node identity and step number.
    pub fn node_message_with_meta(
        node_id: impl Into<String>,
        step: u64,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Node(NodeEvent {
            node_id: Some(node_id.into()),
            step: Some(step),
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// Engine diagnostic with a scope label.
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// The scope label, when the variant carries one.
    #[must_use]
    pub fn scope_label(&self) -> Option<&str> {
        match self {
            Event::Node(e) => Some(&e.scope),
            Event::Diagnostic(e) => Some(&e.scope),
            Event::Step(_) | Event::Values(_) => None,
        }
    }

    /// The step number, when the variant carries one.
    #[must_use]
    pub fn step(&self) -> Option<u64> {
        match self {
            Event::Node(e) => e.step,
            Event::Step(e) => Some(e.step),
            Event::Values(e) => Some(e.step),
            Event::Diagnostic(_) => None,
        }
    }
}

/// Message emitted from inside a node invocation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeEvent {
    /// Identifier of the emitting node, when known.
    pub node_id: Option<String>,
    /// Step during which the message was emitted.
    pub step: Option<u64>,
    /// Free-form scope label (e.g. `"validation"`).
    pub scope: String,
    /// Human-readable message.
    pub message: String,
}

/// Summary of one completed super-step.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepEvent {
    /// The step number that completed.
    pub step: u64,
    /// Nodes that executed during the step, in frontier order.
    pub ran_nodes: Vec<String>,
    /// Fields whose content changed at the barrier.
    pub updated_fields: Vec<String>,
    /// Post-merge values of the updated fields.
    pub updates: FxHashMap<String, Value>,
}

/// Full merged state after a super-step.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValuesEvent {
    /// The step number that completed.
    pub step: u64,
    /// Every state field's value after the barrier.
    pub values: FxHashMap<String, Value>,
}

/// Engine-level diagnostic message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// Scope label (e.g. [`STREAM_END_SCOPE`]).
    pub scope: String,
    /// Human-readable message.
    pub message: String,
}
