//! Concurrent execution of one super-step frontier.
//!
//! The scheduler runs every task in the frontier concurrently, bounded by
//! a worker limit, and collects outcomes **in frontier order** so the
//! barrier merge downstream is deterministic regardless of completion
//! timing. Super-steps themselves are strictly sequential: the runner
//! never starts step *N+1* until every invocation of step *N* has
//! completed or failed.
//!
//! Tasks with a stored pending write (from a super-step that suspended on
//! an interrupt) are replayed from the store instead of re-executed.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::event_bus::EventEmitter;
use crate::node::{InterruptSignal, Node, NodeContext, NodeError, NodePartial};
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// One scheduled node invocation: the node plus, for dynamic fan-out
/// tasks, its dispatch payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    /// The node to invoke.
    pub node: NodeKind,
    /// Dispatch payload, when this task came from a dynamic edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TaskInvocation {
    /// Plain invocation of a node (no payload).
    pub fn node(kind: impl Into<NodeKind>) -> Self {
        Self {
            node: kind.into(),
            payload: None,
        }
    }

    /// Invocation produced by a dynamic fan-out packet.
    pub fn dispatch(kind: impl Into<NodeKind>, payload: Value) -> Self {
        Self {
            node: kind.into(),
            payload: Some(payload),
        }
    }
}

/// What happened to one task during the super-step.
#[derive(Clone, Debug)]
pub enum TaskOutcome {
    /// The node finished and returned a partial update.
    Completed(NodePartial),
    /// The node suspended at an interrupt call.
    Interrupted(InterruptSignal),
}

/// All task outcomes of one super-step, in frontier order, plus the
/// virtual entries that were skipped.
#[derive(Debug, Default)]
pub struct SuperstepResult {
    /// `(frontier index, task, outcome)` for every executed task.
    pub outcomes: Vec<(usize, TaskInvocation, TaskOutcome)>,
    /// Virtual `Start`/`End` frontier entries that are never executed.
    pub skipped: Vec<NodeKind>,
}

impl SuperstepResult {
    /// Whether any task suspended on an interrupt.
    #[must_use]
    pub fn has_interrupts(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, _, o)| matches!(o, TaskOutcome::Interrupted(_)))
    }
}

/// Errors raised while executing a super-step.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    /// The frontier referenced a node missing from the registry.
    #[error("frontier references unregistered node `{kind}`")]
    #[diagnostic(
        code(plait::scheduler::unknown_node),
        help("Frontier entries must name registered nodes; this usually \
              indicates a corrupted checkpoint.")
    )]
    UnknownNode { kind: String },

    /// A node invocation failed. The super-step fails as a whole and no
    /// checkpoint is written for it.
    #[error("node `{kind}` failed at step {step}: {source}")]
    #[diagnostic(code(plait::scheduler::node_run))]
    NodeRun {
        kind: String,
        step: u64,
        #[source]
        source: NodeError,
    },

    /// A spawned node task panicked or was cancelled.
    #[error("node task join error: {0}")]
    #[diagnostic(code(plait::scheduler::join))]
    Join(#[from] tokio::task::JoinError),
}

/// Bounded-concurrency executor for super-step frontiers.
#[derive(Clone, Debug)]
pub struct Scheduler {
    concurrency_limit: usize,
}

impl Scheduler {
    /// Scheduler running at most `concurrency_limit` tasks at once.
    #[must_use]
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// Worker limit this scheduler was configured with.
    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Execute every task in `frontier` against `snapshot`.
    ///
    /// - Tasks observe the same immutable snapshot; no task sees another's
    ///   output within the step.
    /// - `pending_writes` (keyed by frontier index) replay stored partials
    ///   for tasks that already completed in a suspended attempt of this
    ///   step.
    /// - `resume_ledger` supplies, per node, the ordered resume values its
    ///   interrupt calls consume by ordinal.
    ///
    /// Fails on the first hard node error (lowest frontier index wins, for
    /// determinism); interrupts are outcomes, not errors.
    #[tracing::instrument(skip_all, fields(step = step, frontier_len = frontier.len()))]
    pub async fn superstep(
        &self,
        nodes: &FxHashMap<NodeKind, Arc<dyn Node>>,
        frontier: &[TaskInvocation],
        snapshot: StateSnapshot,
        step: u64,
        emitter: EventEmitter,
        resume_ledger: &FxHashMap<String, Vec<Value>>,
        pending_writes: &FxHashMap<usize, NodePartial>,
    ) -> Result<SuperstepResult, SchedulerError> {
        let mut result = SuperstepResult::default();
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut handles = Vec::new();

        for (index, task) in frontier.iter().enumerate() {
            if task.node.is_start() || task.node.is_end() {
                result.skipped.push(task.node.clone());
                continue;
            }

            if let Some(stored) = pending_writes.get(&index) {
                tracing::debug!(node = %task.node, index, "replaying pending write");
                result
                    .outcomes
                    .push((index, task.clone(), TaskOutcome::Completed(stored.clone())));
                continue;
            }

            let node_impl = nodes
                .get(&task.node)
                .cloned()
                .ok_or_else(|| SchedulerError::UnknownNode {
                    kind: task.node.to_string(),
                })?;

            let resumes = Arc::new(
                resume_ledger
                    .get(task.node.as_label())
                    .cloned()
                    .unwrap_or_default(),
            );
            let ctx = NodeContext::new(
                task.node.to_string(),
                step,
                task.payload.clone(),
                emitter.clone(),
                resumes,
            );
            let snapshot = snapshot.clone();
            let task_clone = task.clone();
            let permits = Arc::clone(&semaphore);

            handles.push((
                index,
                task_clone,
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire()
                        .await
                        .expect("superstep semaphore never closed");
                    node_impl.run(snapshot, ctx).await
                }),
            ));
        }

        let completions = futures_util::future::join_all(
            handles
                .into_iter()
                .map(|(index, task, handle)| async move { (index, task, handle.await) }),
        )
        .await;

        // Frontier order; spawning preserved it above.
        for (index, task, join_result) in completions {
            match join_result? {
                Ok(partial) => {
                    result
                        .outcomes
                        .push((index, task, TaskOutcome::Completed(partial)));
                }
                Err(NodeError::Interrupted(signal)) => {
                    tracing::info!(node = %task.node, step, "node suspended on interrupt");
                    result
                        .outcomes
                        .push((index, task, TaskOutcome::Interrupted(signal)));
                }
                Err(error) => {
                    return Err(SchedulerError::NodeRun {
                        kind: task.node.to_string(),
                        step,
                        source: error,
                    });
                }
            }
        }

        result.outcomes.sort_by_key(|(index, _, _)| *index);
        Ok(result)
    }
}
