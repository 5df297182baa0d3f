//! Durable checkpoint storage: the [`Checkpointer`] trait, the checkpoint
//! tree data model, and the in-memory reference backend.
//!
//! Checkpoints form a **parent-pointer tree** per thread, not a flat log:
//! every checkpoint records the id of the checkpoint it grew out of, so
//! resuming from a historical checkpoint creates a new branch while the
//! original successor chain stays retrievable. Checkpoints are append-only;
//! replaying or branching never deletes one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::node::NodePartial;
use crate::scheduler::TaskInvocation;

/// Totally ordered checkpoint identifier, stable across processes.
///
/// Encodes `"{millis:013}-{seq:06}"`: zero-padded so lexicographic order
/// equals creation order within a thread, making `list` history
/// reproducible.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Compose an id from a millisecond timestamp and sequence number.
    #[must_use]
    pub fn from_parts(millis: u64, seq: u64) -> Self {
        Self(format!("{millis:013}-{seq:06}"))
    }

    /// Wrap an already-encoded id (e.g. read back from storage).
    #[must_use]
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The encoded string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A suspended interrupt awaiting an external resume value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterruptRecord {
    /// Label of the suspended node.
    pub node: String,
    /// Ordinal position of the interrupt call within the node's execution.
    pub ordinal: usize,
    /// Payload surfaced to the external caller.
    pub payload: Value,
}

/// Interrupt bookkeeping persisted alongside a checkpoint.
///
/// `resume_ledger` holds, per node, the resume values already supplied to
/// it, in interrupt-call order. When a node re-runs after a resume, its
/// interrupt calls consume the ledger by ordinal, so calls answered in
/// earlier rounds return their value instead of re-suspending.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptState {
    /// Interrupts currently awaiting a resume value.
    #[serde(default)]
    pub pending: Vec<InterruptRecord>,
    /// node label → resume values consumed by that node's interrupt calls.
    #[serde(default)]
    pub resume_ledger: FxHashMap<String, Vec<Value>>,
}

impl InterruptState {
    /// Whether any interrupt is awaiting a resume.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// A partial update produced by a task that completed inside a super-step
/// which later suspended; replayed (not re-executed) on resume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingWrite {
    /// Index of the task within the persisted frontier.
    pub task_index: usize,
    /// The completed task's partial update.
    pub partial: NodePartial,
}

/// Immutable snapshot of a thread at one point in its execution.
///
/// Contains everything needed to resume: merged state values and versions,
/// the frontier scheduled to run next, unconsumed pending writes from a
/// partially completed super-step, and interrupt bookkeeping.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// Owning thread.
    pub thread_id: String,
    /// This checkpoint's id; unique and totally ordered within the thread.
    pub id: CheckpointId,
    /// The checkpoint this one grew out of (`None` for the root).
    pub parent_id: Option<CheckpointId>,
    /// Super-step index at which the snapshot was taken.
    pub step: u64,
    /// State field values at snapshot time.
    pub state_values: FxHashMap<String, Value>,
    /// State field versions at snapshot time.
    pub state_versions: FxHashMap<String, u32>,
    /// Tasks scheduled to run next.
    pub frontier: Vec<TaskInvocation>,
    /// Completed-task updates from a suspended super-step.
    pub pending_writes: Vec<PendingWrite>,
    /// Pending interrupts and the resume ledger.
    pub interrupts: InterruptState,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Lightweight history entry returned by [`Checkpointer::list`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub id: CheckpointId,
    pub parent_id: Option<CheckpointId>,
    pub step: u64,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Metadata view of this checkpoint.
    #[must_use]
    pub fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            step: self.step,
            created_at: self.created_at,
        }
    }
}

/// Errors surfaced by checkpoint backends.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    /// The requested checkpoint does not exist.
    #[error("checkpoint `{checkpoint_id}` not found for thread `{thread_id}`")]
    #[diagnostic(
        code(plait::checkpointer::not_found),
        help("List the thread's history to discover valid checkpoint ids.")
    )]
    NotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    /// Storage backend failure (connection, IO, SQL).
    #[error("checkpointer backend error: {message}")]
    #[diagnostic(code(plait::checkpointer::backend))]
    Backend { message: String },

    /// Persisted payload could not be (de)serialized.
    #[error("checkpoint serialization error: {message}")]
    #[diagnostic(code(plait::checkpointer::serde))]
    Serde { message: String },
}

/// Convenience alias for checkpointer results.
pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Pluggable durable storage for checkpoint trees.
///
/// Implementations must serialize writes per thread (checkpoint writes for
/// one `thread_id` are never concurrent); different threads are fully
/// independent.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Append a checkpoint to its thread's tree.
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Fetch a checkpoint: a specific one when `checkpoint_id` is given,
    /// otherwise the latest (max id) for the thread. `Ok(None)` only when
    /// the thread has no checkpoints at all and no id was requested.
    async fn get(
        &self,
        thread_id: &str,
        checkpoint_id: Option<&CheckpointId>,
    ) -> Result<Option<Checkpoint>>;

    /// Ordered history (ascending id) of a thread's checkpoints.
    async fn list(&self, thread_id: &str) -> Result<Vec<CheckpointMeta>>;

    /// All thread ids known to this backend.
    async fn list_threads(&self) -> Result<Vec<String>>;
}

/// Which checkpoint backend the runner should construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointerType {
    /// Volatile storage for tests and development.
    InMemory,
    /// Durable SQLite-backed persistence.
    #[cfg(feature = "sqlite")]
    SQLite,
}

/// Volatile checkpoint store for testing and development.
///
/// Keeps every checkpoint of every thread in memory, append-only. Writes
/// for a thread are serialized by the store-wide lock.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    threads: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut threads = self.threads.write();
        threads
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn get(
        &self,
        thread_id: &str,
        checkpoint_id: Option<&CheckpointId>,
    ) -> Result<Option<Checkpoint>> {
        let threads = self.threads.read();
        let Some(history) = threads.get(thread_id) else {
            return match checkpoint_id {
                Some(id) => Err(CheckpointerError::NotFound {
                    thread_id: thread_id.to_string(),
                    checkpoint_id: id.to_string(),
                }),
                None => Ok(None),
            };
        };
        match checkpoint_id {
            Some(id) => history
                .iter()
                .find(|cp| &cp.id == id)
                .cloned()
                .map(Some)
                .ok_or_else(|| CheckpointerError::NotFound {
                    thread_id: thread_id.to_string(),
                    checkpoint_id: id.to_string(),
                }),
            None => Ok(history.iter().max_by(|a, b| a.id.cmp(&b.id)).cloned()),
        }
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<CheckpointMeta>> {
        let threads = self.threads.read();
        let mut metas: Vec<CheckpointMeta> = threads
            .get(thread_id)
            .map(|history| history.iter().map(Checkpoint::meta).collect())
            .unwrap_or_default();
        metas.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(metas)
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let threads = self.threads.read();
        let mut ids: Vec<String> = threads.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
