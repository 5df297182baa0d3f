/*!
Persistence primitives for serializing/deserializing checkpoints (used by
the SQLite backend and any future durable backends).

Design goals:
- Explicit serde-friendly structs decoupled from in-memory representations,
  so the storage format stays stable as internals evolve.
- Conversion logic localized in `From`/`TryFrom` impls, keeping backend
  code lean and declarative.
- Forward compatibility: unknown optional fields default.

This module performs no I/O; it is pure data transformation glue.
*/

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::runtimes::checkpointer::{
    Checkpoint, CheckpointId, InterruptState, PendingWrite,
};
use crate::scheduler::TaskInvocation;

/// One persisted state field: value plus version counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedField {
    pub value: Value,
    pub version: u32,
}

/// Storage-facing checkpoint record. This shape is the durability
/// contract; renaming fields is a breaking change for existing databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCheckpoint {
    pub thread_id: String,
    pub checkpoint_id: String,
    #[serde(default)]
    pub parent_checkpoint_id: Option<String>,
    pub step_index: u64,
    /// field name → value + version.
    pub state: FxHashMap<String, PersistedField>,
    /// Tasks scheduled to run next (node + optional dispatch payload).
    pub next_nodes: Vec<TaskInvocation>,
    /// Completed-task updates from a suspended super-step.
    #[serde(default)]
    pub pending_writes: Vec<PendingWrite>,
    /// Pending interrupts plus the resume ledger.
    #[serde(default)]
    pub pending_interrupts: InterruptState,
    /// RFC3339 creation time (keeps `chrono` types out of the stored shape).
    pub created_at: String,
}

/// Conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(plait::persistence::serde),
        help("Ensure the stored JSON matches the PersistedCheckpoint shape.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        let state = cp
            .state_values
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    PersistedField {
                        value: value.clone(),
                        version: cp.state_versions.get(name).copied().unwrap_or(1),
                    },
                )
            })
            .collect();
        PersistedCheckpoint {
            thread_id: cp.thread_id.clone(),
            checkpoint_id: cp.id.to_string(),
            parent_checkpoint_id: cp.parent_id.as_ref().map(ToString::to_string),
            step_index: cp.step,
            state,
            next_nodes: cp.frontier.clone(),
            pending_writes: cp.pending_writes.clone(),
            pending_interrupts: cp.interrupts.clone(),
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        let mut state_values = FxHashMap::default();
        let mut state_versions = FxHashMap::default();
        for (name, field) in p.state {
            state_values.insert(name.clone(), field.value);
            state_versions.insert(name, field.version);
        }
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Checkpoint {
            thread_id: p.thread_id,
            id: CheckpointId::from_string(p.checkpoint_id),
            parent_id: p.parent_checkpoint_id.map(CheckpointId::from_string),
            step: p.step_index,
            state_values,
            state_versions,
            frontier: p.next_nodes,
            pending_writes: p.pending_writes,
            interrupts: p.pending_interrupts,
            created_at,
        }
    }
}

/// Serialize a checkpoint into its stable JSON string form.
pub fn to_json_string(checkpoint: &Checkpoint) -> Result<String> {
    serde_json::to_string(&PersistedCheckpoint::from(checkpoint))
        .map_err(|source| PersistenceError::Serde { source })
}

/// Deserialize a checkpoint from its stable JSON string form.
pub fn from_json_str(raw: &str) -> Result<Checkpoint> {
    serde_json::from_str::<PersistedCheckpoint>(raw)
        .map(Checkpoint::from)
        .map_err(|source| PersistenceError::Serde { source })
}
