//! Identifier generation for runs and checkpoints.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::runtimes::CheckpointId;

/// Generates run identifiers and totally ordered checkpoint identifiers.
///
/// Checkpoint ids combine the wall-clock millisecond timestamp with a
/// per-process sequence counter, zero-padded so lexicographic order equals
/// creation order within a thread — stable across processes as long as
/// clocks move forward between writer handoffs.
#[derive(Debug, Default)]
pub struct IdGenerator {
    sequence: AtomicU64,
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Random identifier for an anonymous run/thread.
    #[must_use]
    pub fn generate_run_id(&self) -> String {
        format!("run-{}", uuid::Uuid::new_v4().simple())
    }

    /// Next checkpoint id: `"{millis:013}-{seq:06}"`.
    #[must_use]
    pub fn next_checkpoint_id(&self) -> CheckpointId {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        CheckpointId::from_parts(millis, seq)
    }
}
