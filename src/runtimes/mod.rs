//! Workflow runtime infrastructure: thread management, checkpointing, and
//! resumable execution.
//!
//! # Architecture
//!
//! - **[`AppRunner`]** — the super-step engine driving stepwise execution
//! - **[`Checkpointer`]** — pluggable durable storage for checkpoint trees
//! - **[`ThreadState`]** — in-memory execution state of one thread
//! - **Persistence models** — serde shapes for the stable storage format
//!
//! # Backends
//!
//! - **[`InMemoryCheckpointer`]** — volatile storage for tests and
//!   development
//! - **[`SQLiteCheckpointer`]** — durable SQLite persistence (`sqlite`
//!   feature)
//!
//! # Example
//!
//! ```rust,no_run
//! use plait::runtimes::{AppRunner, CheckpointerType};
//! use plait::utils::collections::new_update_map;
//! # use plait::app::App;
//! # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
//! let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
//! runner.create_thread("thread-1".into(), new_update_map()).await?;
//! let outcome = runner.run_until_complete("thread-1", 25).await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod checkpointer;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod persistence;
pub mod runner;
pub mod runtime_config;
pub mod types;

pub use checkpointer::{
    Checkpoint, CheckpointId, CheckpointMeta, Checkpointer, CheckpointerError, CheckpointerType,
    InMemoryCheckpointer, InterruptRecord, InterruptState, PendingWrite,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SQLiteCheckpointer;
pub use persistence::{PersistedCheckpoint, PersistedField, PersistenceError};
pub use runner::{
    AppRunner, RunOutcome, RunnerError, StepOutcome, StepReport, ThreadInit, ThreadState,
};
pub use runtime_config::{
    EventBusConfig, RunConfig, RuntimeConfig, SinkConfig, StreamMode, DEFAULT_RECURSION_LIMIT,
};
pub use types::{StepNumber, ThreadId};
