//! Builder-level and per-invocation configuration.

use crate::event_bus::{EventBus, EventSink, MemorySink, StdOutSink};
use crate::runtimes::checkpointer::{CheckpointId, CheckpointerType};

/// Default maximum number of super-steps per invocation.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Configuration attached to a compiled graph.
///
/// Controls the checkpoint backend, the recursion limit, worker
/// concurrency, checkpoint namespacing for nested graphs, and the event
/// bus the runner builds.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Checkpoint backend; `None` disables persistence entirely.
    pub checkpointer: Option<CheckpointerType>,
    /// SQLite database file name, when the SQLite backend is selected.
    pub sqlite_db_name: Option<String>,
    /// Namespace prefixed onto thread ids in storage, isolating nested
    /// sub-graph lineages from their parents.
    pub checkpoint_ns: Option<String>,
    /// Maximum super-steps per invocation before the run is failed.
    pub recursion_limit: usize,
    /// Worker limit for concurrent node invocations within one super-step.
    /// Defaults to available parallelism.
    pub worker_limit: Option<usize>,
    /// Event bus construction settings.
    pub event_bus: EventBusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            checkpointer: Some(CheckpointerType::InMemory),
            sqlite_db_name: None,
            checkpoint_ns: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            worker_limit: None,
            event_bus: EventBusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the checkpoint backend (`None` disables persistence).
    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: Option<CheckpointerType>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    /// SQLite database file name. Falls back to `PLAIT_SQLITE_URL` /
    /// `SQLITE_DB_NAME` environment variables (via dotenv) and finally
    /// `plait.db`.
    #[must_use]
    pub fn with_sqlite_db_name(mut self, name: impl Into<String>) -> Self {
        self.sqlite_db_name = Some(name.into());
        self
    }

    /// Namespace for checkpoint isolation of nested graphs.
    #[must_use]
    pub fn with_checkpoint_ns(mut self, ns: impl Into<String>) -> Self {
        self.checkpoint_ns = Some(ns.into());
        self
    }

    /// Maximum super-steps per invocation.
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    /// Worker limit for in-step concurrency.
    #[must_use]
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = Some(limit.max(1));
        self
    }

    /// Replace the event bus configuration.
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }
}

/// Which sinks the runner-owned event bus starts with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

/// Event bus construction settings.
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}

impl EventBusConfig {
    /// Bus that logs to stdout.
    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self {
            sinks: vec![SinkConfig::StdOut],
        }
    }

    /// Bus with no sinks; streaming invocations attach their own.
    #[must_use]
    pub fn silent() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Construct the configured [`EventBus`].
    #[must_use]
    pub fn build_event_bus(&self) -> EventBus {
        let sinks: Vec<Box<dyn EventSink>> = self
            .sinks
            .iter()
            .map(|sink| -> Box<dyn EventSink> {
                match sink {
                    SinkConfig::StdOut => Box::new(StdOutSink),
                    SinkConfig::Memory => Box::new(MemorySink::new()),
                }
            })
            .collect();
        EventBus::with_sinks(sinks)
    }
}

/// Which events a streaming invocation yields per super-step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamMode {
    /// One [`Event::Step`](crate::event_bus::Event::Step) per super-step,
    /// carrying the merged update deltas.
    #[default]
    Updates,
    /// Additionally one
    /// [`Event::Values`](crate::event_bus::Event::Values) carrying the
    /// full merged state after each super-step.
    Values,
}

/// Per-invocation configuration.
///
/// `thread_id` is required to make a run resumable; without one the runner
/// generates a fresh id, so the run persists but nothing will ever look it
/// up again.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    /// Durable lineage to execute against.
    pub thread_id: Option<String>,
    /// Resume value delivered to the thread's pending interrupt.
    pub resume: Option<serde_json::Value>,
    /// Historical checkpoint to continue from (time travel / branching).
    pub checkpoint_id: Option<CheckpointId>,
    /// Override of the configured recursion limit.
    pub recursion_limit: Option<usize>,
    /// Streaming granularity.
    pub stream_mode: StreamMode,
}

impl RunConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a durable thread.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Supply a resume value for the thread's pending interrupt.
    #[must_use]
    pub fn with_resume(mut self, value: serde_json::Value) -> Self {
        self.resume = Some(value);
        self
    }

    /// Continue from a historical checkpoint, branching the thread.
    #[must_use]
    pub fn with_checkpoint_id(mut self, id: CheckpointId) -> Self {
        self.checkpoint_id = Some(id);
        self
    }

    /// Override the recursion limit for this invocation.
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit.max(1));
        self
    }

    /// Select streaming granularity.
    #[must_use]
    pub fn with_stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream_mode = mode;
        self
    }
}
