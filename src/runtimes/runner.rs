//! The super-step engine: session management, barrier coordination,
//! checkpoint writes, interrupt/resume, and time travel.
//!
//! [`AppRunner`] wraps a compiled [`App`] and drives it one super-step at a
//! time. Each super-step executes the current frontier concurrently, folds
//! the results through the reducers at the barrier, evaluates outgoing
//! edges to produce the next frontier, and persists exactly one new
//! checkpoint parented to the previous one. Super-steps are strictly
//! sequential per thread; different threads are fully independent.
//!
//! # Suspension
//!
//! When any task suspends on an interrupt, the attempted step is not
//! committed: completed sibling partials are stored as pending writes, the
//! pending interrupts are recorded, and a checkpoint with the *unchanged*
//! frontier is persisted. Resuming replays the pending writes and re-runs
//! only the interrupted tasks.
//!
//! # Failure
//!
//! A hard node error fails the super-step as a whole; no checkpoint is
//! written for it and the last durable checkpoint remains the resumable
//! state. The same applies to a caller aborting a streaming invocation
//! mid-step: partial work is discarded, never half-written.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::app::App;
use crate::event_bus::{Event, EventBus, StepEvent, ValuesEvent};
use crate::node::NodePartial;
use crate::runtimes::checkpointer::{
    Checkpoint, CheckpointId, CheckpointMeta, Checkpointer, CheckpointerError, CheckpointerType,
    InMemoryCheckpointer, InterruptRecord, InterruptState, PendingWrite,
};
use crate::runtimes::runtime_config::StreamMode;
use crate::scheduler::{Scheduler, SchedulerError, TaskInvocation, TaskOutcome};
use crate::state::VersionedState;
use crate::types::NodeKind;
use crate::utils::id_generator::IdGenerator;

/// In-memory execution state of one thread.
#[derive(Clone, Debug)]
pub struct ThreadState {
    /// The merged state as of the last committed barrier.
    pub state: VersionedState,
    /// Number of committed super-steps.
    pub step: u64,
    /// Tasks scheduled for the next super-step.
    pub frontier: Vec<TaskInvocation>,
    /// Completed-task partials from a suspended super-step, keyed by
    /// frontier index.
    pub pending_writes: FxHashMap<usize, NodePartial>,
    /// Pending interrupts plus the resume ledger.
    pub interrupts: InterruptState,
    /// Checkpoint this state grew out of; parent of the next write.
    pub last_checkpoint_id: Option<CheckpointId>,
}

impl ThreadState {
    /// Whether no executable work remains.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.frontier.is_empty() || self.frontier.iter().all(|t| t.node.is_end())
    }
}

/// How a thread was initialized by [`AppRunner::create_thread`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadInit {
    /// A brand new thread was created.
    Fresh,
    /// An existing thread was restored from its latest checkpoint.
    Resumed { checkpoint_step: u64 },
}

/// Result of one committed super-step.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// The step number that was executed.
    pub step: u64,
    /// Nodes that ran during this step, in frontier order.
    pub ran_nodes: Vec<NodeKind>,
    /// Virtual frontier entries that were skipped.
    pub skipped_nodes: Vec<NodeKind>,
    /// Fields whose content changed at the barrier.
    pub updated_fields: Vec<String>,
    /// The frontier scheduled for the next step.
    pub next_frontier: Vec<TaskInvocation>,
    /// Whether the thread reached a terminal frontier.
    pub completed: bool,
}

/// Result of attempting one super-step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step committed (or the thread was already terminal).
    Completed(StepReport),
    /// The step suspended; these interrupts await resume values.
    Interrupted(Vec<InterruptRecord>),
}

/// Final outcome of an invocation.
///
/// Suspension is a normal terminal state of an invocation — distinguishable
/// from both success and failure.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run reached a terminal frontier; here is the merged state.
    Completed(VersionedState),
    /// The run suspended on these interrupts; re-invoke the same thread
    /// with a resume value to continue.
    Interrupted(Vec<InterruptRecord>),
}

/// Errors surfaced by the runner.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("thread not found: {thread_id}")]
    #[diagnostic(code(plait::runner::thread_not_found))]
    ThreadNotFound { thread_id: String },

    #[error("no nodes to run from Start (empty entry frontier)")]
    #[diagnostic(
        code(plait::runner::no_entry_nodes),
        help("Add edges from Start, or check conditional entry routing.")
    )]
    NoEntryNodes,

    #[error("recursion limit of {limit} super-steps exceeded")]
    #[diagnostic(
        code(plait::runner::recursion_limit),
        help(
            "The graph may contain a cycle with no exit condition. Raise \
             the limit via RunConfig::with_recursion_limit if the workload \
             legitimately needs more steps; the last good checkpoint is \
             intact."
        )
    )]
    RecursionLimit { limit: usize },

    #[error("checkpoint `{checkpoint_id}` not found for thread `{thread_id}`")]
    #[diagnostic(
        code(plait::runner::checkpoint_not_found),
        help("Use AppRunner::history to list the thread's checkpoint ids.")
    )]
    CheckpointNotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    #[error("no pending interrupt on thread `{thread_id}` to resume")]
    #[diagnostic(
        code(plait::runner::no_pending_interrupt),
        help("Resume values only apply to threads suspended on an interrupt.")
    )]
    NoPendingInterrupt { thread_id: String },

    #[error(transparent)]
    #[diagnostic(code(plait::runner::scheduler))]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(code(plait::runner::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error("barrier merge failed: {0}")]
    #[diagnostic(code(plait::runner::barrier))]
    Barrier(#[from] crate::reducers::ReducerError),

    #[error("workflow task join error: {0}")]
    #[diagnostic(code(plait::runner::join))]
    Join(#[from] tokio::task::JoinError),
}

/// Runtime execution engine for compiled graphs.
///
/// Manages multiple isolated threads, the checkpoint backend, and the
/// event bus. One `App` may be shared by any number of runners.
pub struct AppRunner {
    app: Arc<App>,
    threads: FxHashMap<String, ThreadState>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    event_bus: EventBus,
    scheduler: Scheduler,
    id_gen: IdGenerator,
    stream_mode: StreamMode,
}

impl AppRunner {
    /// Runner with the app's configured event bus and the given backend.
    pub async fn new(app: App, checkpointer_type: CheckpointerType) -> Self {
        let bus = app.runtime_config().event_bus.build_event_bus();
        Self::with_options_and_bus(Arc::new(app), Some(checkpointer_type), bus, true).await
    }

    /// Runner with a custom event bus (the entry point for streaming).
    ///
    /// `checkpointer_type` of `None` falls back to the app's runtime
    /// configuration (which itself defaults to in-memory).
    pub async fn with_options_and_bus(
        app: Arc<App>,
        checkpointer_type: Option<CheckpointerType>,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Self {
        let config = app.runtime_config();
        let resolved = checkpointer_type.or_else(|| config.checkpointer.clone());
        let checkpointer =
            Self::build_checkpointer(resolved, config.sqlite_db_name.clone()).await;
        Self::with_checkpointer_and_bus(app, checkpointer, event_bus, start_listener).await
    }

    /// Runner sharing an already-constructed checkpoint backend.
    ///
    /// This is how repeated `App::invoke` calls against one `App` see each
    /// other's checkpoints even on the in-memory backend.
    pub async fn with_checkpointer_and_bus(
        app: Arc<App>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Self {
        let worker_limit = app.runtime_config().worker_limit.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        if start_listener {
            event_bus.listen_for_events();
        }
        Self {
            app,
            threads: FxHashMap::default(),
            checkpointer,
            event_bus,
            scheduler: Scheduler::new(worker_limit),
            id_gen: IdGenerator::new(),
            stream_mode: StreamMode::Updates,
        }
    }

    pub(crate) async fn build_checkpointer(
        checkpointer_type: Option<CheckpointerType>,
        sqlite_db_name: Option<String>,
    ) -> Option<Arc<dyn Checkpointer>> {
        match checkpointer_type? {
            CheckpointerType::InMemory => Some(Arc::new(InMemoryCheckpointer::new())),
            #[cfg(feature = "sqlite")]
            CheckpointerType::SQLite => {
                let db_url = std::env::var("PLAIT_SQLITE_URL").ok().unwrap_or_else(|| {
                    dotenvy::dotenv().ok();
                    let name = sqlite_db_name.unwrap_or_else(|| {
                        std::env::var("SQLITE_DB_NAME").unwrap_or_else(|_| "plait.db".to_string())
                    });
                    format!("sqlite://{name}")
                });
                // Make sure the underlying file exists before sqlx connects.
                if let Some(path) = db_url.strip_prefix("sqlite://") {
                    let path = path.trim();
                    if !path.is_empty() && path != ":memory:" {
                        let p = std::path::Path::new(path);
                        if let Some(parent) = p.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        if !p.exists() {
                            let _ = std::fs::File::create_new(p);
                        }
                    }
                }
                match crate::runtimes::SQLiteCheckpointer::connect(&db_url).await {
                    Ok(cp) => Some(Arc::new(cp) as Arc<dyn Checkpointer>),
                    Err(e) => {
                        tracing::error!(
                            url = %db_url,
                            error = %e,
                            "SQLiteCheckpointer initialization failed"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Streaming granularity for subsequent steps.
    pub fn set_stream_mode(&mut self, mode: StreamMode) {
        self.stream_mode = mode;
    }

    /// The checkpoint backend, when one is configured.
    #[must_use]
    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    /// The event bus this runner publishes to.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Key under which a thread is persisted; the configured checkpoint
    /// namespace isolates nested sub-graph lineages.
    fn storage_key(&self, thread_id: &str) -> String {
        match &self.app.runtime_config().checkpoint_ns {
            Some(ns) => format!("{ns}/{thread_id}"),
            None => thread_id.to_string(),
        }
    }

    /// Initialize a thread, restoring it from its latest checkpoint when
    /// one exists.
    ///
    /// `input` is merged through the reducers on a fresh thread, and on a
    /// restored *terminal* thread (starting a new run that continues the
    /// lineage). Input supplied to a suspended thread is ignored with a
    /// warning — the pending interrupt must be resolved first.
    #[instrument(skip(self, input), err)]
    pub async fn create_thread(
        &mut self,
        thread_id: String,
        input: FxHashMap<String, Value>,
    ) -> Result<ThreadInit, RunnerError> {
        let storage_key = self.storage_key(&thread_id);
        let restored = match &self.checkpointer {
            Some(cp) => cp.get(&storage_key, None).await?,
            None => None,
        };

        if let Some(stored) = restored {
            let checkpoint_step = stored.step;
            let mut ts = self.restore_thread_state(&stored);
            if !input.is_empty() {
                if ts.interrupts.has_pending() {
                    tracing::warn!(
                        thread = %thread_id,
                        "ignoring input on a suspended thread; resolve the pending interrupt first"
                    );
                } else {
                    self.app.apply_input(&mut ts.state, &input)?;
                    if ts.is_terminal() {
                        let frontier = self.entry_frontier(&ts)?;
                        ts.frontier = frontier;
                    }
                    self.persist(&storage_key, &mut ts).await;
                }
            }
            self.threads.insert(thread_id, ts);
            return Ok(ThreadInit::Resumed { checkpoint_step });
        }

        let mut state = VersionedState::new(Arc::clone(self.app.schema()));
        if !input.is_empty() {
            self.app.apply_input(&mut state, &input)?;
        }
        let mut ts = ThreadState {
            state,
            step: 0,
            frontier: Vec::new(),
            pending_writes: FxHashMap::default(),
            interrupts: InterruptState::default(),
            last_checkpoint_id: None,
        };
        let frontier = self.entry_frontier(&ts)?;
        ts.frontier = frontier;
        self.persist(&storage_key, &mut ts).await;
        self.threads.insert(thread_id, ts);
        Ok(ThreadInit::Fresh)
    }

    /// Install a historical checkpoint as the thread's current state.
    ///
    /// The next checkpoint written will parent to `checkpoint_id`,
    /// branching the thread's history; the original successor chain stays
    /// retrievable and unmodified.
    #[instrument(skip(self), err)]
    pub async fn load_thread_at(
        &mut self,
        thread_id: &str,
        checkpoint_id: &CheckpointId,
    ) -> Result<u64, RunnerError> {
        let storage_key = self.storage_key(thread_id);
        let stored = match &self.checkpointer {
            Some(cp) => cp
                .get(&storage_key, Some(checkpoint_id))
                .await
                .map_err(|e| match e {
                    CheckpointerError::NotFound { .. } => RunnerError::CheckpointNotFound {
                        thread_id: thread_id.to_string(),
                        checkpoint_id: checkpoint_id.to_string(),
                    },
                    other => RunnerError::Checkpointer(other),
                })?,
            None => None,
        };
        let Some(stored) = stored else {
            return Err(RunnerError::CheckpointNotFound {
                thread_id: thread_id.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
            });
        };
        let step = stored.step;
        let ts = self.restore_thread_state(&stored);
        self.threads.insert(thread_id.to_string(), ts);
        Ok(step)
    }

    /// Fork a checkpoint with a caller-supplied update merged through the
    /// reducers, without executing any node.
    ///
    /// Returns the id of the new checkpoint, which parents to the source
    /// checkpoint (the thread's current one when `checkpoint_id` is
    /// `None`). The thread's in-memory state moves to the fork.
    #[instrument(skip(self, update), err)]
    pub async fn update_state(
        &mut self,
        thread_id: &str,
        checkpoint_id: Option<&CheckpointId>,
        update: FxHashMap<String, Value>,
    ) -> Result<CheckpointId, RunnerError> {
        if let Some(id) = checkpoint_id {
            self.load_thread_at(thread_id, id).await?;
        }
        let storage_key = self.storage_key(thread_id);
        let mut ts = self
            .threads
            .remove(thread_id)
            .ok_or_else(|| RunnerError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })?;
        let result = self.app.apply_input(&mut ts.state, &update);
        match result {
            Ok(()) => {
                self.persist(&storage_key, &mut ts).await;
                let new_id = ts
                    .last_checkpoint_id
                    .clone()
                    .expect("persist always records a checkpoint id");
                self.threads.insert(thread_id.to_string(), ts);
                Ok(new_id)
            }
            Err(e) => {
                self.threads.insert(thread_id.to_string(), ts);
                Err(RunnerError::Barrier(e))
            }
        }
    }

    /// Feed a resume value to the thread's pending interrupt(s).
    ///
    /// The value lands on each suspended node's resume ledger; the next
    /// super-step re-runs those nodes and their interrupt calls consume
    /// the ledger by ordinal.
    pub fn apply_resume(&mut self, thread_id: &str, value: Value) -> Result<(), RunnerError> {
        let ts = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| RunnerError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })?;
        if !ts.interrupts.has_pending() {
            return Err(RunnerError::NoPendingInterrupt {
                thread_id: thread_id.to_string(),
            });
        }
        let pending: Vec<InterruptRecord> = ts.interrupts.pending.drain(..).collect();
        for record in pending {
            ts.interrupts
                .resume_ledger
                .entry(record.node)
                .or_default()
                .push(value.clone());
        }
        Ok(())
    }

    /// Execute one super-step for the given thread.
    ///
    /// Returns without executing anything when interrupts are pending
    /// (re-surfacing the identical payloads) or when the thread is already
    /// terminal.
    #[instrument(skip(self), err)]
    pub async fn run_step(&mut self, thread_id: &str) -> Result<StepOutcome, RunnerError> {
        let storage_key = self.storage_key(thread_id);
        let mut ts = self
            .threads
            .remove(thread_id)
            .ok_or_else(|| RunnerError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })?;

        if ts.interrupts.has_pending() {
            let pending = ts.interrupts.pending.clone();
            self.threads.insert(thread_id.to_string(), ts);
            return Ok(StepOutcome::Interrupted(pending));
        }

        if ts.is_terminal() {
            let report = StepReport {
                step: ts.step,
                ran_nodes: vec![],
                skipped_nodes: ts.frontier.iter().map(|t| t.node.clone()).collect(),
                updated_fields: vec![],
                next_frontier: vec![],
                completed: true,
            };
            self.threads.insert(thread_id.to_string(), ts);
            return Ok(StepOutcome::Completed(report));
        }

        let outcome = self.run_one_superstep(&storage_key, &mut ts).await;
        self.threads.insert(thread_id.to_string(), ts);
        outcome
    }

    /// Drive the thread until it is terminal, suspended, or failed.
    ///
    /// `recursion_limit` bounds the number of super-steps executed by this
    /// invocation; exceeding it fails the run while leaving the last good
    /// checkpoint intact.
    #[instrument(skip(self), err)]
    pub async fn run_until_complete(
        &mut self,
        thread_id: &str,
        recursion_limit: usize,
    ) -> Result<RunOutcome, RunnerError> {
        tracing::info!(thread = %thread_id, "workflow run started");
        let mut steps_taken = 0usize;
        loop {
            let ts = self
                .threads
                .get(thread_id)
                .ok_or_else(|| RunnerError::ThreadNotFound {
                    thread_id: thread_id.to_string(),
                })?;
            if ts.interrupts.has_pending() {
                let pending = ts.interrupts.pending.clone();
                tracing::info!(
                    thread = %thread_id,
                    interrupts = pending.len(),
                    "run suspended awaiting resume"
                );
                return Ok(RunOutcome::Interrupted(pending));
            }
            if ts.is_terminal() {
                tracing::info!(thread = %thread_id, step = ts.step, "workflow run completed");
                return Ok(RunOutcome::Completed(ts.state.clone()));
            }
            if steps_taken >= recursion_limit {
                return Err(RunnerError::RecursionLimit {
                    limit: recursion_limit,
                });
            }
            steps_taken += 1;
            match self.run_step(thread_id).await? {
                StepOutcome::Completed(report) => {
                    if report.completed {
                        let ts = self.threads.get(thread_id).expect("thread reinserted");
                        tracing::info!(
                            thread = %thread_id,
                            step = report.step,
                            "frontier reached terminal state"
                        );
                        return Ok(RunOutcome::Completed(ts.state.clone()));
                    }
                }
                StepOutcome::Interrupted(pending) => {
                    return Ok(RunOutcome::Interrupted(pending));
                }
            }
        }
    }

    /// Snapshot of a thread's in-memory execution state.
    #[must_use]
    pub fn get_thread(&self, thread_id: &str) -> Option<&ThreadState> {
        self.threads.get(thread_id)
    }

    /// All thread ids currently loaded in this runner.
    #[must_use]
    pub fn list_threads(&self) -> Vec<&String> {
        self.threads.keys().collect()
    }

    /// Ordered checkpoint history of a thread from the backend.
    pub async fn history(&self, thread_id: &str) -> Result<Vec<CheckpointMeta>, RunnerError> {
        match &self.checkpointer {
            Some(cp) => Ok(cp.list(&self.storage_key(thread_id)).await?),
            None => Ok(Vec::new()),
        }
    }

    // ---- internals ------------------------------------------------------

    fn restore_thread_state(&self, stored: &Checkpoint) -> ThreadState {
        let state = VersionedState::from_persisted(
            Arc::clone(self.app.schema()),
            stored.state_values.clone(),
            &stored.state_versions,
        );
        let pending_writes = stored
            .pending_writes
            .iter()
            .map(|w| (w.task_index, w.partial.clone()))
            .collect();
        ThreadState {
            state,
            step: stored.step,
            frontier: stored.frontier.clone(),
            pending_writes,
            interrupts: stored.interrupts.clone(),
            last_checkpoint_id: Some(stored.id.clone()),
        }
    }

    /// Entry frontier: routes leaving the virtual Start node, evaluated
    /// against the thread's current state.
    fn entry_frontier(&self, ts: &ThreadState) -> Result<Vec<TaskInvocation>, RunnerError> {
        let snapshot = ts.state.snapshot();
        let frontier = self
            .app
            .route_from(&NodeKind::Start, &snapshot, &[]);
        if frontier.is_empty() {
            return Err(RunnerError::NoEntryNodes);
        }
        Ok(frontier)
    }

    /// Persist the thread as a new checkpoint parented to the previous one.
    async fn persist(&self, storage_key: &str, ts: &mut ThreadState) {
        let Some(cp) = &self.checkpointer else {
            return;
        };
        let id = self.id_gen.next_checkpoint_id();
        let mut pending_writes: Vec<PendingWrite> = ts
            .pending_writes
            .iter()
            .map(|(&task_index, partial)| PendingWrite {
                task_index,
                partial: partial.clone(),
            })
            .collect();
        pending_writes.sort_by_key(|w| w.task_index);
        let checkpoint = Checkpoint {
            thread_id: storage_key.to_string(),
            id: id.clone(),
            parent_id: ts.last_checkpoint_id.clone(),
            step: ts.step,
            state_values: ts.state.values_map(),
            state_versions: ts.state.versions_map(),
            frontier: ts.frontier.clone(),
            pending_writes,
            interrupts: ts.interrupts.clone(),
            created_at: chrono::Utc::now(),
        };
        match cp.put(checkpoint).await {
            Ok(()) => ts.last_checkpoint_id = Some(id),
            Err(e) => {
                tracing::error!(thread = %storage_key, error = %e, "checkpoint write failed");
            }
        }
    }

    #[instrument(skip(self, ts), fields(step = ts.step + 1), err)]
    async fn run_one_superstep(
        &self,
        storage_key: &str,
        ts: &mut ThreadState,
    ) -> Result<StepOutcome, RunnerError> {
        ts.step += 1;
        let step = ts.step;
        let snapshot = ts.state.snapshot();
        tracing::debug!(step, frontier = ts.frontier.len(), "starting superstep");

        let superstep = match self
            .scheduler
            .superstep(
                self.app.nodes(),
                &ts.frontier,
                snapshot,
                step,
                self.event_bus.get_emitter(),
                &ts.interrupts.resume_ledger,
                &ts.pending_writes,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                // The attempt is not committed; the last durable
                // checkpoint remains the resumable state.
                ts.step -= 1;
                return Err(RunnerError::Scheduler(e));
            }
        };

        if superstep.has_interrupts() {
            ts.step -= 1;
            let mut pending = Vec::new();
            for (index, task, outcome) in superstep.outcomes {
                match outcome {
                    TaskOutcome::Completed(partial) => {
                        ts.pending_writes.insert(index, partial);
                    }
                    TaskOutcome::Interrupted(signal) => {
                        pending.push(InterruptRecord {
                            node: task.node.to_string(),
                            ordinal: signal.ordinal,
                            payload: signal.payload,
                        });
                    }
                }
            }
            ts.interrupts.pending = pending.clone();
            self.persist(storage_key, ts).await;
            tracing::info!(
                step = ts.step,
                interrupts = pending.len(),
                "superstep suspended on interrupt"
            );
            return Ok(StepOutcome::Interrupted(pending));
        }

        // Barrier: fold partials into a working copy so a failed merge
        // leaves the committed state untouched.
        let mut ran_nodes: Vec<NodeKind> = Vec::new();
        let mut partials: Vec<(NodeKind, NodePartial)> = Vec::new();
        for (_, task, outcome) in superstep.outcomes {
            if let TaskOutcome::Completed(partial) = outcome {
                if !ran_nodes.contains(&task.node) {
                    ran_nodes.push(task.node.clone());
                }
                partials.push((task.node, partial));
            }
        }

        let mut working_state = ts.state.clone();
        let barrier = match self.app.apply_barrier(&mut working_state, &partials) {
            Ok(outcome) => outcome,
            Err(e) => {
                ts.step -= 1;
                return Err(RunnerError::Barrier(e));
            }
        };
        ts.state = working_state;

        // The suspended-attempt bookkeeping is consumed; completed node
        // invocations also retire their resume ledgers.
        ts.pending_writes.clear();
        for node in &ran_nodes {
            ts.interrupts.resume_ledger.remove(node.as_label());
        }

        let post_snapshot = ts.state.snapshot();
        let mut next_frontier: Vec<TaskInvocation> = Vec::new();
        let mut commands_by_node: FxHashMap<NodeKind, Vec<crate::control::FrontierCommand>> =
            FxHashMap::default();
        for (node, command) in &barrier.commands {
            commands_by_node
                .entry(node.clone())
                .or_default()
                .push(command.clone());
        }
        for node in &ran_nodes {
            let commands = commands_by_node.get(node).map(Vec::as_slice).unwrap_or(&[]);
            for task in self.app.route_from(node, &post_snapshot, commands) {
                let duplicate = task.payload.is_none()
                    && next_frontier
                        .iter()
                        .any(|t| t.payload.is_none() && t.node == task.node);
                if !duplicate {
                    next_frontier.push(task);
                }
            }
        }

        tracing::debug!(
            step,
            updated_fields = ?barrier.updated_fields,
            next_frontier = next_frontier.len(),
            "barrier applied"
        );

        ts.frontier = next_frontier.clone();
        let completed = ts.is_terminal();
        self.persist(storage_key, ts).await;

        let emitter = self.event_bus.get_emitter();
        let _ = emitter.emit(Event::Step(StepEvent {
            step,
            ran_nodes: ran_nodes.iter().map(ToString::to_string).collect(),
            updated_fields: barrier.updated_fields.clone(),
            updates: barrier.updates.clone(),
        }));
        if self.stream_mode == StreamMode::Values {
            let _ = emitter.emit(Event::Values(ValuesEvent {
                step,
                values: ts.state.values_map(),
            }));
        }

        Ok(StepOutcome::Completed(StepReport {
            step,
            ran_nodes,
            skipped_nodes: superstep.skipped,
            updated_fields: barrier.updated_fields,
            next_frontier,
            completed,
        }))
    }
}
