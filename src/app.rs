//! The compiled, executable workflow: barrier merges, edge routing, and
//! the public invocation API.
//!
//! [`App`] is produced by
//! [`GraphBuilder::compile`](crate::graphs::GraphBuilder::compile) and is
//! immutable: the node registry, edge table, and state schema are frozen.
//! Invocations run through an [`AppRunner`] that the `invoke*` helpers
//! construct internally; drop down to [`AppRunner`] directly for
//! step-by-step control, state forking, and history inspection.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::control::FrontierCommand;
use crate::event_bus::{ChannelSink, Event, EventEmitter, STREAM_END_SCOPE};
use crate::graphs::Edge;
use crate::node::{Node, NodePartial, UpdateMap};
use crate::reducers::{ReducerError, ReducerRegistry};
use crate::runtimes::runner::{AppRunner, RunOutcome, RunnerError};
use crate::runtimes::{Checkpointer, RunConfig, RuntimeConfig};
use crate::scheduler::TaskInvocation;
use crate::state::{StateSchema, StateSnapshot, VersionedState};
use crate::types::NodeKind;
use crate::utils::id_generator::IdGenerator;

/// Result of folding node partials into the state at a barrier.
///
/// Updates and errors are aggregated in a deterministic order so
/// downstream consumers (runner, checkpointers, tests) observe stable
/// behaviour across executions.
#[derive(Debug, Clone, Default)]
pub struct BarrierOutcome {
    /// Fields whose content changed, in schema declaration order.
    pub updated_fields: Vec<String>,
    /// Post-merge values of the updated fields.
    pub updates: FxHashMap<String, Value>,
    /// Frontier commands emitted by nodes during the super-step.
    pub commands: Vec<(NodeKind, FrontierCommand)>,
}

/// Handle for a streaming workflow invocation.
///
/// Dropping the handle (or calling [`abort`](Self::abort)) cancels the
/// in-flight super-step: partial work is discarded and no checkpoint is
/// written for it — the last durable checkpoint remains the resumable
/// state. Use [`join`](Self::join) to await graceful completion; the
/// paired event stream emits a diagnostic with scope
/// [`STREAM_END_SCOPE`] before closing.
pub struct InvocationHandle {
    join_handle: Option<JoinHandle<Result<RunOutcome, RunnerError>>>,
}

impl InvocationHandle {
    /// Abort the underlying workflow task.
    pub fn abort(&self) {
        if let Some(handle) = &self.join_handle {
            handle.abort();
        }
    }

    /// Whether the workflow task has completed or been aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    /// Await the workflow outcome.
    pub async fn join(mut self) -> Result<RunOutcome, RunnerError> {
        let handle = self
            .join_handle
            .take()
            .expect("join_handle already awaited");
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(RunnerError::Join(err)),
        }
    }
}

impl Drop for InvocationHandle {
    fn drop(&mut self) {
        if let Some(handle) = &self.join_handle {
            handle.abort();
        }
    }
}

/// Compiled, immutable workflow graph plus its reducer registry and
/// runtime configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use plait::graphs::GraphBuilder;
/// use plait::node::{FnNode, NodePartial};
/// use plait::reducers::ReducerSpec;
/// use plait::runtimes::{RunConfig, RunOutcome};
/// use plait::state::StateSchema;
/// use plait::types::NodeKind;
/// use plait::utils::collections::update_map;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = GraphBuilder::new()
///     .with_schema(StateSchema::builder().field("count", ReducerSpec::Sum).build())
///     .add_node("tally", FnNode::new(|_s, _c| async move {
///         Ok(NodePartial::new().with_value("count", json!(1)))
///     }))
///     .add_edge(NodeKind::Start, "tally")
///     .add_edge("tally", NodeKind::End)
///     .compile()?;
///
/// let outcome = app
///     .invoke(update_map([("count", json!(0))]), RunConfig::new().with_thread_id("t1"))
///     .await?;
/// if let RunOutcome::Completed(state) = outcome {
///     assert_eq!(state.get("count"), Some(&json!(1)));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    schema: Arc<StateSchema>,
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<Edge>>,
    reducers: ReducerRegistry,
    runtime_config: RuntimeConfig,
    // Shared across clones so repeated invokes against the same App hit
    // the same (possibly in-memory) checkpoint store.
    shared_checkpointer: Arc<tokio::sync::OnceCell<Option<Arc<dyn Checkpointer>>>>,
}

impl App {
    /// Internal (crate) factory keeping nodes/edges private.
    pub(crate) fn from_parts(
        schema: StateSchema,
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: FxHashMap<NodeKind, Vec<Edge>>,
        runtime_config: RuntimeConfig,
    ) -> Self {
        let reducers = ReducerRegistry::from_schema(&schema);
        App {
            schema: Arc::new(schema),
            nodes,
            edges,
            reducers,
            runtime_config,
            shared_checkpointer: Arc::new(tokio::sync::OnceCell::new()),
        }
    }

    /// The frozen state schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    /// The node registry.
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    /// The edge table.
    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeKind, Vec<Edge>> {
        &self.edges
    }

    /// The runtime configuration.
    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// The checkpoint backend shared by every invocation of this `App`
    /// (constructed on first use from the runtime configuration).
    pub async fn shared_checkpointer(&self) -> Option<Arc<dyn Checkpointer>> {
        self.shared_checkpointer
            .get_or_init(|| async {
                AppRunner::build_checkpointer(
                    self.runtime_config.checkpointer.clone(),
                    self.runtime_config.sqlite_db_name.clone(),
                )
                .await
            })
            .await
            .clone()
    }

    /// Run the workflow to completion (or suspension) against a thread.
    ///
    /// `input` is merged into the thread's state through the reducers
    /// before execution. See [`RunConfig`] for thread targeting, resume
    /// values, time travel, and the recursion limit.
    #[instrument(skip(self, input, config), err)]
    pub async fn invoke(
        &self,
        input: UpdateMap,
        config: RunConfig,
    ) -> Result<RunOutcome, RunnerError> {
        let event_bus = self.runtime_config.event_bus.build_event_bus();
        self.run_on_bus(input, config, event_bus, None).await
    }

    /// Run the workflow while streaming events to the caller.
    ///
    /// Returns a handle for the workflow outcome and a channel yielding
    /// every event emitted during execution: one
    /// [`Event::Step`] per super-step, [`Event::Values`] after each step
    /// in values mode, node-scoped messages, and a final diagnostic with
    /// scope [`STREAM_END_SCOPE`].
    pub async fn invoke_streaming(
        &self,
        input: UpdateMap,
        config: RunConfig,
    ) -> (InvocationHandle, flume::Receiver<Event>) {
        let (tx, rx) = flume::unbounded();
        let event_bus = self.runtime_config.event_bus.build_event_bus();
        event_bus.add_sink(ChannelSink::new(tx));
        let app = self.clone();
        let join = tokio::spawn(async move {
            let end_emitter = event_bus.get_emitter();
            app.run_on_bus(input, config, event_bus, Some(end_emitter))
                .await
        });
        (
            InvocationHandle {
                join_handle: Some(join),
            },
            rx,
        )
    }

    async fn run_on_bus(
        &self,
        input: UpdateMap,
        config: RunConfig,
        event_bus: crate::event_bus::EventBus,
        end_emitter: Option<EventEmitter>,
    ) -> Result<RunOutcome, RunnerError> {
        let checkpointer = self.shared_checkpointer().await;
        let mut runner = AppRunner::with_checkpointer_and_bus(
            Arc::new(self.clone()),
            checkpointer,
            event_bus,
            true,
        )
        .await;
        runner.set_stream_mode(config.stream_mode);

        let thread_id = config
            .thread_id
            .clone()
            .unwrap_or_else(|| IdGenerator::new().generate_run_id());

        let result = async {
            runner.create_thread(thread_id.clone(), input).await?;
            if let Some(checkpoint_id) = &config.checkpoint_id {
                runner.load_thread_at(&thread_id, checkpoint_id).await?;
            }
            if let Some(resume) = config.resume.clone() {
                runner.apply_resume(&thread_id, resume)?;
            }
            let limit = config
                .recursion_limit
                .unwrap_or(self.runtime_config.recursion_limit);
            runner.run_until_complete(&thread_id, limit).await
        }
        .await;

        if let Some(emitter) = end_emitter {
            let message = match &result {
                Ok(RunOutcome::Completed(_)) => {
                    format!("thread={thread_id} status=completed")
                }
                Ok(RunOutcome::Interrupted(pending)) => {
                    format!(
                        "thread={thread_id} status=suspended interrupts={}",
                        pending.len()
                    )
                }
                Err(err) => format!("thread={thread_id} status=error error={err}"),
            };
            let _ = emitter.emit(Event::diagnostic(STREAM_END_SCOPE, message));
        }
        // Flush queued events before the bus is dropped with the runner.
        runner.event_bus().stop_listener().await;

        result
    }

    /// Merge `input` into `state` through the reducers, bumping versions
    /// of fields that change.
    pub(crate) fn apply_input(
        &self,
        state: &mut VersionedState,
        input: &UpdateMap,
    ) -> Result<(), ReducerError> {
        if input.is_empty() {
            return Ok(());
        }
        let partial = NodePartial::new().with_update(input.clone());
        self.apply_barrier(state, &[(NodeKind::Start, partial)])
            .map(|_| ())
    }

    /// Fold node partials into the state and bump versions of fields
    /// whose content changed.
    ///
    /// Partials are applied in the given order (frontier order), each
    /// field through its declared reducer. Insertion order of concurrent
    /// results is only meaningful for commutative reducers — fields fed by
    /// dynamic fan-out must use append-style reducers. Versions bump at
    /// most once per field per barrier.
    #[instrument(skip_all, fields(partials = partials.len()), err)]
    pub(crate) fn apply_barrier(
        &self,
        state: &mut VersionedState,
        partials: &[(NodeKind, NodePartial)],
    ) -> Result<BarrierOutcome, ReducerError> {
        let before_values = state.values_map();

        let mut commands: Vec<(NodeKind, FrontierCommand)> = Vec::new();
        for (node, partial) in partials {
            if let Some(update) = &partial.update
                && !update.is_empty()
            {
                tracing::debug!(node = %node, fields = update.len(), "node produced update");
                self.reducers.apply(state, update)?;
            }
            if let Some(route) = &partial.route {
                commands.push((node.clone(), route.clone()));
            }
        }

        let mut outcome = BarrierOutcome {
            commands,
            ..Default::default()
        };
        for field in self.schema.field_names() {
            let after = state.get(field).cloned().unwrap_or(Value::Null);
            let changed = before_values.get(field) != Some(&after);
            if changed {
                let bumped = state.version(field).unwrap_or(1).saturating_add(1);
                state.set_version(field, bumped);
                tracing::debug!(
                    field = %field,
                    version = bumped,
                    "state field updated"
                );
                outcome.updated_fields.push(field.clone());
                outcome.updates.insert(field.clone(), after);
            }
        }
        Ok(outcome)
    }

    /// Compute the routes leaving `node`, honoring frontier commands.
    ///
    /// A `Replace` command overrides the node's edges entirely (first one
    /// wins; later replaces are logged and ignored); `Append` commands add
    /// routes after them. Otherwise: direct edges route unconditionally,
    /// conditional routers are evaluated once and may only route within
    /// their declared target set, and dynamic routers emit one task per
    /// dispatch packet (never deduplicated). Unregistered custom targets
    /// are skipped with a warning, preserving progress.
    pub(crate) fn route_from(
        &self,
        node: &NodeKind,
        snapshot: &StateSnapshot,
        commands: &[FrontierCommand],
    ) -> Vec<TaskInvocation> {
        let mut replace: Option<Vec<TaskInvocation>> = None;
        let mut appended: Vec<TaskInvocation> = Vec::new();
        for command in commands {
            match command {
                FrontierCommand::Replace(entries) => {
                    if replace.is_some() {
                        tracing::warn!(
                            origin = %node,
                            "ignoring second Replace frontier command in one super-step"
                        );
                        continue;
                    }
                    replace = Some(
                        entries
                            .iter()
                            .map(|r| TaskInvocation::node(r.to_node_kind()))
                            .collect(),
                    );
                }
                FrontierCommand::Append(entries) => {
                    appended.extend(
                        entries
                            .iter()
                            .map(|r| TaskInvocation::node(r.to_node_kind())),
                    );
                }
            }
        }

        let mut routes = match replace {
            Some(routes) => routes,
            None => {
                let mut defaults = Vec::new();
                for edge in self.edges.get(node).map(Vec::as_slice).unwrap_or(&[]) {
                    match edge {
                        Edge::Direct(to) => defaults.push(TaskInvocation::node(to.clone())),
                        Edge::Conditional(ce) => {
                            for label in (ce.router())(snapshot) {
                                if ce.declares_label(&label) {
                                    defaults.push(TaskInvocation::node(NodeKind::from(
                                        label.as_str(),
                                    )));
                                } else {
                                    tracing::warn!(
                                        origin = %node,
                                        label = %label,
                                        "conditional router returned undeclared label; skipping"
                                    );
                                }
                            }
                        }
                        Edge::Dynamic(de) => {
                            for dispatch in (de.router())(snapshot) {
                                defaults
                                    .push(TaskInvocation::dispatch(dispatch.to, dispatch.payload));
                            }
                        }
                    }
                }
                defaults
            }
        };
        routes.extend(appended);

        routes.retain(|task| {
            let valid = match &task.node {
                NodeKind::Start | NodeKind::End => true,
                custom => self.nodes.contains_key(custom),
            };
            if !valid {
                tracing::warn!(
                    origin = %node,
                    target = %task.node,
                    "frontier target not found; skipping"
                );
            }
            valid
        });
        routes
    }
}
