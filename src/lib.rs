//! # Plait: Graph-based Workflow Orchestration
//!
//! Plait runs multi-step workflows as graphs: nodes are async units of
//! work, edges route control flow (unconditionally, conditionally, or via
//! runtime fan-out), and a schema-driven shared state is threaded through
//! execution with per-field merge strategies. Execution proceeds in
//! **super-steps**: the current frontier of nodes runs concurrently
//! against an immutable state snapshot, results are folded through
//! reducers at a barrier, outgoing edges produce the next frontier, and a
//! durable checkpoint is written — one per super-step, parented to the
//! previous one.
//!
//! The checkpoint tree is what makes runs **pausable, resumable, and
//! branchable**: a node can suspend mid-run awaiting human input
//! ([`NodeContext::interrupt`](node::NodeContext::interrupt)), a crashed
//! run continues from its last good checkpoint, and any historical
//! checkpoint can be re-entered — optionally with edited state — to fork
//! an alternate timeline without disturbing the original history.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use plait::graphs::GraphBuilder;
//! use plait::node::{FnNode, NodePartial};
//! use plait::reducers::ReducerSpec;
//! use plait::runtimes::{RunConfig, RunOutcome};
//! use plait::state::StateSchema;
//! use plait::types::NodeKind;
//! use plait::utils::collections::update_map;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = GraphBuilder::new()
//!     .with_schema(
//!         StateSchema::builder()
//!             .field("question", ReducerSpec::LastValue)
//!             .field("findings", ReducerSpec::Append)
//!             .build(),
//!     )
//!     .add_node("research", FnNode::new(|snapshot, _ctx| async move {
//!         let q = snapshot.get("question").cloned().unwrap_or_default();
//!         Ok(NodePartial::new().with_value("findings", json!(format!("looked into {q}"))))
//!     }))
//!     .add_edge(NodeKind::Start, "research")
//!     .add_edge("research", NodeKind::End)
//!     .compile()?;
//!
//! let outcome = app
//!     .invoke(
//!         update_map([("question", json!("why do geese honk?"))]),
//!         RunConfig::new().with_thread_id("demo"),
//!     )
//!     .await?;
//!
//! match outcome {
//!     RunOutcome::Completed(state) => println!("{:?}", state.get("findings")),
//!     RunOutcome::Interrupted(pending) => println!("suspended: {pending:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Human-in-the-loop
//!
//! ```rust,no_run
//! use plait::node::{FnNode, NodePartial};
//! use serde_json::json;
//!
//! let ask = FnNode::new(|_snapshot, ctx| async move {
//!     // Suspends the run on first execution; returns the resume value
//!     // when the thread is re-invoked with one.
//!     let answer = ctx.interrupt(json!({"q": "ok to proceed?"}))?;
//!     Ok(NodePartial::new().with_value("approval", answer))
//! });
//! # let _ = ask;
//! ```
//!
//! ## Module guide
//!
//! - [`state`] — schema-driven versioned state and snapshots
//! - [`reducers`] — per-field merge strategies
//! - [`node`] — the [`Node`](node::Node) trait, contexts, interrupts
//! - [`graphs`] — graph definition and compilation
//! - [`scheduler`] — bounded-concurrency frontier execution
//! - [`app`] — the compiled graph and invocation API
//! - [`runtimes`] — the super-step engine, checkpointing, time travel
//! - [`event_bus`] — streaming events and pluggable sinks
//! - [`store`] — cross-thread application memory with ranked search
//! - [`control`] — frontier commands emitted by nodes

pub mod app;
pub mod control;
pub mod event_bus;
pub mod graphs;
pub mod node;
pub mod reducers;
pub mod runtimes;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod types;
pub mod utils;
