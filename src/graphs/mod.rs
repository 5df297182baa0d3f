//! Workflow graph definition and compilation.
//!
//! The main entry point is [`GraphBuilder`], which collects the state
//! schema, node registry, and edge table, then validates and compiles into
//! an executable [`App`](crate::app::App).
//!
//! # Core concepts
//!
//! - **Nodes**: executable units of work implementing
//!   [`Node`](crate::node::Node), keyed by stable
//!   [`NodeKind`](crate::types::NodeKind) identifiers
//! - **Edges**: a tagged union of unconditional, conditional, and dynamic
//!   fan-out routing rules ([`Edge`])
//! - **Virtual endpoints**: `Start` and `End` exist for topology only and
//!   are never executed
//! - **Compilation**: structural validation plus conversion into an
//!   immutable executable plan

pub mod builder;
pub mod compilation;
pub mod edges;

pub use builder::GraphBuilder;
pub use compilation::GraphError;
pub use edges::{ConditionalEdge, Dispatch, DispatchRouter, DynamicEdge, Edge, EdgeRouter};
