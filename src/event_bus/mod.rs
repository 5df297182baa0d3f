//! Event bus for streaming execution observability.
//!
//! The executor publishes one [`Event::Step`] per super-step (and, in
//! values mode, one [`Event::Values`] carrying the merged state), while node
//! code can emit scoped [`Event::Node`] messages through
//! [`NodeContext::emit`](crate::node::NodeContext::emit). A background
//! listener fans events out to pluggable [`EventSink`]s; streaming
//! invocations attach a [`ChannelSink`] and hand the receiving end to the
//! caller.

mod bus;
mod event;
mod sink;

pub use bus::{EventBus, EventEmitter};
pub use event::{
    DiagnosticEvent, Event, NodeEvent, StepEvent, ValuesEvent, STREAM_END_SCOPE,
};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
