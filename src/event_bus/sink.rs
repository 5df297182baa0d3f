use std::io;
use std::sync::{Arc, Mutex};

use super::event::Event;

/// Destination for events broadcast by the [`EventBus`](super::EventBus).
///
/// Sinks run on the bus listener task; `handle` should return quickly and
/// must not block on the workflow it is observing.
pub trait EventSink: Send {
    /// Deliver one event to this sink.
    fn handle(&mut self, event: &Event) -> io::Result<()>;
}

/// Prints events to stdout, one line each. The default sink.
#[derive(Debug, Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> io::Result<()> {
        match event {
            Event::Node(e) => {
                let node = e.node_id.as_deref().unwrap_or("-");
                let step = e.step.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
                println!("[node {node} step {step}] {}: {}", e.scope, e.message);
            }
            Event::Step(e) => {
                println!(
                    "[step {}] ran={:?} updated={:?}",
                    e.step, e.ran_nodes, e.updated_fields
                );
            }
            Event::Values(e) => {
                println!("[step {}] values: {} fields", e.step, e.values.len());
            }
            Event::Diagnostic(e) => {
                println!("[{}] {}", e.scope, e.message);
            }
        }
        Ok(())
    }
}

/// Buffers events in memory; useful in tests and for post-run inspection.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone out everything captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().expect("memory sink poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> io::Result<()> {
        self.events
            .lock()
            .expect("memory sink poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Forwards events into a flume channel; the receiving half becomes the
/// caller-facing event stream for streaming invocations.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> io::Result<()> {
        // A dropped receiver is a consumer choice, not a failure.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
