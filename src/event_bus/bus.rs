use std::sync::{Arc, Mutex};
use tokio::{sync::oneshot, task};

use super::event::Event;
use super::sink::{EventSink, StdOutSink};

/// Receives events from the executor and node contexts and broadcasts them
/// to all registered sinks on a background listener task.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink)
    }
}

impl EventBus {
    /// Create an EventBus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create an EventBus with multiple sinks.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-invocation streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.add_boxed_sink(Box::new(sink));
    }

    /// Add an already-boxed sink.
    pub fn add_boxed_sink(&self, sink: Box<dyn EventSink>) {
        self.sinks.lock().expect("sinks poisoned").push(sink);
    }

    /// Handle producers use to publish events onto this bus.
    #[must_use]
    pub fn get_emitter(&self) -> EventEmitter {
        EventEmitter {
            sender: self.event_channel.0.clone(),
        }
    }

    /// Spawn the background task that drains the channel into the sinks.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = Arc::clone(&self.sinks);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            let broadcast = |event: &Event| {
                let mut sinks_guard = sinks.lock().expect("sinks poisoned");
                for sink in sinks_guard.iter_mut() {
                    if let Err(e) = sink.handle(event) {
                        tracing::warn!(error = %e, "event sink failed");
                    }
                }
            };
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // Flush whatever is already queued before exiting so
                        // a graceful shutdown never drops tail events.
                        while let Ok(event) = receiver.try_recv() {
                            broadcast(&event);
                        }
                        break;
                    }
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => broadcast(&event),
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener task, draining nothing further.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock()
            && let Some(state) = guard.take()
        {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

/// Cloneable producer handle onto an [`EventBus`].
#[derive(Clone, Debug)]
pub struct EventEmitter {
    sender: flume::Sender<Event>,
}

impl EventEmitter {
    /// Publish an event. Returns the event back on a disconnected bus so
    /// callers can decide whether loss matters.
    pub fn emit(&self, event: Event) -> Result<(), Event> {
        self.sender.send(event).map_err(|e| e.into_inner())
    }

    /// Emitter wired to nothing; events are dropped. Handy in unit tests.
    #[must_use]
    pub fn disconnected() -> Self {
        let (sender, _receiver) = flume::unbounded();
        Self { sender }
    }
}
