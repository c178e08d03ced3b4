use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task;

use super::event::RunEvent;
use super::sink::{ChannelSink, EventSink, StdOutSink};

/// Receives transition log entries and broadcasts them to multiple sinks.
pub struct TransitionLog {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<RunEvent>, flume::Receiver<RunEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for TransitionLog {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl TransitionLog {
    /// Create a transition log with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a transition log with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-request streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().unwrap().push(Box::new(sink));
    }

    /// An emitter handle producers use to publish entries.
    #[must_use]
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            tx: self.event_channel.0.clone(),
        }
    }

    /// Attach a streaming subscriber and return its receiving end.
    ///
    /// Entries published after this call are forwarded to the returned
    /// channel alongside every other sink.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_sink(ChannelSink::new(tx));
        rx
    }

    /// Spawn a background task that drains the channel into the sinks.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks_guard = sinks.lock().unwrap();
                            for sink in sinks_guard.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::warn!(error = %e, "transition log sink error");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener, draining nothing further.
    pub async fn stop(&self) {
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

impl Drop for TransitionLog {
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

/// Cloneable producer handle. Publication is best-effort: a closed channel
/// is logged at debug and the entry dropped, the state transition already
/// persisted is unaffected.
#[derive(Clone)]
pub struct EventEmitter {
    tx: flume::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: RunEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("transition log closed; dropping entry");
        }
    }

    /// An emitter wired to nothing, for callers that opt out of observation.
    #[must_use]
    pub fn disconnected() -> Self {
        let (tx, _rx) = flume::bounded(0);
        Self { tx }
    }
}
