use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::event::RunEvent;

/// Abstraction over an output target that consumes transition log entries.
pub trait EventSink: Sync + Send {
    /// Handle one entry. The sink decides how to serialize or format it.
    fn handle(&mut self, event: &RunEvent) -> IoResult<()>;
}

/// Line-oriented stdout sink.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &RunEvent) -> IoResult<()> {
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<RunEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &RunEvent) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers (dashboards, SSE
/// endpoints).
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &RunEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
