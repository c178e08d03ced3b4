//! The run transition log: a broadcast channel for observing status
//! transitions without polling the store.
//!
//! Emission is best-effort by design. The persisted run state is the source
//! of truth; a full or closed channel is logged and dropped, never allowed
//! to fail or block a transition.

mod bus;
mod event;
mod sink;

pub use bus::{EventEmitter, TransitionLog};
pub use event::{RunEvent, Transition};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
