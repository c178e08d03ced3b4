use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::RunStatus;
use crate::types::{NodeId, RunId};

/// One observed status transition of a run.
///
/// Every persisted transition emits exactly one of these, including the
/// transient review/preprocessing statuses that the advance loop immediately
/// normalizes away.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub run_id: RunId,
    /// The node the run rests at after the transition.
    pub node: NodeId,
    pub from: RunStatus,
    pub to: RunStatus,
    /// Sorted context keys at the time of the transition; consumers diff
    /// consecutive entries to see which artifacts each node produced.
    pub context_keys: Vec<String>,
    pub at: DateTime<Utc>,
}

/// An entry on the transition log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Transition(Transition),
    /// Non-transition observability: node failures, retries, escalations.
    Diagnostic {
        run_id: RunId,
        node: Option<NodeId>,
        message: String,
    },
}

impl RunEvent {
    #[must_use]
    pub fn transition(
        run_id: RunId,
        node: NodeId,
        from: RunStatus,
        to: RunStatus,
        context_keys: Vec<String>,
    ) -> Self {
        RunEvent::Transition(Transition {
            run_id,
            node,
            from,
            to,
            context_keys,
            at: Utc::now(),
        })
    }

    #[must_use]
    pub fn diagnostic(run_id: RunId, node: Option<NodeId>, message: impl Into<String>) -> Self {
        RunEvent::Diagnostic {
            run_id,
            node,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &RunId {
        match self {
            RunEvent::Transition(t) => &t.run_id,
            RunEvent::Diagnostic { run_id, .. } => run_id,
        }
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEvent::Transition(t) => {
                write!(f, "{} @{}: {} -> {}", t.run_id, t.node, t.from, t.to)
            }
            RunEvent::Diagnostic {
                run_id,
                node,
                message,
            } => match node {
                Some(node) => write!(f, "{run_id} @{node}: {message}"),
                None => write!(f, "{run_id}: {message}"),
            },
        }
    }
}
