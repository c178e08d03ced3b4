//! The `PipelineRun` aggregate: the single source of truth for one run.
//!
//! A run is created in `Running` at the graph's entry node and mutated only
//! through the [`GraphExecutor`](crate::engine::GraphExecutor) and the
//! checkpoint coordinator. The struct enforces the accounting invariants the
//! rest of the system relies on: exactly-once node accounting, monotonic
//! iteration counts, and terminal immutability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::PendingInput;
use crate::context::RunContext;
use crate::status::RunStatus;
use crate::types::{NodeId, RunId};

/// One pipeline run, owned exclusively by the [`RunStore`](crate::store::RunStore).
///
/// `revision` is the compare-and-swap token the store uses to serialize
/// writers per run id; it is bumped on every successful update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub status: RunStatus,
    pub current_node: NodeId,
    pub completed_nodes: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub iteration_count: u32,
    pub pending_input: Option<PendingInput>,
    pub context: RunContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

impl PipelineRun {
    /// Create a fresh run parked at the entry node in `Running`.
    #[must_use]
    pub fn new(run_id: RunId, entry: NodeId, context: RunContext) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            status: RunStatus::Running,
            current_node: entry,
            completed_nodes: Vec::new(),
            failed_nodes: Vec::new(),
            iteration_count: 0,
            pending_input: None,
            context,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.status.is_waiting()
    }

    /// Record a node as completed. A node already accounted for (in either
    /// list) is left untouched; the engine never attempts a double record,
    /// so a duplicate indicates a routing bug worth a warning.
    pub fn record_completed(&mut self, node: NodeId) {
        if self.completed_nodes.contains(&node) || self.failed_nodes.contains(&node) {
            tracing::warn!(run_id = %self.run_id, node = %node, "node already accounted for; skipping");
            return;
        }
        self.completed_nodes.push(node);
    }

    /// Record a node as failed. Same accounting rules as `record_completed`.
    pub fn record_failed(&mut self, node: NodeId) {
        if self.completed_nodes.contains(&node) || self.failed_nodes.contains(&node) {
            tracing::warn!(run_id = %self.run_id, node = %node, "node already accounted for; skipping");
            return;
        }
        self.failed_nodes.push(node);
    }

    /// Remove the given nodes from both accounting lists so a segment can be
    /// re-attempted after a rejection without violating at-most-once
    /// accounting. Nodes outside the given set are untouched.
    pub fn strip_nodes(&mut self, nodes: &[NodeId]) {
        self.completed_nodes.retain(|n| !nodes.contains(n));
        self.failed_nodes.retain(|n| !nodes.contains(n));
    }

    /// Bump the rework iteration counter; it only ever increases.
    pub fn bump_iteration(&mut self) {
        self.iteration_count += 1;
    }

    /// Refresh `updated_at`; called immediately before every persisted
    /// transition.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
