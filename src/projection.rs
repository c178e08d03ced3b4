//! Read-side projection of a run into a caller-facing status summary.
//!
//! The projector derives everything from the persisted run and the graph;
//! it never mutates and never caches, so a projection is always consistent
//! with the last persisted transition.

use serde::{Deserialize, Serialize};

use crate::checkpoint::PendingInput;
use crate::registry::{NodeRegistry, RegistryError};
use crate::run::PipelineRun;
use crate::status::RunStatus;
use crate::types::{NodeId, RunId};

/// Caller-facing snapshot of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectedStatus {
    pub run_id: RunId,
    pub status: RunStatus,
    pub current_node: NodeId,
    /// Fraction of reachable execution nodes completed, in `[0, 1]`.
    pub progress: f64,
    pub completed_nodes: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub iteration_count: u32,
    pub pending_input: Option<PendingInput>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Projects runs against a fixed node graph.
#[derive(Clone, Debug)]
pub struct StatusProjector {
    registry: std::sync::Arc<NodeRegistry>,
}

impl StatusProjector {
    #[must_use]
    pub fn new(registry: std::sync::Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Build the projection for one run.
    ///
    /// The progress denominator is the execution-node count reachable under
    /// the run's current context, so it shifts when a branch decision
    /// changes which arm the run walks. A completed run always projects
    /// `1.0` regardless of accounting.
    pub fn project(&self, run: &PipelineRun) -> Result<ProjectedStatus, RegistryError> {
        let progress = if run.status == RunStatus::Completed {
            1.0
        } else {
            let reachable = self.registry.reachable_execution_count(&run.context)?;
            if reachable == 0 {
                0.0
            } else {
                let done = run
                    .completed_nodes
                    .iter()
                    .filter(|n| {
                        self.registry
                            .kind_of(n)
                            .map(crate::types::NodeKind::is_execution)
                            .unwrap_or(false)
                    })
                    .count();
                (done as f64 / reachable as f64).min(1.0)
            }
        };

        Ok(ProjectedStatus {
            run_id: run.run_id.clone(),
            status: run.status,
            current_node: run.current_node.clone(),
            progress,
            completed_nodes: run.completed_nodes.clone(),
            failed_nodes: run.failed_nodes.clone(),
            iteration_count: run.iteration_count,
            pending_input: run.pending_input.clone(),
            updated_at: run.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::registry::{ml_pipeline, nodes};
    use serde_json::json;
    use std::sync::Arc;

    fn projector() -> StatusProjector {
        StatusProjector::new(Arc::new(ml_pipeline()))
    }

    fn run_with(completed: &[&str], supervised: bool) -> PipelineRun {
        let mut ctx = RunContext::default();
        ctx.insert("supervised", json!(supervised));
        let mut run = PipelineRun::new(
            RunId::from("r1"),
            NodeId::from(nodes::CONFIG_REVIEW),
            ctx,
        );
        for node in completed {
            run.record_completed(NodeId::from(*node));
        }
        run
    }

    #[test]
    fn progress_counts_execution_nodes_only() {
        let run = run_with(
            &[nodes::ANALYZE_PROMPT, nodes::PROFILE_DATA],
            true,
        );
        let projected = projector().project(&run).unwrap();
        // 2 of the 9 execution nodes on the supervised walk.
        assert!((projected.progress - 2.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn denominator_follows_the_branch_arm() {
        let run = run_with(&[nodes::ANALYZE_PROMPT], false);
        let projected = projector().project(&run).unwrap();
        assert!((projected.progress - 1.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn completed_run_projects_full_progress() {
        let mut run = run_with(&[nodes::ANALYZE_PROMPT], true);
        run.status = RunStatus::Completed;
        let projected = projector().project(&run).unwrap();
        assert_eq!(projected.progress, 1.0);
    }
}
