//! The graph executor: the only writer of run state.
//!
//! Every public operation is a load, a pure computation against the
//! [`NodeRegistry`](crate::registry::NodeRegistry), and one or more
//! compare-and-swap persists. The executor drives a run through execution
//! and branch nodes until it reaches a checkpoint, a terminal status, or a
//! failure; waiting and terminal runs are never mutated by `advance`.

use serde_json::json;
use std::sync::Arc;
use tracing::{Instrument, instrument};

use crate::checkpoint::{
    CheckpointCoordinator, CheckpointDecision, FAILURE_REASON_KEY, PendingInput,
};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::events::{EventEmitter, RunEvent};
use crate::projection::{ProjectedStatus, StatusProjector};
use crate::registry::NodeRegistry;
use crate::run::PipelineRun;
use crate::status::RunStatus;
use crate::step::{StepExecutor, StepResult};
use crate::store::{RunStore, StoreError};
use crate::types::{CheckpointKind, NodeId, NodeKind, RunId};

/// Orchestrates pipeline runs over a node graph, a run store, and a step
/// executor.
///
/// The executor is stateless between calls: all run state lives in the
/// store, so any number of executors (or a restarted process) can serve the
/// same runs. Writer races are resolved by the store's revision CAS and a
/// bounded reload-and-retry.
pub struct GraphExecutor {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn RunStore>,
    executor: Arc<dyn StepExecutor>,
    coordinator: CheckpointCoordinator,
    config: EngineConfig,
    emitter: EventEmitter,
}

impl GraphExecutor {
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        store: Arc<dyn RunStore>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            coordinator: CheckpointCoordinator::new(config.max_rework_iterations),
            registry,
            store,
            executor,
            config,
            emitter: EventEmitter::disconnected(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.coordinator = CheckpointCoordinator::new(config.max_rework_iterations);
        self.config = config;
        self
    }

    /// Wire the executor to a transition log emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Create a run parked at the graph's entry node in `Running`.
    ///
    /// The initial input becomes the seed context (objects merge key by key,
    /// a bare scalar lands under `prompt`). The run does not advance until
    /// [`advance`](Self::advance) is called.
    #[instrument(skip_all)]
    pub async fn create_run(
        &self,
        initial_input: serde_json::Value,
    ) -> Result<ProjectedStatus, EngineError> {
        let run = PipelineRun::new(
            RunId::generate(),
            self.registry.entry().clone(),
            crate::context::RunContext::from_initial_input(initial_input),
        );
        self.store.create(run.clone()).await?;
        tracing::info!(run_id = %run.run_id, entry = %run.current_node, "run created");
        self.emitter.emit(RunEvent::diagnostic(
            run.run_id.clone(),
            Some(run.current_node.clone()),
            "run created",
        ));
        self.project(&run)
    }

    /// Load the full current state of a run, context included.
    pub async fn get_run(&self, run_id: &RunId) -> Result<PipelineRun, EngineError> {
        self.load(run_id).await
    }

    /// Project a run into its caller-facing status summary.
    pub async fn get_status(&self, run_id: &RunId) -> Result<ProjectedStatus, EngineError> {
        let run = self.load(run_id).await?;
        self.project(&run)
    }

    /// Drive a run forward until it parks at a checkpoint, completes, or
    /// fails. A waiting or terminal run is returned unchanged.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn advance(&self, run_id: &RunId) -> Result<ProjectedStatus, EngineError> {
        let mut attempts = 0u32;
        loop {
            match self.try_advance(run_id).await {
                Err(EngineError::Store(StoreError::Conflict { .. }))
                    if attempts < self.config.conflict_retry_limit =>
                {
                    attempts += 1;
                    tracing::debug!(run_id = %run_id, attempts, "advance lost a write race; retrying");
                }
                Ok(run) => return self.project(&run),
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply a checkpoint decision and, when it resumes the run, drive it to
    /// its next resting state. A terminal run is returned unchanged.
    ///
    /// The decision is recorded as a persisted transient status before any
    /// routing happens, so a crash between the two phases loses nothing: the
    /// next `advance` resumes from the recorded verdict.
    #[instrument(skip_all, fields(run_id = %submission.run_id))]
    pub async fn submit_decision(
        &self,
        submission: &CheckpointDecision,
    ) -> Result<ProjectedStatus, EngineError> {
        let mut attempts = 0u32;
        loop {
            match self.try_submit_decision(submission).await {
                Err(EngineError::Store(StoreError::Conflict { .. }))
                    if attempts < self.config.conflict_retry_limit =>
                {
                    attempts += 1;
                    tracing::debug!(
                        run_id = %submission.run_id,
                        attempts,
                        "decision lost a write race; retrying"
                    );
                }
                Ok(run) => return self.project(&run),
                Err(e) => return Err(e),
            }
        }
    }

    /// Terminate a run as `cancelled_by_user`, regardless of where it is.
    /// A terminal run is returned unchanged.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn cancel(&self, run_id: &RunId) -> Result<ProjectedStatus, EngineError> {
        let mut attempts = 0u32;
        loop {
            match self.try_cancel(run_id).await {
                Err(EngineError::Store(StoreError::Conflict { .. }))
                    if attempts < self.config.conflict_retry_limit =>
                {
                    attempts += 1;
                }
                Ok(run) => return self.project(&run),
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_advance(&self, run_id: &RunId) -> Result<PipelineRun, EngineError> {
        let mut run = self.load(run_id).await?;
        if run.is_terminal() || run.is_waiting() {
            return Ok(run);
        }
        let mut expected = run.revision;
        let mut last_status = run.status;

        // A transient decision status left by a crash between the record and
        // route phases resolves here before driving.
        let before = (run.status, run.current_node.clone());
        self.coordinator.route(&mut run, &self.registry)?;
        if (run.status, run.current_node.clone()) != before {
            self.persist(&mut run, &mut expected, &mut last_status)
                .await?;
        }
        if run.is_terminal() || run.is_waiting() {
            return Ok(run);
        }

        self.drive(&mut run, &mut expected, &mut last_status).await?;
        Ok(run)
    }

    async fn try_submit_decision(
        &self,
        submission: &CheckpointDecision,
    ) -> Result<PipelineRun, EngineError> {
        let mut run = self.load(&submission.run_id).await?;
        if run.is_terminal() {
            return Ok(run);
        }
        // A retry after a lost write race can reload a run whose verdict was
        // already recorded as a transient status; resume routing it instead
        // of re-validating a decision that already applied.
        if run.status.is_transient() {
            return self.try_advance(&submission.run_id).await;
        }
        let mut expected = run.revision;
        let mut last_status = run.status;

        self.coordinator
            .record_decision(&mut run, &self.registry, submission)?;
        self.persist(&mut run, &mut expected, &mut last_status)
            .await?;

        let before = (run.status, run.current_node.clone());
        self.coordinator.route(&mut run, &self.registry)?;
        if (run.status, run.current_node.clone()) != before {
            self.persist(&mut run, &mut expected, &mut last_status)
                .await?;
        }

        if matches!(
            run.status,
            RunStatus::Running | RunStatus::ReviewRejectedReworking
        ) {
            self.drive(&mut run, &mut expected, &mut last_status).await?;
        }
        Ok(run)
    }

    async fn try_cancel(&self, run_id: &RunId) -> Result<PipelineRun, EngineError> {
        let mut run = self.load(run_id).await?;
        if run.is_terminal() {
            return Ok(run);
        }
        let mut expected = run.revision;
        let mut last_status = run.status;
        run.status = RunStatus::CancelledByUser;
        run.pending_input = None;
        self.persist(&mut run, &mut expected, &mut last_status)
            .await?;
        Ok(run)
    }

    /// Run-to-next-pause loop. Enters with a run that is resuming; leaves
    /// with the run parked (awaiting), terminal, or mid-graph only if a
    /// configuration error aborted the walk.
    async fn drive(
        &self,
        run: &mut PipelineRun,
        expected: &mut u64,
        last_status: &mut RunStatus,
    ) -> Result<(), EngineError> {
        loop {
            if run.status != RunStatus::Running {
                run.status = RunStatus::Running;
            }
            let node = run.current_node.clone();
            let kind = self.registry.kind_of(&node)?.clone();
            match kind {
                NodeKind::Checkpoint(kind) => {
                    return self.park_at_checkpoint(run, expected, last_status, kind).await;
                }
                NodeKind::Branch => {
                    match self.registry.successor_of(&node, &run.context)? {
                        Some(next) => {
                            tracing::debug!(run_id = %run.run_id, from = %node, to = %next, "branch resolved");
                            run.current_node = next;
                        }
                        None => {
                            run.status = RunStatus::Completed;
                        }
                    }
                    self.persist(run, expected, last_status).await?;
                    if run.is_terminal() {
                        return Ok(());
                    }
                }
                NodeKind::Execution { soft_failable } => {
                    let step = self
                        .execute_step(run, &node)
                        .instrument(tracing::info_span!("execute_node", node = %node))
                        .await;
                    if step.ok {
                        run.context.merge(step.context_patch);
                        run.record_completed(node.clone());
                        self.advance_past(run, expected, last_status, &node).await?;
                    } else {
                        let error = step
                            .error
                            .unwrap_or_else(|| "unspecified step failure".to_string());
                        self.handle_step_failure(run, expected, last_status, &node, soft_failable, error)
                            .await?;
                    }
                    if run.is_terminal() || run.is_waiting() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn park_at_checkpoint(
        &self,
        run: &mut PipelineRun,
        expected: &mut u64,
        last_status: &mut RunStatus,
        kind: CheckpointKind,
    ) -> Result<(), EngineError> {
        // The preprocessing checkpoint records segment completion as its own
        // observable transition before parking.
        if kind == CheckpointKind::PreprocessingReview {
            run.status = RunStatus::PreprocessingCompleted;
            self.persist(run, expected, last_status).await?;
        }
        run.status = kind.awaiting_status();
        run.pending_input = Some(PendingInput::for_checkpoint(
            kind,
            run.current_node.clone(),
            &run.context,
        ));
        self.persist(run, expected, last_status).await?;
        tracing::info!(run_id = %run.run_id, node = %run.current_node, status = %run.status, "run parked");
        Ok(())
    }

    /// Move to the node's successor, or complete the run if there is none.
    async fn advance_past(
        &self,
        run: &mut PipelineRun,
        expected: &mut u64,
        last_status: &mut RunStatus,
        node: &NodeId,
    ) -> Result<(), EngineError> {
        match self.registry.successor_of(node, &run.context)? {
            Some(next) => {
                run.current_node = next;
            }
            None => {
                run.status = RunStatus::Completed;
                tracing::info!(run_id = %run.run_id, "run completed");
            }
        }
        self.persist(run, expected, last_status).await
    }

    async fn handle_step_failure(
        &self,
        run: &mut PipelineRun,
        expected: &mut u64,
        last_status: &mut RunStatus,
        node: &NodeId,
        soft_failable: bool,
        error: String,
    ) -> Result<(), EngineError> {
        run.record_failed(node.clone());
        self.emitter.emit(RunEvent::diagnostic(
            run.run_id.clone(),
            Some(node.clone()),
            format!("node failed: {error}"),
        ));

        if soft_failable {
            tracing::warn!(run_id = %run.run_id, node = %node, error = %error, "soft-failable node failed; continuing");
            return self.advance_past(run, expected, last_status, node).await;
        }

        if self.registry.is_preprocessing_node(node)
            && let Some(checkpoint) = self.registry.preprocessing_checkpoint()
        {
            // A hard failure inside the preprocessing segment is recoverable:
            // park at the segment's checkpoint for a retry-or-cancel decision.
            tracing::warn!(run_id = %run.run_id, node = %node, error = %error, "preprocessing failed; parking for decision");
            run.current_node = checkpoint.clone();
            run.status = RunStatus::PreprocessingFailed;
            run.pending_input = Some(PendingInput::retry(checkpoint.clone()));
            run.context.insert(FAILURE_REASON_KEY, json!(error));
            return self.persist(run, expected, last_status).await;
        }

        tracing::error!(run_id = %run.run_id, node = %node, error = %error, "node failed; failing run");
        run.context.insert(FAILURE_REASON_KEY, json!(error));
        run.status = RunStatus::Failed;
        self.persist(run, expected, last_status).await
    }

    /// Execute one node under the step timeout. A timeout or an
    /// infrastructure error at the seam both count as a node failure.
    async fn execute_step(&self, run: &PipelineRun, node: &NodeId) -> StepResult {
        match tokio::time::timeout(
            self.config.step_timeout,
            self.executor.execute(&run.run_id, node, &run.context),
        )
        .await
        {
            Err(_) => StepResult::failed(format!(
                "step exceeded timeout of {:?}",
                self.config.step_timeout
            )),
            Ok(Err(e)) => StepResult::failed(e.to_string()),
            Ok(Ok(result)) => result,
        }
    }

    /// Persist the run under CAS and emit one transition record.
    async fn persist(
        &self,
        run: &mut PipelineRun,
        expected: &mut u64,
        last_status: &mut RunStatus,
    ) -> Result<(), EngineError> {
        run.touch();
        self.store.update(run.clone(), *expected).await?;
        *expected += 1;
        run.revision = *expected;
        self.emitter.emit(RunEvent::transition(
            run.run_id.clone(),
            run.current_node.clone(),
            *last_status,
            run.status,
            run.context.sorted_keys(),
        ));
        *last_status = run.status;
        Ok(())
    }

    fn project(&self, run: &PipelineRun) -> Result<ProjectedStatus, EngineError> {
        let projected = StatusProjector::new(self.registry.clone()).project(run)?;
        Ok(projected)
    }

    async fn load(&self, run_id: &RunId) -> Result<PipelineRun, EngineError> {
        match self.store.load(run_id).await {
            Ok(run) => Ok(run),
            Err(StoreError::NotFound { run_id }) => Err(EngineError::NotFound { run_id }),
            Err(e) => Err(EngineError::Store(e)),
        }
    }
}
