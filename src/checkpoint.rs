//! Human-in-the-loop checkpoints: pending input, decisions, and the
//! coordinator that turns a decision into a persisted state transition.
//!
//! Decision handling is two-phase. [`CheckpointCoordinator::record_decision`]
//! validates the submission and moves the run into a transient
//! approved/rejected status; the engine persists that snapshot so the
//! decision itself survives a crash. [`CheckpointCoordinator::route`] then
//! resolves where the transient status sends the run (successor, rework
//! target, or a parking state) and the engine persists again before driving.

use serde::{Deserialize, Serialize};

use crate::context::{ContextPatch, new_patch};
use crate::errors::EngineError;
use crate::registry::{CheckpointPolicy, NodeRegistry};
use crate::run::PipelineRun;
use crate::status::RunStatus;
use crate::types::{CheckpointKind, NodeId, RunId};

/// Context key under which reviewer feedback is accumulated.
pub const REVIEW_FEEDBACK_KEY: &str = "review_feedback";
/// Context key recording why a run reached `Failed`.
pub const FAILURE_REASON_KEY: &str = "failure_reason";
/// Failure reason written when the rework cap is exceeded.
pub const REWORK_ESCALATION: &str = "rework_escalation";

/// One question presented to the reviewer at a checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Suggested answers; empty means free-form.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Question {
    #[must_use]
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = String>) -> Self {
        self.options = options.into_iter().collect();
        self
    }
}

/// What a parked run is waiting for.
///
/// Populated exactly when the run's status is a waiting status and cleared
/// on every decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingInput {
    /// The checkpoint node the run is parked at.
    pub node: NodeId,
    pub questions: Vec<Question>,
}

impl PendingInput {
    /// Build the pending input presented when `node` (a checkpoint of the
    /// given kind) parks the run.
    ///
    /// Config-type checkpoints surface the questions the upstream
    /// recommendation node stored under `questions`, falling back to a
    /// single approve/reject question when none were generated. The
    /// preprocessing checkpoint asks the reviewer to confirm the applied
    /// techniques.
    #[must_use]
    pub fn for_checkpoint(
        kind: CheckpointKind,
        node: NodeId,
        context: &crate::context::RunContext,
    ) -> Self {
        let questions = if kind.is_config_type() {
            context
                .get("questions")
                .and_then(|v| serde_json::from_value::<Vec<Question>>(v.clone()).ok())
                .filter(|qs| !qs.is_empty())
                .unwrap_or_else(|| {
                    vec![
                        Question::new(
                            "approve_configuration",
                            "Approve the recommended configuration?",
                        )
                        .with_options(["approve".to_string(), "reject".to_string()]),
                    ]
                })
        } else {
            let techniques: Vec<String> = context
                .get("applied_techniques")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            vec![
                Question::new(
                    "confirm_techniques",
                    "Confirm the applied preprocessing techniques?",
                )
                .with_options(techniques),
            ]
        };
        Self { node, questions }
    }

    /// The retry-or-cancel prompt used by the parking states
    /// (`review_rejected_awaiting_decision`, `preprocessing_failed`).
    #[must_use]
    pub fn retry(node: NodeId) -> Self {
        Self {
            node,
            questions: vec![
                Question::new("retry", "Retry from the rework point or cancel the run?")
                    .with_options(["retry".to_string(), "cancel".to_string()]),
            ],
        }
    }
}

/// The reviewer's verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Accept and resume.
    Approve,
    /// Accept with modified answers; the answers overwrite context keys.
    Edit,
    /// Send the run back to the checkpoint's rework target.
    Reject,
    /// Terminate the run as `cancelled_by_user`.
    Cancel,
}

/// A complete decision submission for one parked run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDecision {
    pub run_id: RunId,
    pub decision: Decision,
    /// Answers keyed by question id, merged into the run context.
    #[serde(default)]
    pub answers: ContextPatch,
    /// Free-form reviewer feedback, stored under `review_feedback`.
    #[serde(default)]
    pub feedback: Option<String>,
}

impl CheckpointDecision {
    #[must_use]
    pub fn new(run_id: RunId, decision: Decision) -> Self {
        Self {
            run_id,
            decision,
            answers: new_patch(),
            feedback: None,
        }
    }

    #[must_use]
    pub fn with_answers(mut self, answers: ContextPatch) -> Self {
        self.answers = answers;
        self
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

/// Applies checkpoint decisions to a run.
///
/// Holds the rework cap; everything else it needs arrives per call, so one
/// coordinator serves every run.
#[derive(Clone, Debug)]
pub struct CheckpointCoordinator {
    max_rework_iterations: Option<u32>,
}

impl CheckpointCoordinator {
    #[must_use]
    pub fn new(max_rework_iterations: Option<u32>) -> Self {
        Self {
            max_rework_iterations,
        }
    }

    /// Phase one: validate the submission against the run's parked state and
    /// record the verdict as a transient status.
    ///
    /// On `Err` the run is untouched. On `Ok` the run carries the decision's
    /// context updates and a transient (or terminal) status ready to be
    /// persisted and then routed.
    pub fn record_decision(
        &self,
        run: &mut PipelineRun,
        registry: &NodeRegistry,
        submission: &CheckpointDecision,
    ) -> Result<(), EngineError> {
        if submission.run_id != run.run_id {
            return Err(EngineError::invalid_decision(
                &run.run_id,
                run.status,
                format!("decision addressed to run {}", submission.run_id),
            ));
        }
        if !run.status.is_waiting() {
            return Err(EngineError::invalid_decision(
                &run.run_id,
                run.status,
                "run is not awaiting a decision",
            ));
        }

        match run.status {
            RunStatus::ReviewRejectedAwaitingDecision => {
                self.record_retry_confirmation(run, registry, submission)
            }
            RunStatus::PreprocessingFailed => self.record_failure_recovery(run, submission),
            _ => self.record_checkpoint_verdict(run, registry, submission),
        }
    }

    /// Phase two: resolve a transient status into the run's next resting
    /// state. No-op for non-transient statuses.
    pub fn route(
        &self,
        run: &mut PipelineRun,
        registry: &NodeRegistry,
    ) -> Result<(), EngineError> {
        match run.status {
            RunStatus::ReviewApproved | RunStatus::PreprocessingApproved => {
                let next = registry.successor_of(&run.current_node, &run.context)?;
                match next {
                    Some(node) => {
                        run.current_node = node;
                        run.status = RunStatus::Running;
                    }
                    None => {
                        run.status = RunStatus::Completed;
                    }
                }
            }
            RunStatus::ReviewRejected => {
                let policy = self.policy_of(run, registry)?;
                if policy.two_step_reject {
                    run.status = RunStatus::ReviewRejectedAwaitingDecision;
                    run.pending_input = Some(PendingInput::retry(run.current_node.clone()));
                } else {
                    run.current_node = policy.rework_target.clone();
                    run.status = RunStatus::ReviewRejectedReworking;
                }
            }
            RunStatus::PreprocessingRejected => {
                let policy = self.policy_of(run, registry)?;
                let target = policy.rework_target.clone();
                let segment: Vec<NodeId> = registry.preprocessing_nodes().to_vec();
                run.strip_nodes(&segment);
                run.current_node = target;
                run.status = RunStatus::Running;
            }
            _ => {}
        }
        Ok(())
    }

    fn record_checkpoint_verdict(
        &self,
        run: &mut PipelineRun,
        registry: &NodeRegistry,
        submission: &CheckpointDecision,
    ) -> Result<(), EngineError> {
        let policy = self.policy_of(run, registry)?;
        if policy.kind.awaiting_status() != run.status {
            return Err(EngineError::invalid_decision(
                &run.run_id,
                run.status,
                format!(
                    "run is parked at a {} checkpoint",
                    policy.kind
                ),
            ));
        }
        let kind = policy.kind;

        if matches!(submission.decision, Decision::Approve | Decision::Edit) {
            self.require_answers(run, submission)?;
        }

        self.apply_submission_context(run, submission);
        run.pending_input = None;

        match submission.decision {
            Decision::Approve | Decision::Edit => {
                run.status = kind.approved_status();
            }
            Decision::Reject => {
                self.record_rejection(run, kind.rejected_status());
            }
            Decision::Cancel => {
                run.status = RunStatus::CancelledByUser;
            }
        }
        Ok(())
    }

    /// A two-step rejection parked at `review_rejected_awaiting_decision`
    /// only accepts retry (submitted as `Approve`) or `Cancel`.
    fn record_retry_confirmation(
        &self,
        run: &mut PipelineRun,
        registry: &NodeRegistry,
        submission: &CheckpointDecision,
    ) -> Result<(), EngineError> {
        match submission.decision {
            Decision::Approve => {
                let policy = self.policy_of(run, registry)?;
                self.apply_submission_context(run, submission);
                run.pending_input = None;
                run.current_node = policy.rework_target.clone();
                run.status = RunStatus::ReviewRejectedReworking;
                Ok(())
            }
            Decision::Cancel => {
                self.apply_submission_context(run, submission);
                run.pending_input = None;
                run.status = RunStatus::CancelledByUser;
                Ok(())
            }
            Decision::Edit | Decision::Reject => Err(EngineError::invalid_decision(
                &run.run_id,
                run.status,
                "only retry (approve) or cancel applies to a rejected review",
            )),
        }
    }

    /// A hard preprocessing failure parked at `preprocessing_failed` accepts
    /// `Reject` (re-attempt the segment) or `Cancel`.
    fn record_failure_recovery(
        &self,
        run: &mut PipelineRun,
        submission: &CheckpointDecision,
    ) -> Result<(), EngineError> {
        match submission.decision {
            Decision::Reject => {
                self.apply_submission_context(run, submission);
                run.pending_input = None;
                self.record_rejection(run, RunStatus::PreprocessingRejected);
                Ok(())
            }
            Decision::Cancel => {
                self.apply_submission_context(run, submission);
                run.pending_input = None;
                run.status = RunStatus::CancelledByUser;
                Ok(())
            }
            Decision::Approve | Decision::Edit => Err(EngineError::invalid_decision(
                &run.run_id,
                run.status,
                "only retry (reject) or cancel applies after a preprocessing failure",
            )),
        }
    }

    /// Bump the rework counter and either record the transient rejection or
    /// escalate to `Failed` when the cap is exceeded.
    fn record_rejection(&self, run: &mut PipelineRun, rejected: RunStatus) {
        run.bump_iteration();
        if let Some(cap) = self.max_rework_iterations
            && run.iteration_count > cap
        {
            tracing::warn!(
                run_id = %run.run_id,
                iterations = run.iteration_count,
                cap,
                "rework cap exceeded; failing run"
            );
            run.context
                .insert(FAILURE_REASON_KEY, serde_json::json!(REWORK_ESCALATION));
            run.status = RunStatus::Failed;
            return;
        }
        run.status = rejected;
    }

    fn require_answers(
        &self,
        run: &PipelineRun,
        submission: &CheckpointDecision,
    ) -> Result<(), EngineError> {
        let Some(pending) = &run.pending_input else {
            return Ok(());
        };
        for question in &pending.questions {
            if !submission.answers.contains_key(&question.id) {
                return Err(EngineError::invalid_decision(
                    &run.run_id,
                    run.status,
                    format!("missing answer for question {}", question.id),
                ));
            }
        }
        Ok(())
    }

    fn apply_submission_context(&self, run: &mut PipelineRun, submission: &CheckpointDecision) {
        run.context.merge(submission.answers.clone());
        if let Some(feedback) = &submission.feedback {
            run.context
                .insert(REVIEW_FEEDBACK_KEY, serde_json::json!(feedback));
        }
    }

    fn policy_of<'r>(
        &self,
        run: &PipelineRun,
        registry: &'r NodeRegistry,
    ) -> Result<&'r CheckpointPolicy, EngineError> {
        registry.checkpoint_policy(&run.current_node).ok_or_else(|| {
            EngineError::invalid_decision(
                &run.run_id,
                run.status,
                format!("node {} is not a checkpoint", run.current_node),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ml_pipeline, ml_pipeline_with, nodes};
    use serde_json::json;

    fn parked_at_config_review() -> PipelineRun {
        let mut run = PipelineRun::new(
            RunId::from("run-1"),
            NodeId::from(nodes::CONFIG_REVIEW),
            crate::context::RunContext::default(),
        );
        run.status = RunStatus::AwaitingReview;
        run.pending_input = Some(PendingInput::for_checkpoint(
            CheckpointKind::ConfigReview,
            run.current_node.clone(),
            &run.context,
        ));
        run
    }

    fn coordinator() -> CheckpointCoordinator {
        CheckpointCoordinator::new(Some(5))
    }

    fn answers_for(run: &PipelineRun) -> ContextPatch {
        let mut patch = new_patch();
        for q in &run.pending_input.as_ref().unwrap().questions {
            patch.insert(q.id.clone(), json!("approve"));
        }
        patch
    }

    #[test]
    fn approve_records_transient_then_routes_to_successor() {
        let registry = ml_pipeline();
        let mut run = parked_at_config_review();
        let answers = answers_for(&run);

        let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Approve)
            .with_answers(answers);
        coordinator()
            .record_decision(&mut run, &registry, &decision)
            .unwrap();
        assert_eq!(run.status, RunStatus::ReviewApproved);
        assert!(run.pending_input.is_none());
        assert!(run.context.contains_key("approve_configuration"));

        coordinator().route(&mut run, &registry).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.current_node, NodeId::from(nodes::SELECT_PATH));
    }

    #[test]
    fn approve_without_answers_is_invalid_and_leaves_run_untouched() {
        let registry = ml_pipeline();
        let mut run = parked_at_config_review();

        let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Approve);
        let err = coordinator()
            .record_decision(&mut run, &registry, &decision)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDecision { .. }));
        assert_eq!(run.status, RunStatus::AwaitingReview);
        assert!(run.pending_input.is_some());
    }

    #[test]
    fn reject_routes_to_rework_target_and_bumps_iteration() {
        let registry = ml_pipeline();
        let mut run = parked_at_config_review();

        let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Reject)
            .with_feedback("wrong category");
        coordinator()
            .record_decision(&mut run, &registry, &decision)
            .unwrap();
        assert_eq!(run.status, RunStatus::ReviewRejected);
        assert_eq!(run.iteration_count, 1);
        assert_eq!(
            run.context.str_value(REVIEW_FEEDBACK_KEY),
            Some("wrong category")
        );

        coordinator().route(&mut run, &registry).unwrap();
        assert_eq!(run.status, RunStatus::ReviewRejectedReworking);
        assert_eq!(run.current_node, NodeId::from(nodes::PREDICT_CATEGORY));
    }

    #[test]
    fn two_step_reject_parks_then_retry_reworks() {
        let registry = ml_pipeline_with(true);
        let mut run = parked_at_config_review();

        let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Reject);
        coordinator()
            .record_decision(&mut run, &registry, &decision)
            .unwrap();
        coordinator().route(&mut run, &registry).unwrap();
        assert_eq!(run.status, RunStatus::ReviewRejectedAwaitingDecision);
        let pending = run.pending_input.as_ref().unwrap();
        assert_eq!(pending.questions[0].id, "retry");

        // Only retry (approve) or cancel applies while parked here.
        let invalid = CheckpointDecision::new(run.run_id.clone(), Decision::Reject);
        assert!(
            coordinator()
                .record_decision(&mut run, &registry, &invalid)
                .is_err()
        );

        let retry = CheckpointDecision::new(run.run_id.clone(), Decision::Approve);
        coordinator()
            .record_decision(&mut run, &registry, &retry)
            .unwrap();
        assert_eq!(run.status, RunStatus::ReviewRejectedReworking);
        assert_eq!(run.current_node, NodeId::from(nodes::PREDICT_CATEGORY));
        assert_eq!(run.iteration_count, 1);
    }

    #[test]
    fn preprocessing_reject_strips_segment_and_returns_to_branch() {
        let registry = ml_pipeline();
        let mut run = PipelineRun::new(
            RunId::from("run-1"),
            NodeId::from(nodes::PREPROCESSING_REVIEW),
            crate::context::RunContext::default(),
        );
        run.status = RunStatus::AwaitingPreprocessingReview;
        run.record_completed(NodeId::from(nodes::ANALYZE_PROMPT));
        run.record_completed(NodeId::from(nodes::CLEAN_DATA));
        run.record_completed(NodeId::from(nodes::IMPUTE_MISSING));
        run.record_completed(NodeId::from(nodes::ENCODE_CATEGORICALS));

        let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Reject);
        coordinator()
            .record_decision(&mut run, &registry, &decision)
            .unwrap();
        assert_eq!(run.status, RunStatus::PreprocessingRejected);

        coordinator().route(&mut run, &registry).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.current_node, NodeId::from(nodes::SELECT_PATH));
        // Segment accounting is reset; earlier nodes keep their record.
        assert_eq!(
            run.completed_nodes,
            vec![NodeId::from(nodes::ANALYZE_PROMPT)]
        );
    }

    #[test]
    fn rework_cap_escalates_to_failed() {
        let registry = ml_pipeline();
        let coordinator = CheckpointCoordinator::new(Some(2));
        let mut run = parked_at_config_review();
        run.iteration_count = 2;

        let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Reject);
        coordinator
            .record_decision(&mut run, &registry, &decision)
            .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.context.str_value(FAILURE_REASON_KEY),
            Some(REWORK_ESCALATION)
        );
    }

    #[test]
    fn mismatched_run_id_is_rejected() {
        let registry = ml_pipeline();
        let mut run = parked_at_config_review();

        let decision = CheckpointDecision::new(RunId::from("other"), Decision::Cancel);
        assert!(
            coordinator()
                .record_decision(&mut run, &registry, &decision)
                .is_err()
        );
        assert_eq!(run.status, RunStatus::AwaitingReview);
    }

    #[test]
    fn cancel_terminates_from_any_waiting_state() {
        let registry = ml_pipeline();
        let mut run = parked_at_config_review();

        let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Cancel);
        coordinator()
            .record_decision(&mut run, &registry, &decision)
            .unwrap();
        assert_eq!(run.status, RunStatus::CancelledByUser);
        assert!(run.pending_input.is_none());
    }

    #[test]
    fn config_questions_from_context_take_precedence() {
        let mut ctx = crate::context::RunContext::default();
        ctx.insert(
            "questions",
            json!([{"id": "target_column", "prompt": "Which column is the target?"}]),
        );
        let pending = PendingInput::for_checkpoint(
            CheckpointKind::ConfigReview,
            NodeId::from(nodes::CONFIG_REVIEW),
            &ctx,
        );
        assert_eq!(pending.questions.len(), 1);
        assert_eq!(pending.questions[0].id, "target_column");
    }
}
