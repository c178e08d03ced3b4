//! The closed run-status enumeration and its lifecycle predicates.
//!
//! Statuses were an open-ended set of ad-hoc strings in earlier designs;
//! here they are a tagged enum with a strict [`FromStr`](std::str::FromStr)
//! so an unknown status is rejected when a persisted run is decoded, not
//! compared against at call sites.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Externally observable lifecycle state of a [`PipelineRun`](crate::run::PipelineRun).
///
/// Waiting statuses (`is_waiting`) park the run pending a decision and are
/// the only states in which `pending_input` is populated. Terminal statuses
/// (`is_terminal`) permit no further mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Advancing through execution/branch nodes.
    Running,
    /// Parked at a configuration review checkpoint.
    AwaitingReview,
    /// Parked at an algorithm selection checkpoint.
    AwaitingAlgorithmSelection,
    /// Parked at a preprocessing review checkpoint.
    AwaitingPreprocessingReview,
    /// A config-type rejection is re-driving the upstream recommendation node.
    ReviewRejectedReworking,
    /// A two-step rejection awaits an explicit retry-or-cancel decision.
    ReviewRejectedAwaitingDecision,
    /// Transient: a review checkpoint was approved; resuming.
    ReviewApproved,
    /// Transient: a review checkpoint was rejected; routing the rework.
    ReviewRejected,
    /// Transient: the preprocessing segment finished; checkpoint is next.
    PreprocessingCompleted,
    /// A preprocessing node hard-failed; parked for a retry-or-cancel decision.
    PreprocessingFailed,
    /// Transient: the preprocessing checkpoint was approved; resuming.
    PreprocessingApproved,
    /// Transient: the preprocessing checkpoint was rejected; segment resets.
    PreprocessingRejected,
    /// The run reached the end of the graph. Terminal.
    Completed,
    /// An execution node hard-failed outside a recoverable segment. Terminal.
    Failed,
    /// Cancelled by an explicit decision or out-of-band request. Terminal.
    CancelledByUser,
}

impl RunStatus {
    /// Terminal runs permit no further mutation; `advance` and
    /// `submit_decision` are no-ops on them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::CancelledByUser
        )
    }

    /// Waiting runs are parked pending an external decision; `advance` is a
    /// no-op on them and `pending_input` is populated.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            RunStatus::AwaitingReview
                | RunStatus::AwaitingAlgorithmSelection
                | RunStatus::AwaitingPreprocessingReview
                | RunStatus::ReviewRejectedAwaitingDecision
                | RunStatus::PreprocessingFailed
        )
    }

    /// Transient statuses are persisted snapshots between a recorded
    /// checkpoint verdict (or segment boundary) and its routing; the next
    /// advance resolves them. They are observable on the transition log and
    /// in `get_status`, never a resting state.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RunStatus::ReviewApproved
                | RunStatus::ReviewRejected
                | RunStatus::PreprocessingCompleted
                | RunStatus::PreprocessingApproved
                | RunStatus::PreprocessingRejected
        )
    }

    /// The snake_case wire form, identical to the serde encoding.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::AwaitingReview => "awaiting_review",
            RunStatus::AwaitingAlgorithmSelection => "awaiting_algorithm_selection",
            RunStatus::AwaitingPreprocessingReview => "awaiting_preprocessing_review",
            RunStatus::ReviewRejectedReworking => "review_rejected_reworking",
            RunStatus::ReviewRejectedAwaitingDecision => "review_rejected_awaiting_decision",
            RunStatus::ReviewApproved => "review_approved",
            RunStatus::ReviewRejected => "review_rejected",
            RunStatus::PreprocessingCompleted => "preprocessing_completed",
            RunStatus::PreprocessingFailed => "preprocessing_failed",
            RunStatus::PreprocessingApproved => "preprocessing_approved",
            RunStatus::PreprocessingRejected => "preprocessing_rejected",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::CancelledByUser => "cancelled_by_user",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted status string did not match any known variant.
#[derive(Debug, Error, Diagnostic)]
#[error("unknown run status: {0}")]
#[diagnostic(
    code(stageloop::status::unknown),
    help("The persisted record was written by an incompatible version or corrupted.")
)]
pub struct UnknownStatus(pub String);

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "running" => RunStatus::Running,
            "awaiting_review" => RunStatus::AwaitingReview,
            "awaiting_algorithm_selection" => RunStatus::AwaitingAlgorithmSelection,
            "awaiting_preprocessing_review" => RunStatus::AwaitingPreprocessingReview,
            "review_rejected_reworking" => RunStatus::ReviewRejectedReworking,
            "review_rejected_awaiting_decision" => RunStatus::ReviewRejectedAwaitingDecision,
            "review_approved" => RunStatus::ReviewApproved,
            "review_rejected" => RunStatus::ReviewRejected,
            "preprocessing_completed" => RunStatus::PreprocessingCompleted,
            "preprocessing_failed" => RunStatus::PreprocessingFailed,
            "preprocessing_approved" => RunStatus::PreprocessingApproved,
            "preprocessing_rejected" => RunStatus::PreprocessingRejected,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            "cancelled_by_user" => RunStatus::CancelledByUser,
            other => return Err(UnknownStatus(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_waiting_are_disjoint() {
        let all = [
            RunStatus::Running,
            RunStatus::AwaitingReview,
            RunStatus::AwaitingAlgorithmSelection,
            RunStatus::AwaitingPreprocessingReview,
            RunStatus::ReviewRejectedReworking,
            RunStatus::ReviewRejectedAwaitingDecision,
            RunStatus::ReviewApproved,
            RunStatus::ReviewRejected,
            RunStatus::PreprocessingCompleted,
            RunStatus::PreprocessingFailed,
            RunStatus::PreprocessingApproved,
            RunStatus::PreprocessingRejected,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::CancelledByUser,
        ];
        for status in all {
            let classes = [
                status.is_terminal(),
                status.is_waiting(),
                status.is_transient(),
            ];
            assert!(
                classes.iter().filter(|c| **c).count() <= 1,
                "{status} falls into more than one lifecycle class"
            );
        }
    }

    #[test]
    fn from_str_round_trips_every_variant() {
        for s in [
            "running",
            "awaiting_review",
            "awaiting_algorithm_selection",
            "awaiting_preprocessing_review",
            "review_rejected_reworking",
            "review_rejected_awaiting_decision",
            "review_approved",
            "review_rejected",
            "preprocessing_completed",
            "preprocessing_failed",
            "preprocessing_approved",
            "preprocessing_rejected",
            "completed",
            "failed",
            "cancelled_by_user",
        ] {
            let status: RunStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("in_progress".parse::<RunStatus>().is_err());
    }
}
