//! Core identifier and node-kind types for the stageloop orchestrator.
//!
//! These are the domain concepts a pipeline graph is made of: opaque run
//! identifiers, node identifiers, and the closed enumeration of node kinds
//! (execution, checkpoint, branch). Runtime execution types live in
//! [`crate::run`] and [`crate::engine`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::RunStatus;
use crate::utils::id_generator::IdGenerator;

/// Opaque unique identifier for a pipeline run.
///
/// Assigned once at creation and immutable afterwards. Serializes as a plain
/// string so any keyed store can use it directly.
///
/// # Examples
///
/// ```rust
/// use stageloop::types::RunId;
///
/// let id = RunId::generate();
/// let same = RunId::from(id.as_str());
/// assert_eq!(id, same);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh run identifier.
    #[must_use]
    pub fn generate() -> Self {
        RunId(IdGenerator::new().generate_run_id())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        RunId(s.to_string())
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        RunId(s)
    }
}

/// Identifier of a node within the pipeline graph.
///
/// Node identifiers are descriptive strings unique within a
/// [`NodeRegistry`](crate::registry::NodeRegistry), e.g. `"analyze_prompt"`
/// or `"clean_data"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode into the persisted/audit string form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.0.clone()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Developer experience: allow string literals where a NodeId is expected.
impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// The kind of a node in the pipeline graph.
///
/// Kind determines how the [`GraphExecutor`](crate::engine::GraphExecutor)
/// treats the node:
///
/// - **Execution** nodes run side-effecting work to completion via the
///   [`StepExecutor`](crate::step::StepExecutor).
/// - **Checkpoint** nodes park the run and wait for an external decision.
/// - **Branch** nodes are pure: their successor is a total function of the
///   accumulated run context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Side-effecting work delegated to the step executor.
    ///
    /// A `soft_failable` node records its failure in `failed_nodes` and lets
    /// the run continue; a hard failure fails (or parks) the run.
    Execution { soft_failable: bool },

    /// Suspends the run pending a [`CheckpointDecision`](crate::checkpoint::CheckpointDecision).
    Checkpoint(CheckpointKind),

    /// Pure routing on accumulated context; never executed, never recorded.
    Branch,
}

impl NodeKind {
    #[must_use]
    pub fn execution() -> Self {
        NodeKind::Execution {
            soft_failable: false,
        }
    }

    #[must_use]
    pub fn soft_execution() -> Self {
        NodeKind::Execution {
            soft_failable: true,
        }
    }

    #[must_use]
    pub fn is_checkpoint(&self) -> bool {
        matches!(self, NodeKind::Checkpoint(_))
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self, NodeKind::Branch)
    }

    #[must_use]
    pub fn is_execution(&self) -> bool {
        matches!(self, NodeKind::Execution { .. })
    }
}

/// The flavour of a checkpoint node.
///
/// Each flavour maps to exactly one `awaiting_*` status and one
/// approved/rejected status pair, closing the status enumeration at the type
/// level instead of comparing strings at call sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Generic configuration review (extracted config, recommended setup).
    ConfigReview,
    /// Algorithm/category selection review.
    AlgorithmSelection,
    /// Review of the applied preprocessing techniques.
    PreprocessingReview,
}

impl CheckpointKind {
    /// The status a run parks in while this checkpoint awaits a decision.
    #[must_use]
    pub fn awaiting_status(&self) -> RunStatus {
        match self {
            CheckpointKind::ConfigReview => RunStatus::AwaitingReview,
            CheckpointKind::AlgorithmSelection => RunStatus::AwaitingAlgorithmSelection,
            CheckpointKind::PreprocessingReview => RunStatus::AwaitingPreprocessingReview,
        }
    }

    /// The transient status persisted when a decision approves this checkpoint.
    #[must_use]
    pub fn approved_status(&self) -> RunStatus {
        match self {
            CheckpointKind::ConfigReview | CheckpointKind::AlgorithmSelection => {
                RunStatus::ReviewApproved
            }
            CheckpointKind::PreprocessingReview => RunStatus::PreprocessingApproved,
        }
    }

    /// The transient status persisted when a decision rejects this checkpoint.
    #[must_use]
    pub fn rejected_status(&self) -> RunStatus {
        match self {
            CheckpointKind::ConfigReview | CheckpointKind::AlgorithmSelection => {
                RunStatus::ReviewRejected
            }
            CheckpointKind::PreprocessingReview => RunStatus::PreprocessingRejected,
        }
    }

    /// Config-type checkpoints rework the upstream recommendation node on
    /// rejection; preprocessing checkpoints re-enter their own segment.
    #[must_use]
    pub fn is_config_type(&self) -> bool {
        matches!(
            self,
            CheckpointKind::ConfigReview | CheckpointKind::AlgorithmSelection
        )
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointKind::ConfigReview => write!(f, "config_review"),
            CheckpointKind::AlgorithmSelection => write!(f, "algorithm_selection"),
            CheckpointKind::PreprocessingReview => write!(f, "preprocessing_review"),
        }
    }
}
