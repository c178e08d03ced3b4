//! The declarative pipeline node graph.
//!
//! A [`NodeRegistry`] is the single place the graph topology lives: node
//! kinds, each node's successor (fixed or context-dependent), checkpoint
//! policies, and preprocessing segment membership. It is pure and
//! side-effect-free; branch functions must be total over every reachable
//! context, and an undefined branch result is a configuration error, never a
//! runtime retry.

mod builder;
mod ml_pipeline;

pub use builder::RegistryBuilder;
pub use ml_pipeline::{ml_pipeline, ml_pipeline_with, nodes};

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::context::RunContext;
use crate::types::{CheckpointKind, NodeId, NodeKind};

/// Pure successor function for a branch node.
///
/// Returns `None` when the context does not map to any arm; the registry
/// surfaces that as [`RegistryError::UndefinedBranch`].
pub type BranchFn = dyn Fn(&RunContext) -> Option<NodeId> + Send + Sync;

/// How a node routes to its successor.
#[derive(Clone)]
pub enum Successor {
    /// Unconditional successor.
    Fixed(NodeId),
    /// Context-dependent successor; `domain` lists every arm the function
    /// may return, for build-time validation and reachability counting.
    Branch {
        arms: Arc<BranchFn>,
        domain: Vec<NodeId>,
    },
    /// No successor: completing this node completes the run.
    Terminal,
}

impl std::fmt::Debug for Successor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Successor::Fixed(to) => f.debug_tuple("Fixed").field(to).finish(),
            Successor::Branch { domain, .. } => {
                f.debug_struct("Branch").field("domain", domain).finish()
            }
            Successor::Terminal => f.write_str("Terminal"),
        }
    }
}

/// Static description of one node.
#[derive(Clone, Debug)]
pub struct NodeSpec {
    pub id: NodeId,
    pub kind: NodeKind,
}

/// Per-checkpoint decision policy.
#[derive(Clone, Debug)]
pub struct CheckpointPolicy {
    pub kind: CheckpointKind,
    /// Where a rejection routes the run: the upstream recommendation node
    /// for config-type checkpoints, the segment entry for preprocessing.
    pub rework_target: NodeId,
    /// Two-step rejection parks at `review_rejected_awaiting_decision`
    /// instead of reworking immediately.
    pub two_step_reject: bool,
}

/// Errors raised while building or consulting a registry.
///
/// These indicate bugs in the node graph, not bad input data, and are
/// surfaced as internal-consistency failures distinct from pipeline
/// failures.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("unknown node: {node}")]
    #[diagnostic(
        code(stageloop::registry::unknown_node),
        help("Every node referenced by an edge, policy, or run must be registered.")
    )]
    UnknownNode { node: NodeId },

    #[error("duplicate node: {node}")]
    #[diagnostic(code(stageloop::registry::duplicate_node))]
    DuplicateNode { node: NodeId },

    #[error("no entry node configured")]
    #[diagnostic(
        code(stageloop::registry::missing_entry),
        help("Call RegistryBuilder::entry before build.")
    )]
    MissingEntry,

    #[error("node {node} has no successor")]
    #[diagnostic(
        code(stageloop::registry::missing_successor),
        help("Every node needs an edge, a branch, or an explicit terminal marker.")
    )]
    MissingSuccessor { node: NodeId },

    #[error("branch node {node} returned no successor for the given context")]
    #[diagnostic(
        code(stageloop::registry::undefined_branch),
        help("Branch functions must be total: every reachable context maps to exactly one arm.")
    )]
    UndefinedBranch { node: NodeId },

    #[error("cycle detected while walking the graph at {node}")]
    #[diagnostic(code(stageloop::registry::cycle))]
    Cycle { node: NodeId },
}

/// The compiled, immutable node graph.
#[derive(Clone, Debug)]
pub struct NodeRegistry {
    entry: NodeId,
    specs: FxHashMap<NodeId, NodeSpec>,
    successors: FxHashMap<NodeId, Successor>,
    policies: FxHashMap<NodeId, CheckpointPolicy>,
    preprocessing: Vec<NodeId>,
    preprocessing_checkpoint: Option<NodeId>,
}

impl NodeRegistry {
    pub(crate) fn from_parts(
        entry: NodeId,
        specs: FxHashMap<NodeId, NodeSpec>,
        successors: FxHashMap<NodeId, Successor>,
        policies: FxHashMap<NodeId, CheckpointPolicy>,
        preprocessing: Vec<NodeId>,
    ) -> Self {
        let preprocessing_checkpoint = policies
            .iter()
            .find(|(_, p)| p.kind == CheckpointKind::PreprocessingReview)
            .map(|(id, _)| id.clone());
        Self {
            entry,
            specs,
            successors,
            policies,
            preprocessing,
            preprocessing_checkpoint,
        }
    }

    /// The graph's entry node, where every fresh run starts.
    #[must_use]
    pub fn entry(&self) -> &NodeId {
        &self.entry
    }

    /// Look up a node's kind.
    pub fn kind_of(&self, node: &NodeId) -> Result<&NodeKind, RegistryError> {
        self.specs
            .get(node)
            .map(|s| &s.kind)
            .ok_or_else(|| RegistryError::UnknownNode { node: node.clone() })
    }

    /// Resolve the successor of `node` under `context`.
    ///
    /// `Ok(None)` means the node is terminal: completing it completes the
    /// run. Branch nodes resolve through their pure arm function; an
    /// unresolvable branch is a configuration error.
    pub fn successor_of(
        &self,
        node: &NodeId,
        context: &RunContext,
    ) -> Result<Option<NodeId>, RegistryError> {
        match self.successors.get(node) {
            None => Err(RegistryError::UnknownNode { node: node.clone() }),
            Some(Successor::Terminal) => Ok(None),
            Some(Successor::Fixed(to)) => Ok(Some(to.clone())),
            Some(Successor::Branch { arms, .. }) => arms(context)
                .map(Some)
                .ok_or_else(|| RegistryError::UndefinedBranch { node: node.clone() }),
        }
    }

    /// Whether completing this node completes the run.
    #[must_use]
    pub fn is_terminal(&self, node: &NodeId) -> bool {
        matches!(self.successors.get(node), Some(Successor::Terminal))
    }

    /// The decision policy for a checkpoint node, if the node is one.
    #[must_use]
    pub fn checkpoint_policy(&self, node: &NodeId) -> Option<&CheckpointPolicy> {
        self.policies.get(node)
    }

    /// Nodes belonging to the preprocessing segment (re-attempted as a unit
    /// on rejection).
    #[must_use]
    pub fn preprocessing_nodes(&self) -> &[NodeId] {
        &self.preprocessing
    }

    #[must_use]
    pub fn is_preprocessing_node(&self, node: &NodeId) -> bool {
        self.preprocessing.contains(node)
    }

    /// The checkpoint that reviews the preprocessing segment, if configured.
    #[must_use]
    pub fn preprocessing_checkpoint(&self) -> Option<&NodeId> {
        self.preprocessing_checkpoint.as_ref()
    }

    /// Number of execution nodes reachable from the entry under `context`.
    ///
    /// Branch nodes change the denominator: the supervised and unsupervised
    /// arms have different node counts, so the projector recomputes this per
    /// run. Walks the graph following `successor_of`; a revisited node stops
    /// the walk (rework cycles are decision-driven, not structural).
    pub fn reachable_execution_count(&self, context: &RunContext) -> Result<usize, RegistryError> {
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut count = 0usize;
        let mut cursor = Some(self.entry.clone());
        while let Some(node) = cursor {
            if !seen.insert(node.clone()) {
                return Err(RegistryError::Cycle { node });
            }
            if self.kind_of(&node)?.is_execution() {
                count += 1;
            }
            cursor = self.successor_of(&node, context)?;
        }
        Ok(count)
    }

    /// All registered node ids, for diagnostics and tests.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.specs.keys()
    }
}
