//! Fluent builder for [`NodeRegistry`] with build-time validation.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::{BranchFn, CheckpointPolicy, NodeRegistry, NodeSpec, RegistryError, Successor};
use crate::types::{NodeId, NodeKind};

/// Builder for constructing a validated [`NodeRegistry`].
///
/// `build()` rejects graphs with unknown edge targets, unregistered entry
/// nodes, or checkpoint policies pointing at missing rework targets, so a
/// misconfigured graph fails at construction rather than mid-run.
///
/// # Examples
///
/// ```rust
/// use stageloop::registry::RegistryBuilder;
/// use stageloop::types::{CheckpointKind, NodeKind};
///
/// let registry = RegistryBuilder::new()
///     .execution("fetch")
///     .execution("transform")
///     .checkpoint(
///         "review",
///         CheckpointKind::ConfigReview,
///         "fetch", // rework target
///         false,   // one-step reject
///     )
///     .edge("fetch", "transform")
///     .edge("transform", "review")
///     .edge("review", "publish")
///     .execution("publish")
///     .terminal("publish")
///     .entry("fetch")
///     .build()
///     .unwrap();
///
/// assert_eq!(registry.entry().as_str(), "fetch");
/// ```
pub struct RegistryBuilder {
    entry: Option<NodeId>,
    specs: FxHashMap<NodeId, NodeSpec>,
    order: Vec<NodeId>,
    successors: FxHashMap<NodeId, Successor>,
    policies: FxHashMap<NodeId, CheckpointPolicy>,
    preprocessing: Vec<NodeId>,
    duplicate: Option<NodeId>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entry: None,
            specs: FxHashMap::default(),
            order: Vec::new(),
            successors: FxHashMap::default(),
            policies: FxHashMap::default(),
            preprocessing: Vec::new(),
            duplicate: None,
        }
    }

    fn add(mut self, id: NodeId, kind: NodeKind) -> Self {
        if self.specs.contains_key(&id) {
            self.duplicate.get_or_insert(id);
            return self;
        }
        self.order.push(id.clone());
        self.specs.insert(id.clone(), NodeSpec { id, kind });
        self
    }

    /// Register an execution node (hard failure fails the run).
    #[must_use]
    pub fn execution(self, id: impl Into<NodeId>) -> Self {
        self.add(id.into(), NodeKind::execution())
    }

    /// Register a soft-failable execution node (failure is recorded and the
    /// run continues).
    #[must_use]
    pub fn soft_execution(self, id: impl Into<NodeId>) -> Self {
        self.add(id.into(), NodeKind::soft_execution())
    }

    /// Register a checkpoint node with its decision policy.
    #[must_use]
    pub fn checkpoint(
        mut self,
        id: impl Into<NodeId>,
        kind: crate::types::CheckpointKind,
        rework_target: impl Into<NodeId>,
        two_step_reject: bool,
    ) -> Self {
        let id = id.into();
        self.policies.insert(
            id.clone(),
            CheckpointPolicy {
                kind,
                rework_target: rework_target.into(),
                two_step_reject,
            },
        );
        self.add(id, NodeKind::Checkpoint(kind))
    }

    /// Register a branch node with its pure arm function and declared domain.
    #[must_use]
    pub fn branch<F>(mut self, id: impl Into<NodeId>, domain: &[&str], arms: F) -> Self
    where
        F: Fn(&crate::context::RunContext) -> Option<NodeId> + Send + Sync + 'static,
    {
        let id = id.into();
        self.successors.insert(
            id.clone(),
            Successor::Branch {
                arms: Arc::new(arms) as Arc<BranchFn>,
                domain: domain.iter().map(|s| NodeId::from(*s)).collect(),
            },
        );
        self.add(id, NodeKind::Branch)
    }

    /// Add an unconditional edge.
    #[must_use]
    pub fn edge(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        self.successors
            .insert(from.into(), Successor::Fixed(to.into()));
        self
    }

    /// Mark a node as terminal: completing it completes the run.
    #[must_use]
    pub fn terminal(mut self, node: impl Into<NodeId>) -> Self {
        self.successors.insert(node.into(), Successor::Terminal);
        self
    }

    /// Declare the preprocessing segment (re-attempted as a unit on
    /// rejection).
    #[must_use]
    pub fn preprocessing_segment(mut self, nodes: &[&str]) -> Self {
        self.preprocessing = nodes.iter().map(|s| NodeId::from(*s)).collect();
        self
    }

    /// Set the graph entry node.
    #[must_use]
    pub fn entry(mut self, node: impl Into<NodeId>) -> Self {
        self.entry = Some(node.into());
        self
    }

    /// Validate and compile the registry.
    pub fn build(self) -> Result<NodeRegistry, RegistryError> {
        if let Some(node) = self.duplicate {
            return Err(RegistryError::DuplicateNode { node });
        }
        let entry = self.entry.ok_or(RegistryError::MissingEntry)?;
        if !self.specs.contains_key(&entry) {
            return Err(RegistryError::UnknownNode { node: entry });
        }

        // Every node needs exactly one routing entry, and every target must
        // be registered.
        for id in &self.order {
            match self.successors.get(id) {
                None => {
                    return Err(RegistryError::MissingSuccessor { node: id.clone() });
                }
                Some(Successor::Fixed(to)) => {
                    if !self.specs.contains_key(to) {
                        return Err(RegistryError::UnknownNode { node: to.clone() });
                    }
                }
                Some(Successor::Branch { domain, .. }) => {
                    for arm in domain {
                        if !self.specs.contains_key(arm) {
                            return Err(RegistryError::UnknownNode { node: arm.clone() });
                        }
                    }
                }
                Some(Successor::Terminal) => {}
            }
        }

        for policy in self.policies.values() {
            if !self.specs.contains_key(&policy.rework_target) {
                return Err(RegistryError::UnknownNode {
                    node: policy.rework_target.clone(),
                });
            }
        }
        for node in &self.preprocessing {
            if !self.specs.contains_key(node) {
                return Err(RegistryError::UnknownNode { node: node.clone() });
            }
        }

        Ok(NodeRegistry::from_parts(
            entry,
            self.specs,
            self.successors,
            self.policies,
            self.preprocessing,
        ))
    }
}
