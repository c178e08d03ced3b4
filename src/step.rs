//! The execution seam between the engine and side-effecting node work.
//!
//! The engine never knows what an execution node does; it hands the node id
//! and a read-only view of the context to a [`StepExecutor`] and gets back a
//! [`StepResult`]. Failure is data, not an `Err`: an executor returning
//! `Err` indicates infrastructure trouble at the seam itself, while a node
//! that ran and failed reports `StepResult::failed`.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::context::{ContextPatch, RunContext, new_patch};
use crate::types::{NodeId, RunId};

/// The outcome of executing one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepResult {
    pub ok: bool,
    /// Context keys the node produced; merged atomically with the run's
    /// transition when `ok`.
    pub context_patch: ContextPatch,
    /// Human-readable failure description when `!ok`.
    pub error: Option<String>,
}

impl StepResult {
    /// Successful step with no context output.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            context_patch: new_patch(),
            error: None,
        }
    }

    /// Successful step producing a context patch.
    #[must_use]
    pub fn ok_with(context_patch: ContextPatch) -> Self {
        Self {
            ok: true,
            context_patch,
            error: None,
        }
    }

    /// Failed step. The patch is discarded; only the error survives.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            context_patch: new_patch(),
            error: Some(error.into()),
        }
    }
}

/// Infrastructure failure at the execution seam (not a node failure).
#[derive(Debug, Error, Diagnostic)]
#[error("step executor error on node {node}: {message}")]
#[diagnostic(code(stageloop::step::executor))]
pub struct StepError {
    pub node: NodeId,
    pub message: String,
}

impl StepError {
    #[must_use]
    pub fn new(node: NodeId, message: impl Into<String>) -> Self {
        Self {
            node,
            message: message.into(),
        }
    }
}

/// Executes the side-effecting work of one execution node.
///
/// Implementations must be idempotent-tolerant: a crash between execution
/// and the persisted transition means the node may run again on resume.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        run_id: &RunId,
        node: &NodeId,
        context: &RunContext,
    ) -> Result<StepResult, StepError>;
}
