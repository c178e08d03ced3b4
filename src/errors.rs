//! The engine-facing error ladder.
//!
//! Layer-local errors ([`StoreError`](crate::store::StoreError),
//! [`RegistryError`](crate::registry::RegistryError)) convert into
//! [`EngineError`] at the engine boundary, so callers match on one enum and
//! still get the underlying diagnostic chain through `source()`.

use miette::Diagnostic;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::status::RunStatus;
use crate::store::StoreError;
use crate::types::RunId;

/// Errors returned by the [`GraphExecutor`](crate::engine::GraphExecutor)
/// public surface.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("run not found: {run_id}")]
    #[diagnostic(code(stageloop::engine::not_found))]
    NotFound { run_id: RunId },

    /// The submitted decision does not apply to the run's current state.
    /// The run is left untouched.
    #[error("invalid decision for run {run_id} in status {status}: {reason}")]
    #[diagnostic(
        code(stageloop::engine::invalid_decision),
        help("Fetch the run's pending_input and submit a decision matching it.")
    )]
    InvalidDecision {
        run_id: RunId,
        status: RunStatus,
        reason: String,
    },

    /// The node graph itself is inconsistent (undefined branch, unknown
    /// node). Distinct from a pipeline failure: the run is not failed.
    #[error("pipeline graph configuration error")]
    #[diagnostic(code(stageloop::engine::configuration))]
    Configuration(#[from] RegistryError),

    #[error("run store error")]
    #[diagnostic(code(stageloop::engine::store))]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn invalid_decision(
        run_id: &RunId,
        status: RunStatus,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidDecision {
            run_id: run_id.clone(),
            status,
            reason: reason.into(),
        }
    }
}
