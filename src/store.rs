//! Durable keyed storage for pipeline runs.
//!
//! [`RunStore`] is the single source of truth for a run's current state.
//! Updates carry the caller's expected revision and fail with
//! [`StoreError::Conflict`] when another writer got there first; the engine
//! retries conflicts transparently with a freshly loaded run. This gives
//! linearizable read-modify-write per run id without a separate lock
//! service.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::run::PipelineRun;
use crate::types::RunId;

/// Storage-layer errors.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("run not found: {run_id}")]
    #[diagnostic(code(stageloop::store::not_found))]
    NotFound { run_id: RunId },

    #[error("run already exists: {run_id}")]
    #[diagnostic(code(stageloop::store::already_exists))]
    AlreadyExists { run_id: RunId },

    #[error("revision conflict on run {run_id}: expected {expected}, found {found}")]
    #[diagnostic(
        code(stageloop::store::conflict),
        help("Another writer updated this run; reload and retry the transition.")
    )]
    Conflict {
        run_id: RunId,
        expected: u64,
        found: u64,
    },

    #[error("storage backend error: {0}")]
    #[diagnostic(code(stageloop::store::backend))]
    Backend(String),
}

/// Contract every run store implements.
///
/// `update` has compare-and-swap semantics: the write succeeds only when the
/// stored revision equals `expected_revision`, and the stored copy carries
/// `expected_revision + 1` afterwards.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a fresh run. Fails if the run id is already present.
    async fn create(&self, run: PipelineRun) -> Result<(), StoreError>;

    /// Load the current state of a run.
    async fn load(&self, run_id: &RunId) -> Result<PipelineRun, StoreError>;

    /// Conditionally replace a run's state (compare-and-swap on revision).
    async fn update(&self, run: PipelineRun, expected_revision: u64) -> Result<(), StoreError>;
}

/// In-process store backed by a mutex-guarded map.
///
/// Suitable for tests and single-process deployments; the [`RunStore`]
/// contract keeps the door open for durable keyed backends (see
/// [`crate::persistence`] for the flat serialized shape).
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<FxHashMap<RunId, PipelineRun>>,
}

impl InMemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs, for diagnostics and tests.
    pub async fn len(&self) -> usize {
        self.runs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.lock().await.is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: PipelineRun) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().await;
        if runs.contains_key(&run.run_id) {
            return Err(StoreError::AlreadyExists {
                run_id: run.run_id.clone(),
            });
        }
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<PipelineRun, StoreError> {
        self.runs
            .lock()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                run_id: run_id.clone(),
            })
    }

    async fn update(&self, mut run: PipelineRun, expected_revision: u64) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().await;
        let stored = runs
            .get(&run.run_id)
            .ok_or_else(|| StoreError::NotFound {
                run_id: run.run_id.clone(),
            })?;
        if stored.revision != expected_revision {
            return Err(StoreError::Conflict {
                run_id: run.run_id.clone(),
                expected: expected_revision,
                found: stored.revision,
            });
        }
        run.revision = expected_revision + 1;
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }
}
