//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stageloop::checkpoint::{CheckpointDecision, Decision};
use stageloop::context::{ContextPatch, RunContext, new_patch};
use stageloop::engine::GraphExecutor;
use stageloop::events::{MemorySink, TransitionLog};
use stageloop::projection::ProjectedStatus;
use stageloop::registry::ml_pipeline;
use stageloop::step::{StepError, StepExecutor, StepResult};
use stageloop::store::InMemoryRunStore;
use stageloop::types::{NodeId, RunId};

/// Per-node scripted behavior.
#[derive(Clone, Debug)]
pub enum Script {
    Ok(ContextPatch),
    Fail(String),
    /// Fail the first execution, succeed afterwards.
    FailOnce(String),
}

/// Step executor driven by a per-node script, recording execution order.
///
/// Nodes without a script succeed and patch `"<node>": "done"` into the
/// context so tests can assert what ran.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<FxHashMap<String, Script>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, node: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(node.to_string(), script);
        self
    }

    pub fn ok_with(self, node: &str, patch: ContextPatch) -> Self {
        self.script(node, Script::Ok(patch))
    }

    pub fn fail(self, node: &str, message: &str) -> Self {
        self.script(node, Script::Fail(message.to_string()))
    }

    pub fn fail_once(self, node: &str, message: &str) -> Self {
        self.script(node, Script::FailOnce(message.to_string()))
    }

    /// Node ids in execution order, including repeats from rework cycles.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn execution_count(&self, node: &str) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == node)
            .count()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _run_id: &RunId,
        node: &NodeId,
        _context: &RunContext,
    ) -> Result<StepResult, StepError> {
        self.executed.lock().unwrap().push(node.as_str().to_string());
        let script = self.scripts.lock().unwrap().get(node.as_str()).cloned();
        Ok(match script {
            Some(Script::Ok(patch)) => StepResult::ok_with(patch),
            Some(Script::Fail(message)) => StepResult::failed(message),
            Some(Script::FailOnce(message)) => {
                self.scripts
                    .lock()
                    .unwrap()
                    .insert(node.as_str().to_string(), Script::Ok(new_patch()));
                StepResult::failed(message)
            }
            None => {
                let mut patch = new_patch();
                patch.insert(node.as_str().to_string(), json!("done"));
                StepResult::ok_with(patch)
            }
        })
    }
}

/// An executor that sleeps past any short timeout on the given node.
pub struct SlowExecutor {
    pub slow_node: String,
    pub delay: Duration,
}

#[async_trait]
impl StepExecutor for SlowExecutor {
    async fn execute(
        &self,
        _run_id: &RunId,
        node: &NodeId,
        _context: &RunContext,
    ) -> Result<StepResult, StepError> {
        if node.as_str() == self.slow_node {
            tokio::time::sleep(self.delay).await;
        }
        Ok(StepResult::ok())
    }
}

pub struct Harness {
    pub engine: GraphExecutor,
    pub executor: Arc<ScriptedExecutor>,
    pub store: Arc<InMemoryRunStore>,
    pub sink: MemorySink,
    pub log: TransitionLog,
}

/// Standard-pipeline engine over an in-memory store and a memory-sink
/// transition log.
pub fn harness(executor: ScriptedExecutor) -> Harness {
    let executor = Arc::new(executor);
    let store = Arc::new(InMemoryRunStore::new());
    let sink = MemorySink::new();
    let log = TransitionLog::with_sink(sink.clone());
    log.listen();
    let engine = GraphExecutor::new(Arc::new(ml_pipeline()), store.clone(), executor.clone())
        .with_emitter(log.emitter());
    Harness {
        engine,
        executor,
        store,
        sink,
        log,
    }
}

/// An approve decision answering every pending question.
pub fn approve(run: &ProjectedStatus) -> CheckpointDecision {
    let answers: ContextPatch = run
        .pending_input
        .as_ref()
        .map(|pending| {
            pending
                .questions
                .iter()
                .map(|q| (q.id.clone(), json!("ok")))
                .collect()
        })
        .unwrap_or_default();
    CheckpointDecision::new(run.run_id.clone(), Decision::Approve).with_answers(answers)
}

pub fn reject(run: &ProjectedStatus) -> CheckpointDecision {
    CheckpointDecision::new(run.run_id.clone(), Decision::Reject)
}
