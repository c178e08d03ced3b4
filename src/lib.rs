//! # Stageloop: Resumable Pipeline Orchestration with Review Checkpoints
//!
//! Stageloop drives long-lived, multi-stage data pipelines through a
//! declarative node graph with human-in-the-loop checkpoints, conditional
//! branching, and rework cycles. Every transition is persisted before it is
//! observable, so a run survives process restarts and resumes exactly where
//! it parked.
//!
//! ## Core Concepts
//!
//! - **Node graph**: a [`registry::NodeRegistry`] of execution, checkpoint,
//!   and branch nodes with validated routing
//! - **Run**: a [`run::PipelineRun`] aggregate owned by a
//!   [`store::RunStore`], serialized per run id by revision CAS
//! - **Engine**: the [`engine::GraphExecutor`] run-to-next-pause loop
//! - **Checkpoints**: decisions (approve, edit, reject, cancel) applied in
//!   two persisted phases by the [`checkpoint::CheckpointCoordinator`]
//! - **Observation**: a best-effort [`events::TransitionLog`] plus the
//!   [`projection::StatusProjector`] read side
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use stageloop::checkpoint::{CheckpointDecision, Decision};
//! use stageloop::engine::GraphExecutor;
//! use stageloop::registry::ml_pipeline;
//! use stageloop::store::InMemoryRunStore;
//!
//! # async fn demo(step_executor: Arc<dyn stageloop::step::StepExecutor>) -> miette::Result<()> {
//! let engine = GraphExecutor::new(
//!     Arc::new(ml_pipeline()),
//!     Arc::new(InMemoryRunStore::new()),
//!     step_executor,
//! );
//!
//! // Create, then drive to the first checkpoint.
//! let run = engine.create_run(json!({"prompt": "classify churn"})).await?;
//! let parked = engine.advance(&run.run_id).await?;
//! println!("waiting at {} in {}", parked.current_node, parked.status);
//!
//! // Approve with answers to the pending questions.
//! let decision = CheckpointDecision::new(run.run_id.clone(), Decision::Approve)
//!     .with_answers(parked.pending_input.unwrap().questions.iter()
//!         .map(|q| (q.id.clone(), json!("ok")))
//!         .collect());
//! let resumed = engine.submit_decision(&decision).await?;
//! println!("now at {} in {}", resumed.current_node, resumed.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Semantics
//!
//! A failed execution node fails the run, with two carve-outs: a
//! soft-failable node records its failure and the run continues, and a hard
//! failure inside the preprocessing segment parks the run at the segment's
//! checkpoint for a retry-or-cancel decision. Rejected reviews route to the
//! checkpoint's rework target; rejections beyond the configured cap
//! escalate to `failed`.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod events;
pub mod persistence;
pub mod projection;
pub mod registry;
pub mod run;
pub mod services;
pub mod status;
pub mod step;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;
