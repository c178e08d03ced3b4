//! Domain service seams behind the standard pipeline's execution nodes.
//!
//! The engine sees only the [`StepExecutor`](crate::step::StepExecutor)
//! seam; [`MlStepExecutor`] dispatches each node of the standard graph to a
//! recommendation service (prompt analysis through question generation) or a
//! technique service (preprocessing, training, evaluation). Service errors
//! become failed step results, so node failure policy stays with the engine.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

use crate::checkpoint::Question;
use crate::context::{ContextPatch, RunContext, new_patch};
use crate::registry::nodes;
use crate::step::{StepError, StepExecutor, StepResult};
use crate::types::{NodeId, RunId};

/// Context key holding the ordered list of applied technique names.
pub const APPLIED_TECHNIQUES_KEY: &str = "applied_techniques";

/// Errors raised by the domain services.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    #[diagnostic(code(stageloop::services::unavailable))]
    Unavailable(String),

    #[error("invalid input: {0}")]
    #[diagnostic(code(stageloop::services::invalid_input))]
    InvalidInput(String),
}

/// What prompt analysis extracted from the user's request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptAnalysis {
    pub intent: String,
    /// Whether the request looks like a supervised learning problem; drives
    /// the preprocessing branch.
    pub supervised: bool,
}

/// Summary statistics of the attached dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    pub row_count: u64,
    pub missing_ratio: f64,
    pub categorical_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
}

/// The recommended algorithm category and candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    /// Opaque confidence payload from the recommendation backend; passed
    /// through to the context and reviewer without interpretation.
    pub confidence: Value,
    pub algorithms: Vec<String>,
    pub rationale: String,
}

/// One preprocessing technique as applied to the dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedTechnique {
    pub name: String,
    pub details: Value,
}

/// Training output surfaced to the evaluation node and the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model: String,
    pub metrics: Value,
}

/// Final evaluation of the trained model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: Value,
    pub passed: bool,
}

/// Produces the recommendation artifacts of the pipeline's first phase.
///
/// `predict_category` receives the full context so a rework cycle can feed
/// reviewer feedback back into the next recommendation.
#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn analyze_prompt(&self, prompt: &str) -> Result<PromptAnalysis, ServiceError>;

    async fn profile_data(&self, context: &RunContext) -> Result<DataProfile, ServiceError>;

    async fn predict_category(&self, context: &RunContext) -> Result<Recommendation, ServiceError>;

    async fn generate_questions(
        &self,
        context: &RunContext,
    ) -> Result<Vec<Question>, ServiceError>;
}

/// Applies preprocessing techniques and runs training/evaluation.
#[async_trait]
pub trait TechniqueService: Send + Sync {
    /// Apply the technique named by the node id (e.g. `impute_missing`).
    async fn apply(
        &self,
        technique: &str,
        context: &RunContext,
    ) -> Result<AppliedTechnique, ServiceError>;

    async fn train(&self, context: &RunContext) -> Result<TrainingReport, ServiceError>;

    async fn evaluate(&self, context: &RunContext) -> Result<EvaluationReport, ServiceError>;
}

/// [`StepExecutor`] for the standard ML pipeline graph.
pub struct MlStepExecutor {
    recommendations: Arc<dyn RecommendationService>,
    techniques: Arc<dyn TechniqueService>,
}

impl MlStepExecutor {
    #[must_use]
    pub fn new(
        recommendations: Arc<dyn RecommendationService>,
        techniques: Arc<dyn TechniqueService>,
    ) -> Self {
        Self {
            recommendations,
            techniques,
        }
    }

    async fn run_node(
        &self,
        node: &NodeId,
        context: &RunContext,
    ) -> Result<ContextPatch, ServiceError> {
        let mut patch = new_patch();
        match node.as_str() {
            nodes::ANALYZE_PROMPT => {
                let prompt = context.str_value("prompt").unwrap_or_default();
                let analysis = self.recommendations.analyze_prompt(prompt).await?;
                patch.insert("intent".to_string(), json!(analysis.intent));
                patch.insert("supervised".to_string(), json!(analysis.supervised));
            }
            nodes::PROFILE_DATA => {
                let profile = self.recommendations.profile_data(context).await?;
                patch.insert("data_profile".to_string(), json!(profile));
            }
            nodes::PREDICT_CATEGORY => {
                let rec = self.recommendations.predict_category(context).await?;
                patch.insert("category".to_string(), json!(rec.category));
                patch.insert("confidence".to_string(), rec.confidence);
                patch.insert("algorithms".to_string(), json!(rec.algorithms));
                patch.insert("rationale".to_string(), json!(rec.rationale));
            }
            nodes::GENERATE_QUESTIONS => {
                let questions = self.recommendations.generate_questions(context).await?;
                patch.insert("questions".to_string(), json!(questions));
            }
            nodes::TRAIN_MODEL => {
                let report = self.techniques.train(context).await?;
                patch.insert("training_report".to_string(), json!(report));
            }
            nodes::EVALUATE_MODEL => {
                let report = self.techniques.evaluate(context).await?;
                patch.insert("evaluation_report".to_string(), json!(report));
            }
            technique => {
                let applied = self.techniques.apply(technique, context).await?;
                let mut applied_so_far: Vec<String> = context
                    .get(APPLIED_TECHNIQUES_KEY)
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                applied_so_far.push(applied.name.clone());
                patch.insert(APPLIED_TECHNIQUES_KEY.to_string(), json!(applied_so_far));
                patch.insert(format!("technique:{}", applied.name), applied.details);
            }
        }
        Ok(patch)
    }
}

#[async_trait]
impl StepExecutor for MlStepExecutor {
    async fn execute(
        &self,
        run_id: &RunId,
        node: &NodeId,
        context: &RunContext,
    ) -> Result<StepResult, StepError> {
        match self.run_node(node, context).await {
            Ok(patch) => Ok(StepResult::ok_with(patch)),
            Err(err) => {
                tracing::warn!(run_id = %run_id, node = %node, error = %err, "step failed");
                Ok(StepResult::failed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRecommendations;

    #[async_trait]
    impl RecommendationService for FixedRecommendations {
        async fn analyze_prompt(&self, prompt: &str) -> Result<PromptAnalysis, ServiceError> {
            Ok(PromptAnalysis {
                intent: format!("train: {prompt}"),
                supervised: true,
            })
        }

        async fn profile_data(&self, _: &RunContext) -> Result<DataProfile, ServiceError> {
            Err(ServiceError::Unavailable("no dataset attached".into()))
        }

        async fn predict_category(&self, _: &RunContext) -> Result<Recommendation, ServiceError> {
            Ok(Recommendation {
                category: "classification".into(),
                confidence: json!(0.83),
                algorithms: vec!["random_forest".into()],
                rationale: "labelled target column".into(),
            })
        }

        async fn generate_questions(&self, _: &RunContext) -> Result<Vec<Question>, ServiceError> {
            Ok(vec![Question::new("target_column", "Which column is the target?")])
        }
    }

    struct FixedTechniques;

    #[async_trait]
    impl TechniqueService for FixedTechniques {
        async fn apply(
            &self,
            technique: &str,
            _: &RunContext,
        ) -> Result<AppliedTechnique, ServiceError> {
            Ok(AppliedTechnique {
                name: technique.to_string(),
                details: json!({}),
            })
        }

        async fn train(&self, _: &RunContext) -> Result<TrainingReport, ServiceError> {
            Ok(TrainingReport {
                model: "random_forest".into(),
                metrics: json!({"accuracy": 0.9}),
            })
        }

        async fn evaluate(&self, _: &RunContext) -> Result<EvaluationReport, ServiceError> {
            Ok(EvaluationReport {
                metrics: json!({"f1": 0.88}),
                passed: true,
            })
        }
    }

    fn executor() -> MlStepExecutor {
        MlStepExecutor::new(Arc::new(FixedRecommendations), Arc::new(FixedTechniques))
    }

    #[tokio::test]
    async fn analyze_prompt_patches_intent_and_branch_flag() {
        let mut ctx = RunContext::default();
        ctx.insert("prompt", json!("classify churn"));
        let result = executor()
            .execute(
                &RunId::from("r"),
                &NodeId::from(nodes::ANALYZE_PROMPT),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.context_patch.get("supervised"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn service_error_becomes_failed_step_not_err() {
        let result = executor()
            .execute(
                &RunId::from("r"),
                &NodeId::from(nodes::PROFILE_DATA),
                &RunContext::default(),
            )
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.error.as_deref().unwrap().contains("no dataset"));
    }

    #[tokio::test]
    async fn techniques_accumulate_in_context_order() {
        let mut ctx = RunContext::default();
        let first = executor()
            .execute(&RunId::from("r"), &NodeId::from(nodes::CLEAN_DATA), &ctx)
            .await
            .unwrap();
        ctx.merge(first.context_patch);

        let second = executor()
            .execute(
                &RunId::from("r"),
                &NodeId::from(nodes::IMPUTE_MISSING),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(
            second.context_patch.get(APPLIED_TECHNIQUES_KEY),
            Some(&json!(["clean_data", "impute_missing"]))
        );
    }
}
