//! The standard ML data-pipeline graph.
//!
//! Prompt analysis and data profiling feed an algorithm-category
//! recommendation; a configuration review checkpoint gates the proposed
//! setup; a branch routes into the supervised or unsupervised preprocessing
//! arm; a second checkpoint reviews the applied techniques before training
//! and evaluation.

use super::{NodeRegistry, RegistryBuilder};
use crate::types::CheckpointKind;

/// Node identifiers of the standard pipeline.
pub mod nodes {
    pub const ANALYZE_PROMPT: &str = "analyze_prompt";
    pub const PROFILE_DATA: &str = "profile_data";
    pub const PREDICT_CATEGORY: &str = "predict_category";
    pub const GENERATE_QUESTIONS: &str = "generate_questions";
    pub const CONFIG_REVIEW: &str = "config_review";
    pub const SELECT_PATH: &str = "select_path";
    pub const CLEAN_DATA: &str = "clean_data";
    pub const IMPUTE_MISSING: &str = "impute_missing";
    pub const ENCODE_CATEGORICALS: &str = "encode_categoricals";
    pub const CLEAN_OUTLIERS: &str = "clean_outliers";
    pub const SCALE_FEATURES: &str = "scale_features";
    pub const PREPROCESSING_REVIEW: &str = "preprocessing_review";
    pub const TRAIN_MODEL: &str = "train_model";
    pub const EVALUATE_MODEL: &str = "evaluate_model";
}

/// Build the standard pipeline with one-step config rejection.
#[must_use]
pub fn ml_pipeline() -> NodeRegistry {
    ml_pipeline_with(false)
}

/// Build the standard pipeline, choosing the config-review rejection flow.
///
/// `two_step_reject = true` parks a rejected review at
/// `review_rejected_awaiting_decision` until the reviewer confirms
/// retry-or-cancel; `false` reworks immediately.
#[must_use]
pub fn ml_pipeline_with(two_step_reject: bool) -> NodeRegistry {
    use nodes::*;

    RegistryBuilder::new()
        .execution(ANALYZE_PROMPT)
        .soft_execution(PROFILE_DATA)
        .execution(PREDICT_CATEGORY)
        .execution(GENERATE_QUESTIONS)
        .checkpoint(
            CONFIG_REVIEW,
            CheckpointKind::ConfigReview,
            PREDICT_CATEGORY,
            two_step_reject,
        )
        .branch(SELECT_PATH, &[CLEAN_DATA, CLEAN_OUTLIERS], |ctx| {
            // Absent flag defaults to the supervised arm; the branch stays
            // total over every reachable context.
            if ctx.flag("supervised").unwrap_or(true) {
                Some(CLEAN_DATA.into())
            } else {
                Some(CLEAN_OUTLIERS.into())
            }
        })
        .execution(CLEAN_DATA)
        .execution(IMPUTE_MISSING)
        .execution(ENCODE_CATEGORICALS)
        .execution(CLEAN_OUTLIERS)
        .execution(SCALE_FEATURES)
        .checkpoint(
            PREPROCESSING_REVIEW,
            CheckpointKind::PreprocessingReview,
            SELECT_PATH,
            false,
        )
        .execution(TRAIN_MODEL)
        .execution(EVALUATE_MODEL)
        .edge(ANALYZE_PROMPT, PROFILE_DATA)
        .edge(PROFILE_DATA, PREDICT_CATEGORY)
        .edge(PREDICT_CATEGORY, GENERATE_QUESTIONS)
        .edge(GENERATE_QUESTIONS, CONFIG_REVIEW)
        .edge(CONFIG_REVIEW, SELECT_PATH)
        .edge(CLEAN_DATA, IMPUTE_MISSING)
        .edge(IMPUTE_MISSING, ENCODE_CATEGORICALS)
        .edge(ENCODE_CATEGORICALS, PREPROCESSING_REVIEW)
        .edge(CLEAN_OUTLIERS, SCALE_FEATURES)
        .edge(SCALE_FEATURES, PREPROCESSING_REVIEW)
        .edge(PREPROCESSING_REVIEW, TRAIN_MODEL)
        .edge(TRAIN_MODEL, EVALUATE_MODEL)
        .terminal(EVALUATE_MODEL)
        .preprocessing_segment(&[
            CLEAN_DATA,
            IMPUTE_MISSING,
            ENCODE_CATEGORICALS,
            CLEAN_OUTLIERS,
            SCALE_FEATURES,
        ])
        .entry(ANALYZE_PROMPT)
        .build()
        .expect("standard pipeline graph is valid")
}
