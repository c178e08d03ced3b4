//! Graph construction validation and branch totality.

use proptest::prelude::*;
use serde_json::json;

use stageloop::context::RunContext;
use stageloop::registry::{RegistryBuilder, RegistryError, ml_pipeline, nodes};
use stageloop::types::{CheckpointKind, NodeId};

#[test]
fn edge_to_unregistered_node_fails_build() {
    let err = RegistryBuilder::new()
        .execution("a")
        .edge("a", "ghost")
        .entry("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnknownNode { .. }));
}

#[test]
fn node_without_successor_fails_build() {
    let err = RegistryBuilder::new()
        .execution("a")
        .execution("b")
        .edge("a", "b")
        .entry("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, RegistryError::MissingSuccessor { .. }));
}

#[test]
fn missing_entry_fails_build() {
    let err = RegistryBuilder::new()
        .execution("a")
        .terminal("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, RegistryError::MissingEntry));
}

#[test]
fn duplicate_node_fails_build() {
    let err = RegistryBuilder::new()
        .execution("a")
        .soft_execution("a")
        .terminal("a")
        .entry("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateNode { .. }));
}

#[test]
fn checkpoint_rework_target_must_exist() {
    let err = RegistryBuilder::new()
        .execution("a")
        .checkpoint("review", CheckpointKind::ConfigReview, "ghost", false)
        .edge("a", "review")
        .terminal("review")
        .entry("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnknownNode { .. }));
}

#[test]
fn branch_arm_outside_domain_is_caught_at_build() {
    let err = RegistryBuilder::new()
        .execution("a")
        .branch("b", &["ghost"], |_| Some(NodeId::from("ghost")))
        .edge("a", "b")
        .entry("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnknownNode { .. }));
}

#[test]
fn undefined_branch_is_a_configuration_error() {
    let registry = RegistryBuilder::new()
        .execution("a")
        .branch("b", &["a"], |ctx| ctx.flag("go").map(|_| NodeId::from("a")))
        .edge("a", "b")
        .entry("a")
        .build()
        .unwrap();
    let err = registry
        .successor_of(&NodeId::from("b"), &RunContext::default())
        .unwrap_err();
    assert!(matches!(err, RegistryError::UndefinedBranch { .. }));
}

proptest! {
    /// The standard pipeline's branch is total: any context resolves to an
    /// arm inside the declared domain.
    #[test]
    fn select_path_is_total_over_arbitrary_contexts(
        supervised in proptest::option::of(any::<bool>()),
        noise_keys in proptest::collection::vec("[a-z]{1,8}", 0..5),
    ) {
        let registry = ml_pipeline();
        let mut ctx = RunContext::default();
        if let Some(flag) = supervised {
            ctx.insert("supervised", json!(flag));
        }
        for key in noise_keys {
            ctx.insert(key, json!("noise"));
        }

        let arm = registry
            .successor_of(&NodeId::from(nodes::SELECT_PATH), &ctx)
            .unwrap()
            .unwrap();
        prop_assert!(
            arm == NodeId::from(nodes::CLEAN_DATA) || arm == NodeId::from(nodes::CLEAN_OUTLIERS)
        );

        // The walk from entry terminates for every context.
        let count = registry.reachable_execution_count(&ctx).unwrap();
        prop_assert!(count == 8 || count == 9);
    }
}
