//! Merge recovery
//!
//! A batch interrupted by a store failure converges, on re-run, to the same
//! committed state as a batch that never failed.

mod common;

use common::*;
use protocol_registry::store::memory::CommittedState;
use protocol_registry::{
    MemoryStore, MergeStatus, ProtocolRegistry, RegistryConfig, RegistryError, ReviewState, StoreOp,
};

/// 1.0.0 committed, 1.1.0 approved and waiting for merge
fn approved_refinement() -> (ProtocolRegistry<MemoryStore>, protocol_registry::SubmissionId) {
    let registry = memory_registry();
    commit(&registry, soil_moisture(8), "1.0.0", "");
    let id = registry
        .client()
        .push(soil_moisture_extending(7, "1.0.0"), soil(), v("1.1.0"), "narrow")
        .unwrap();
    registry.approve(&id, "reviewer").unwrap();
    (registry, id)
}

fn uninterrupted() -> CommittedState {
    let (registry, _) = approved_refinement();
    assert!(registry.on_merged().unwrap().is_settled());
    registry.store().snapshot()
}

fn recover_from(op: StoreOp) -> CommittedState {
    let (registry, id) = approved_refinement();
    registry.store().fail_once(op);

    let first = registry.on_merged().unwrap();
    assert_eq!(first.failed().len(), 1, "{:?} should fail the batch", op);
    assert_eq!(registry.reviews().get(&id).unwrap().state, ReviewState::Approved);

    let second = registry.on_merged().unwrap();
    assert_eq!(second.promoted().len(), 1, "re-run after {:?}: {:?}", op, second);
    assert!(registry.staging().is_empty());
    assert_eq!(registry.store().staged_len(), 0);
    registry.store().snapshot()
}

#[test]
fn test_failure_while_archiving_converges() {
    assert_same_committed(&recover_from(StoreOp::WriteArchive), &uninterrupted());
}

#[test]
fn test_failure_while_promoting_converges() {
    assert_same_committed(&recover_from(StoreOp::WriteFinal), &uninterrupted());
}

#[test]
fn test_failure_while_clearing_converges() {
    assert_same_committed(&recover_from(StoreOp::RemoveStaged), &uninterrupted());
}

#[test]
fn test_resumed_promotion_is_reported() {
    let (registry, _) = approved_refinement();
    registry.store().fail_once(StoreOp::RemoveStaged);
    registry.on_merged().unwrap();

    let report = registry.on_merged().unwrap();
    assert!(matches!(
        report.outcomes[0].status,
        MergeStatus::Promoted { resumed: true, .. }
    ));
}

#[test]
fn test_failed_entry_holds_back_higher_versions() {
    let (registry, _) = approved_refinement();
    let id_12 = registry
        .client()
        .push(soil_moisture_extending(6, "1.0.0"), soil(), v("1.2.0"), "again")
        .unwrap();
    registry.approve(&id_12, "reviewer").unwrap();

    registry.store().fail_once(StoreOp::WriteFinal);
    let report = registry.on_merged().unwrap();
    assert_eq!(report.failed().len(), 1);
    assert_eq!(report.deferred().len(), 1);
    assert_eq!(
        registry
            .client()
            .pull("soil_moisture_percent", &soil(), None)
            .unwrap()
            .version,
        v("1.0.0")
    );

    let report = registry.on_merged().unwrap();
    assert_eq!(report.promoted().len(), 2);
    assert_eq!(
        registry.client().history("soil_moisture_percent", &soil()).unwrap(),
        vec![v("1.0.0"), v("1.1.0"), v("1.2.0")]
    );
}

#[test]
fn test_rerunning_a_settled_batch_changes_nothing() {
    let (registry, _) = approved_refinement();
    registry.on_merged().unwrap();
    let settled = registry.store().snapshot();

    let report = registry.on_merged().unwrap();
    assert!(report.outcomes.is_empty());
    assert_same_committed(&registry.store().snapshot(), &settled);
}

#[test]
fn test_failed_push_leaves_nothing_staged() {
    let registry = memory_registry();
    registry.store().fail_once(StoreOp::WriteStaged);

    let err = registry
        .client()
        .push(soil_moisture(8), soil(), v("1.0.0"), "")
        .unwrap_err();
    assert!(matches!(err, RegistryError::Io(_)));
    assert!(err.is_transient());
    assert!(registry.staging().is_empty());
    assert!(registry.reviews().records().is_empty());

    // The same push succeeds once the store recovers
    registry
        .client()
        .push(soil_moisture(8), soil(), v("1.0.0"), "")
        .unwrap();
}

#[test]
fn test_archive_keeps_every_superseded_version() {
    let registry = memory_registry();
    commit(&registry, soil_moisture(8), "1.0.0", "");
    commit(&registry, soil_moisture_extending(7, "1.0.0"), "1.1.0", "a");
    commit(&registry, soil_moisture_extending(6, "1.1.0"), "1.2.0", "b");
    commit(&registry, soil_moisture_extending(5, "1.2.0"), "2.0.0", "c");

    let state = registry.store().snapshot();
    let archived: Vec<String> = state.archives.keys().map(|(_, ver)| ver.to_string()).collect();
    assert_eq!(archived, vec!["1.0.0", "1.1.0", "1.2.0"]);
    for ((_, ver), def) in &state.archives {
        assert_eq!(def.version.to_string(), ver.to_string());
    }
    assert_eq!(state.finals.len(), 1);
}

#[test]
fn test_failed_review_write_leaves_nothing_staged() {
    let registry = memory_registry();
    registry.store().fail_once(StoreOp::WriteReview);

    let err = registry
        .client()
        .push(soil_moisture(8), soil(), v("1.0.0"), "")
        .unwrap_err();
    assert!(err.is_transient());
    assert!(registry.staging().is_empty());
    assert_eq!(registry.store().staged_len(), 0);
    assert!(registry.reviews().records().is_empty());
}

#[test]
fn test_failed_decision_write_keeps_review_open() {
    let registry = memory_registry();
    commit(&registry, soil_moisture(8), "1.0.0", "");
    let id = registry
        .client()
        .push(soil_moisture_extending(7, "1.0.0"), soil(), v("1.1.0"), "narrow")
        .unwrap();
    registry.store().fail_once(StoreOp::WriteReview);

    assert!(registry.approve(&id, "reviewer").unwrap_err().is_transient());
    assert_eq!(registry.reviews().get(&id).unwrap().state, ReviewState::Opened);
    assert!(registry.on_merged().unwrap().outcomes.is_empty());

    registry.approve(&id, "reviewer").unwrap();
    assert_eq!(registry.on_merged().unwrap().promoted().len(), 1);
}

#[test]
fn test_unreadable_staging_fails_open() {
    let store = MemoryStore::new();
    store.fail_once(StoreOp::ListStaged);
    let err = ProtocolRegistry::open(store, RegistryConfig::default()).err().unwrap();
    assert!(matches!(err, RegistryError::Io(_)));
}

#[test]
fn test_unreadable_staging_fails_the_batch() {
    let (registry, id) = approved_refinement();
    registry.store().fail_once(StoreOp::ListStaged);
    assert!(registry.on_merged().unwrap_err().is_transient());
    assert_eq!(registry.reviews().get(&id).unwrap().state, ReviewState::Approved);

    assert_eq!(registry.on_merged().unwrap().promoted().len(), 1);
}
