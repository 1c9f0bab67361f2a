mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{Seed, at, calls, dataset_id, state_id};
use dataset_lineage::datatype::{DatasetId, StateId};
use dataset_lineage::{LineageError, Missing};
use rusqlite::params;

#[test]
fn second_resolve_is_served_from_cache() {
    let (catalog, counter) = Seed::chain().counted();
    let first = catalog.resolve_dataset(dataset_id("leaf")).unwrap();
    let after_first = calls(&counter);
    assert_eq!(after_first, 1);

    let second = catalog.resolve_dataset(dataset_id("leaf")).unwrap();
    assert_eq!(calls(&counter), after_first);
    assert_eq!(*first, *second);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.base_dataset(), Some(dataset_id("mid")));
    assert_eq!(first.state_type(), Some("C"));
    assert!(!first.root());
}

#[test]
fn malformed_ids_fail_before_any_io() {
    let (catalog, counter) = Seed::chain().counted();
    let err = catalog.datasets().resolve_str("1337").unwrap_err();
    assert!(matches!(err, LineageError::Validation(_)));
    let err = catalog.resolve_dataset(DatasetId::NULL).unwrap_err();
    assert!(matches!(err, LineageError::Validation(_)));
    let err = catalog.resolve_state(StateId::NULL, true).unwrap_err();
    assert!(matches!(err, LineageError::Validation(_)));
    assert_eq!(calls(&counter), 0);
}

#[test]
fn unknown_keys_are_not_found() {
    let catalog = Seed::chain().catalog();
    let missing = dataset_id("nowhere");
    match catalog.resolve_dataset(missing) {
        Err(LineageError::NotFound(Missing::Dataset(id))) => assert_eq!(id, missing),
        other => panic!("expected a missing dataset, got {other:?}"),
    }
    match catalog.resolve_state(state_id("nowhere"), false) {
        Err(LineageError::NotFound(Missing::State(_))) => {}
        other => panic!("expected a missing state, got {other:?}"),
    }
    match catalog.resolve_type_by_name("nowhere") {
        Err(LineageError::NotFound(Missing::StateType(name))) => assert_eq!(name, "nowhere"),
        other => panic!("expected a missing state type, got {other:?}"),
    }
}

#[test]
fn state_types_are_indexed_both_ways() {
    let (catalog, counter) = Seed::chain().counted();
    let by_name = catalog.resolve_type_by_name("B").unwrap();
    assert_eq!(calls(&counter), 1);
    assert_eq!(by_name.to_string(), "<DatasetStateType: B>");

    let again = catalog.resolve_type_by_name("B").unwrap();
    let by_id = catalog.resolve_type_by_id(by_name.id()).unwrap();
    assert_eq!(calls(&counter), 1);
    assert!(Arc::ptr_eq(&by_name, &again));
    assert!(Arc::ptr_eq(&by_name, &by_id));
}

#[test]
fn resolving_a_state_resolves_its_type() {
    let (catalog, counter) = Seed::chain().counted();
    let state = catalog.resolve_state(state_id("state-a"), false).unwrap();
    assert_eq!(state.state_type().unwrap().name(), "A");
    let before = calls(&counter);
    catalog.resolve_type_by_name("A").unwrap();
    assert_eq!(calls(&counter), before);
}

#[test]
fn metadata_only_state_is_upgraded_on_first_full_request() {
    let (catalog, counter) = Seed::chain().counted();
    let id = state_id("state-b");

    let light = catalog.resolve_state(id, false).unwrap();
    assert!(light.data().is_none());
    assert!(light.time().is_some());
    let after_light = calls(&counter);
    catalog.resolve_state(id, false).unwrap();
    assert_eq!(calls(&counter), after_light);

    let full = catalog.resolve_state(id, true).unwrap();
    assert_eq!(full.data().unwrap()["label"], "state-b");
    assert_eq!(calls(&counter), after_light + 1);

    let again = catalog.resolve_state(id, false).unwrap();
    assert!(again.is_full());
    catalog.resolve_state(id, true).unwrap();
    assert_eq!(calls(&counter), after_light + 1);
}

#[test]
fn existence_checks_do_not_populate_the_cache() {
    let (catalog, counter) = Seed::chain().counted();
    assert!(catalog.state_exists(state_id("state-c")).unwrap());
    assert!(!catalog.state_exists(state_id("nowhere")).unwrap());
    assert_eq!(calls(&counter), 2);
    assert_eq!(catalog.states().len().unwrap(), 0);

    catalog.resolve_state(state_id("state-c"), false).unwrap();
    let before = calls(&counter);
    assert!(catalog.state_exists(state_id("state-c")).unwrap());
    assert_eq!(calls(&counter), before);
}

#[test]
fn datasets_sharing_a_state_share_its_cache_entry() {
    let catalog = Seed::forest().catalog();
    let a1 = catalog.resolve_dataset(dataset_id("a1")).unwrap();
    let b2 = catalog.resolve_dataset(dataset_id("b2")).unwrap();
    let from_a1 = catalog.state_of(&a1).unwrap();
    let from_b2 = catalog.state_of(&b2).unwrap();
    assert!(Arc::ptr_eq(&from_a1, &from_b2));
    assert_eq!(catalog.states().len().unwrap(), 1);
}

#[test]
fn base_of_is_memoized() {
    let (catalog, counter) = Seed::chain().counted();
    let leaf = catalog.resolve_dataset(dataset_id("leaf")).unwrap();
    let mid = catalog.base_of(&leaf).unwrap().unwrap();
    assert_eq!(mid.id(), dataset_id("mid"));
    let before = calls(&counter);
    let again = catalog.base_of(&leaf).unwrap().unwrap();
    assert!(Arc::ptr_eq(&mid, &again));
    assert_eq!(calls(&counter), before);

    let root = catalog.base_of(&mid).unwrap().unwrap();
    assert!(root.root());
    assert!(catalog.base_of(&root).unwrap().is_none());
}

#[test]
fn display_names_the_state_type() {
    let catalog = Seed::chain().catalog();
    let root = catalog.resolve_dataset(dataset_id("root")).unwrap();
    assert_eq!(root.to_string(), format!("<Dataset[A]: {}>", dataset_id("root")));
    let state = catalog.state_of(&root).unwrap();
    assert_eq!(state.to_string(), format!("<DatasetState[A]: {}>", state_id("state-a")));
}

#[test]
fn undecodable_rows_are_integrity_errors() {
    let seed = Seed::chain().corrupt();
    let broken = state_id("broken");
    let connection = seed.store.connection();
    connection
        .execute(
            "insert into DatasetState
                (DatasetState_Identity, DatasetStateType_Identity, StateData, StateTime)
                values (?1, null, 'not json', ?2)",
            params![broken, at(100)],
        )
        .unwrap();
    connection
        .execute(
            "insert into Dataset
                (Dataset_Identity, IsRoot, DatasetState_Identity, DatasetTime, BaseDataset_Identity)
                values (?1, 1, 'nothex', ?2, null)",
            params![dataset_id("bad-state"), at(101)],
        )
        .unwrap();
    let catalog = seed.catalog();

    let err = catalog.resolve_state(broken, true).unwrap_err();
    assert!(matches!(err, LineageError::Integrity(_)), "{err}");
    // the payload is never decoded for metadata
    assert!(catalog.resolve_state(broken, false).unwrap().data().is_none());

    let err = catalog.resolve_dataset(dataset_id("bad-state")).unwrap_err();
    assert!(matches!(err, LineageError::Integrity(_)), "{err}");
    let err = catalog.build_index().unwrap_err();
    assert!(matches!(err, LineageError::Integrity(_)), "{err}");

    let leaf = catalog.resolve_dataset(dataset_id("leaf")).unwrap();
    assert_eq!(catalog.state_of(&leaf).unwrap().id(), state_id("state-c"));
}

#[test]
fn store_failures_surface_unchanged_and_cache_nothing() {
    let (catalog, counter, offline) = Seed::chain().flaky();
    offline.store(true, Ordering::SeqCst);

    let err = catalog.resolve_dataset(dataset_id("leaf")).unwrap_err();
    assert!(matches!(err, LineageError::StoreUnavailable(_)), "{err}");
    assert_eq!(calls(&counter), 1);
    assert_eq!(catalog.datasets().len().unwrap(), 0);

    let err = catalog.build_index().unwrap_err();
    assert!(matches!(err, LineageError::StoreUnavailable(_)), "{err}");
    assert_eq!(calls(&counter), 2);
    assert_eq!(catalog.state_types().len().unwrap(), 0);

    offline.store(false, Ordering::SeqCst);
    let leaf = catalog.resolve_dataset(dataset_id("leaf")).unwrap();
    assert_eq!(leaf.base_dataset(), Some(dataset_id("mid")));
    assert_eq!(calls(&counter), 3);
}

#[test]
fn sqlite_failures_are_store_unavailable() {
    let seed = Seed::chain();
    seed.store
        .connection()
        .execute_batch("drop table DatasetAttachedType;")
        .unwrap();
    let catalog = seed.catalog();
    let err = catalog.attached_types(dataset_id("leaf")).unwrap_err();
    assert!(matches!(err, LineageError::StoreUnavailable(_)), "{err}");
}

#[test]
fn state_type_cache_holds_only_stored_types() {
    let (catalog, counter) = Seed::chain().counted();
    catalog.resolve_type_by_name("B").unwrap();
    assert_eq!(catalog.state_types().len().unwrap(), 1);

    for attempt in 1..=2 {
        let err = catalog.resolve_type_by_name("unstored").unwrap_err();
        assert!(matches!(err, LineageError::NotFound(Missing::StateType(_))));
        assert_eq!(calls(&counter), 1 + attempt);
    }
    assert_eq!(catalog.state_types().len().unwrap(), 1);
}
