//! Concurrent writers against one collection.

use std::sync::Arc;

use rayon::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use tw_store::{
    DocumentStore, DuckDbConnector, Ledger, MemoryStore, StoreAddress, StoreConnector,
};
use tw_types::{CandidateUpdate, Point, Trial};

fn append_then_update(ledger: &Ledger, i: i64) {
    let id = ledger
        .append(&Trial::new(Point::from([i]), i as f64, Point::default()))
        .unwrap();

    // a reader between insert and update must still see a consistent snapshot
    let snapshot = ledger.all_complete().unwrap();
    assert!(snapshot.iter().all(|t| t.x.len() == 1));

    ledger
        .record_candidate(
            &id,
            &CandidateUpdate {
                x_new: Point::from([i + 1]),
                z_new: Point::default(),
            },
        )
        .unwrap();
}

#[test]
fn parallel_iterations_on_memory_store() {
    let ledger = Ledger::new(Arc::new(MemoryStore::new("parallel")));

    (0..64i64).into_par_iter().for_each(|i| append_then_update(&ledger, i));

    let trials = ledger.all_complete().unwrap();
    assert_eq!(trials.len(), 64);
    assert!(trials.iter().all(|t| t.is_resolved()));
}

#[test]
fn parallel_iterations_on_duckdb_store() {
    let temp_dir = tempdir().unwrap();
    let connector = DuckDbConnector::new(temp_dir.path()).unwrap();
    let store = connector
        .connect(&StoreAddress::new("localhost", 27017, "turboworks", "parallel"))
        .unwrap();
    let ledger = Ledger::new(store);

    (0..16i64).into_par_iter().for_each(|i| append_then_update(&ledger, i));

    let trials = ledger.all_complete().unwrap();
    assert_eq!(trials.len(), 16);
    assert_eq!(ledger.sum_of("x[0]").unwrap(), tw_types::Scalar::Int((0..16).sum()));
}

#[test]
fn half_written_records_never_reach_aggregates() {
    let store = Arc::new(MemoryStore::new("opt_default"));
    let ledger = Ledger::new(store.clone());

    ledger.append(&Trial::new(Point::from([1]), 1.0, Point::default())).unwrap();
    store
        .insert(json!({"x": [2], "y": 100.0}).as_object().cloned().unwrap())
        .unwrap();

    let (max, _) = ledger.extremum_of("y", false).unwrap();
    assert_eq!(max, tw_types::Scalar::Float(1.0));
    assert_eq!(ledger.values_of("y").unwrap().len(), 1);
}
