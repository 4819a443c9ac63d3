//! Report document invariants
//!
//! The dashboard contract: sorted test-name columns, per-snapshot
//! pass/fail cells, average durations over non-zero results, and
//! weights from the newest snapshot. Exercises the path a boot in
//! root-dir mode followed by a local lint run would take.

use std::path::Path;

use serde_json::{json, Value};

use aquaserver::coordinator::Coordinator;
use aquaserver::config::ServerConfig;
use aquaserver::dispatch::update_recent_weights;
use aquaserver::report::build_report;
use aquaserver::snapshot::{Snapshot, Test};

fn snapshot_with(timestamp: i64, tests: Vec<Test>) -> Snapshot {
    let mut snapshot = Snapshot::initialize(Path::new("/data/ct"), false, timestamp);
    snapshot.tests = tests;
    snapshot.index_tests();
    snapshot.constructed = true;
    snapshot
}

fn lint(repo: &str) -> Test {
    Test::from_description(
        json!({ "test": [repo, "lint"], "type": "lint", "repo": repo }),
        0,
        0,
    )
    .unwrap()
}

#[test]
fn single_snapshot_report_shape() {
    // One lint test plus the synthetic listing test, fresh weights
    let mut tests = vec![lint("alpha")];
    let mut listing = Test::internal(vec![
        "perennial".to_string(),
        "listContinuousTests".to_string(),
    ]);
    listing.record_result(true, 0, None);
    tests.push(listing);

    let mut snapshots = vec![snapshot_with(1_700_000_000_000, tests)];
    update_recent_weights(&mut snapshots, 1_700_000_000_000);

    let report: Value = serde_json::from_str(&build_report(&snapshots)).unwrap();

    assert_eq!(report["snapshots"].as_array().unwrap().len(), 1);
    assert_eq!(
        report["testNames"],
        json!([["alpha", "lint"], ["perennial", "listContinuousTests"]])
    );
    // Never tested, no commit timestamps: priority 1 × 1.5
    assert_eq!(report["testWeights"][0], 1.5);
}

#[test]
fn average_time_appears_after_a_local_result() {
    let coordinator = Coordinator::new(ServerConfig::default());
    coordinator
        .state()
        .snapshots
        .push(snapshot_with(1_000, vec![lint("alpha")]));

    coordinator.record_test_result(
        "snapshot-1000",
        &["alpha".to_string(), "lint".to_string()],
        true,
        123,
        Some("lint output".to_string()),
    );

    let state = coordinator.state();
    let report: Value = serde_json::from_str(&build_report(&state.snapshots)).unwrap();
    assert_eq!(report["testAverageTimes"][0], 123.0);
    assert_eq!(report["snapshots"][0]["tests"][0]["y"], 1);
}

#[test]
fn messages_deduplicate_and_pass_results_carry_none() {
    let mut snapshot = snapshot_with(1_000, vec![lint("alpha")]);
    snapshot.tests[0].record_result(false, 10, Some("same failure".to_string()));
    snapshot.tests[0].record_result(false, 20, Some("same failure".to_string()));
    snapshot.tests[0].record_result(false, 30, Some("other failure".to_string()));

    let report: Value = serde_json::from_str(&build_report(&[snapshot])).unwrap();
    assert_eq!(
        report["snapshots"][0]["tests"][0]["m"],
        json!(["same failure", "other failure"])
    );
}

#[test]
fn columns_align_across_snapshots_with_different_tests() {
    let snapshots = vec![
        snapshot_with(2_000, vec![lint("beta")]),
        snapshot_with(1_000, vec![lint("alpha")]),
    ];
    let report: Value = serde_json::from_str(&build_report(&snapshots)).unwrap();

    // Columns sorted by name string; a snapshot missing a column gets {}
    assert_eq!(
        report["testNames"],
        json!([["alpha", "lint"], ["beta", "lint"]])
    );
    assert_eq!(report["snapshots"][0]["tests"][0], json!({}));
    assert_eq!(report["snapshots"][1]["tests"][1], json!({}));
}

#[test]
fn report_json_is_a_string_snapshot_of_state() {
    // The report endpoint serves whatever the report loop last built;
    // mutations after the build are invisible until the next cycle.
    let mut snapshots = vec![snapshot_with(1_000, vec![lint("alpha")])];
    let before = build_report(&snapshots);

    snapshots[0].tests[0].record_result(false, 10, Some("late".to_string()));
    let after = build_report(&snapshots);

    assert_ne!(before, after);
    assert!(!before.contains("late"));
    assert!(after.contains("late"));
}
