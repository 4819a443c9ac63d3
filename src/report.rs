//! Public report
//!
//! Builds the JSON document the dashboard polls: one column per test
//! name ever seen (sorted), one row per snapshot (newest first, capped
//! at 100), plus average durations and the current weights from the
//! newest snapshot.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::snapshot::Snapshot;

/// Summaries are capped to this many of the newest snapshots
const MAX_REPORTED_SNAPSHOTS: usize = 100;

#[derive(Debug, Serialize)]
struct Report<'a> {
    snapshots: Vec<SnapshotSummary<'a>>,
    #[serde(rename = "testNames")]
    test_names: Vec<&'a [String]>,
    #[serde(rename = "testAverageTimes")]
    test_average_times: Vec<f64>,
    #[serde(rename = "testWeights")]
    test_weights: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct SnapshotSummary<'a> {
    timestamp: i64,
    shas: &'a BTreeMap<String, String>,
    tests: Vec<TestCell>,
}

/// `{}` for a test absent from the snapshot, else pass/fail counts and
/// the deduplicated failure messages
#[derive(Debug, Default, Serialize)]
struct TestCell {
    #[serde(skip_serializing_if = "Option::is_none")]
    y: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    m: Option<Vec<String>>,
}

/// Serialize the report for the given snapshot list (index 0 newest).
pub fn build_report(snapshots: &[Snapshot]) -> String {
    // Union of test names across every snapshot, sorted by name string
    let mut name_map: BTreeMap<String, &[String]> = BTreeMap::new();
    for snapshot in snapshots {
        for test in &snapshot.tests {
            name_map
                .entry(test.name_string().to_string())
                .or_insert_with(|| test.names.as_slice());
        }
    }
    let test_names: Vec<&[String]> = name_map.values().copied().collect();

    let mut elapsed_times = vec![0.0_f64; test_names.len()];
    let mut num_elapsed_times = vec![0u32; test_names.len()];

    let mut summaries = Vec::new();
    for snapshot in snapshots.iter().take(MAX_REPORTED_SNAPSHOTS) {
        let mut cells = Vec::with_capacity(test_names.len());
        for (index, names) in test_names.iter().enumerate() {
            let Some(test) = snapshot.find_test(names) else {
                cells.push(TestCell::default());
                continue;
            };

            let mut passed = 0u32;
            let mut failed = 0u32;
            let mut messages: Vec<String> = Vec::new();
            for result in &test.results {
                if result.passed {
                    passed += 1;
                } else {
                    failed += 1;
                    if let Some(message) = &result.message {
                        if !message.is_empty() && !messages.contains(message) {
                            messages.push(message.clone());
                        }
                    }
                }
                if result.milliseconds != 0 {
                    elapsed_times[index] += result.milliseconds as f64;
                    num_elapsed_times[index] += 1;
                }
            }

            cells.push(TestCell {
                y: Some(passed),
                n: Some(failed),
                m: if messages.is_empty() {
                    None
                } else {
                    Some(messages)
                },
            });
        }
        summaries.push(SnapshotSummary {
            timestamp: snapshot.timestamp,
            shas: &snapshot.shas,
            tests: cells,
        });
    }

    let test_average_times: Vec<f64> = elapsed_times
        .iter()
        .zip(&num_elapsed_times)
        .map(|(&elapsed, &n)| if elapsed == 0.0 { 0.0 } else { elapsed / f64::from(n) })
        .collect();

    let test_weights: Vec<f64> = test_names
        .iter()
        .map(|names| {
            snapshots
                .first()
                .and_then(|snapshot| snapshot.find_test(names))
                .map(|test| (test.weight * 100.0).ceil() / 100.0)
                .unwrap_or(0.0)
        })
        .collect();

    let report = Report {
        snapshots: summaries,
        test_names,
        test_average_times,
        test_weights,
    };

    // Serialization of these plain shapes cannot fail
    serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_support::{lint_test, sim_test, snapshot_with_tests};
    use serde_json::Value;

    fn parse(snapshots: &[Snapshot]) -> Value {
        serde_json::from_str(&build_report(snapshots)).unwrap()
    }

    #[test]
    fn test_empty_state() {
        let report = parse(&[]);
        assert_eq!(report["snapshots"], serde_json::json!([]));
        assert_eq!(report["testNames"], serde_json::json!([]));
    }

    #[test]
    fn test_names_sorted_and_union_over_snapshots() {
        let snapshots = vec![
            snapshot_with_tests(2, vec![lint_test("zeta")]),
            snapshot_with_tests(1, vec![lint_test("alpha")]),
        ];
        let report = parse(&snapshots);
        assert_eq!(
            report["testNames"],
            serde_json::json!([["alpha", "lint"], ["zeta", "lint"]])
        );
    }

    #[test]
    fn test_cells_count_results_and_messages() {
        let mut snapshot = snapshot_with_tests(1, vec![sim_test("alpha", false, &[])]);
        snapshot.tests[0].record_result(true, 100, None);
        snapshot.tests[0].record_result(false, 200, Some("boom".to_string()));
        snapshot.tests[0].record_result(false, 300, Some("boom".to_string()));

        let report = parse(&[snapshot]);
        let cell = &report["snapshots"][0]["tests"][0];
        assert_eq!(cell["y"], 1);
        assert_eq!(cell["n"], 2);
        // Duplicate failure messages are reported once
        assert_eq!(cell["m"], serde_json::json!(["boom"]));
    }

    #[test]
    fn test_absent_test_is_empty_object() {
        let snapshots = vec![
            snapshot_with_tests(2, vec![lint_test("alpha")]),
            snapshot_with_tests(1, vec![lint_test("beta")]),
        ];
        let report = parse(&snapshots);
        // beta.lint does not exist in the newest snapshot
        assert_eq!(report["snapshots"][0]["tests"][1], serde_json::json!({}));
    }

    #[test]
    fn test_average_times_skip_zero_durations() {
        let mut snapshot = snapshot_with_tests(1, vec![lint_test("alpha")]);
        snapshot.tests[0].record_result(true, 100, None);
        snapshot.tests[0].record_result(true, 0, None);
        snapshot.tests[0].record_result(true, 200, None);

        let report = parse(&[snapshot]);
        assert_eq!(report["testAverageTimes"][0], 150.0);
    }

    #[test]
    fn test_weights_come_from_newest_snapshot_rounded_up() {
        let mut snapshots = vec![
            snapshot_with_tests(2, vec![lint_test("alpha")]),
            snapshot_with_tests(1, vec![lint_test("beta")]),
        ];
        snapshots[0].tests[0].weight = 1.2345;

        let report = parse(&snapshots);
        assert_eq!(report["testWeights"][0], 1.24);
        // beta.lint is absent from snapshot 0
        assert_eq!(report["testWeights"][1], 0.0);
    }

    #[test]
    fn test_shas_and_timestamps_surface() {
        let mut snapshot = snapshot_with_tests(1700000000000, vec![lint_test("alpha")]);
        snapshot
            .shas
            .insert("alpha".to_string(), "a".repeat(40));
        let report = parse(&[snapshot]);
        assert_eq!(report["snapshots"][0]["timestamp"], 1700000000000i64);
        assert_eq!(report["snapshots"][0]["shas"]["alpha"], "a".repeat(40));
    }

    #[test]
    fn test_snapshot_cap() {
        let snapshots: Vec<Snapshot> = (0..120)
            .map(|i| snapshot_with_tests(1000 - i, vec![lint_test("alpha")]))
            .collect();
        let report = parse(&snapshots);
        assert_eq!(report["snapshots"].as_array().unwrap().len(), 100);
    }
}
