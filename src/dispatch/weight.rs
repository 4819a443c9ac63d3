//! Decaying test priority
//!
//! A test's dynamic weight starts from its static priority and is
//! scaled by three signals: how fresh its repo's last commit is, how
//! fresh its dependencies' newest commit is, and how it fared across
//! its recent incarnations (the same-named test in earlier snapshots).
//! Recently-failed and never-exercised tests float up; tests already
//! covered in the newest snapshots sink.

use crate::snapshot::{Snapshot, Test};

pub const TWO_HOURS_MS: i64 = 2 * 3600 * 1000;
pub const TWELVE_HOURS_MS: i64 = 12 * 3600 * 1000;

/// Linear interpolation of `x` from `[lo, hi]` onto `[a, b]`
fn interp(lo: f64, hi: f64, a: f64, b: f64, x: f64) -> f64 {
    a + (b - a) * (x - lo) / (hi - lo)
}

/// Age-decay multiplier: `m0` at age 0, `m2` at two hours, `m12` at
/// twelve hours and beyond, piecewise-linear in between.
fn age_multiplier(elapsed: i64, m0: f64, m2: f64, m12: f64) -> f64 {
    if elapsed < TWO_HOURS_MS {
        interp(0.0, TWO_HOURS_MS as f64, m0, m2, elapsed as f64)
    } else if elapsed < TWELVE_HOURS_MS {
        interp(
            TWO_HOURS_MS as f64,
            TWELVE_HOURS_MS as f64,
            m2,
            m12,
            elapsed as f64,
        )
    } else {
        m12
    }
}

/// Compute the dynamic weight of `test` given the full snapshot list
/// (index 0 newest), which supplies the test's incarnation history.
pub fn compute_weight(snapshots: &[Snapshot], test: &Test, now_ms: i64) -> f64 {
    let mut weight = test.priority;

    if test.repo_commit_timestamp > 0 {
        weight *= age_multiplier(now_ms - test.repo_commit_timestamp, 2.0, 1.0, 0.5);
    }
    if test.dependencies_commit_timestamp > 0 {
        weight *= age_multiplier(
            now_ms - test.dependencies_commit_timestamp,
            1.5,
            1.0,
            0.75,
        );
    }

    // Incarnations of this test across snapshots, most recent first
    let mut last_tested_index: i64 = -1;
    let mut last_failed_index: i64 = -1;
    let mut incarnation_index: i64 = 0;
    for snapshot in snapshots {
        if let Some(incarnation) = snapshot.find_test(&test.names) {
            if last_tested_index < 0 && !incarnation.results.is_empty() {
                last_tested_index = incarnation_index;
            }
            if last_failed_index < 0 && incarnation.results.iter().any(|result| !result.passed) {
                last_failed_index = incarnation_index;
            }
            if last_tested_index >= 0 && last_failed_index >= 0 {
                break;
            }
            incarnation_index += 1;
        }
    }

    if last_failed_index >= 0 {
        weight *= if last_failed_index < 3 { 6.0 } else { 3.0 };
    } else {
        match last_tested_index {
            -1 => weight *= 1.5,
            0 => weight *= 0.3,
            1 => weight *= 0.7,
            _ => {}
        }
    }

    weight
}

/// Recompute the weight of every test in the two newest snapshots.
pub fn update_recent_weights(snapshots: &mut [Snapshot], now_ms: i64) {
    let recent = snapshots.len().min(2);
    for snapshot_index in 0..recent {
        for test_index in 0..snapshots[snapshot_index].tests.len() {
            let weight = compute_weight(
                snapshots,
                &snapshots[snapshot_index].tests[test_index],
                now_ms,
            );
            snapshots[snapshot_index].tests[test_index].weight = weight;
        }
    }
}
