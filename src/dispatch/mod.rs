//! Test dispatch
//!
//! Selection operates on the two newest snapshots only. Browser
//! requesters get the least-dispatched candidates first (minimum
//! `count`), weighted-randomly within that tier; local workers get the
//! full availability union and weighted-sample themselves.

mod sampler;
mod weight;

pub use sampler::weighted_sample_index;
pub use weight::{compute_weight, update_recent_weights, TWO_HOURS_MS, TWELVE_HOURS_MS};

use rand::Rng;

use crate::snapshot::{BrowserFlavor, Snapshot, Test};

/// Everything a browser poller needs to run one test
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedTest {
    pub snapshot_name: String,
    pub names: Vec<String>,
    pub url: String,
}

/// Harness URL for a browser test of `snapshot`.
///
/// The harness page is addressed relative to the test directory the
/// clients are served from, so a root-dir snapshot points two levels up
/// and a copied snapshot points into `ct-snapshots/<timestamp>`.
pub fn browser_test_url(snapshot: &Snapshot, test: &Test) -> Option<String> {
    let browser = test.browser()?;

    let base = if snapshot.use_root_dir {
        "../..".to_string()
    } else {
        format!("../../ct-snapshots/{}", snapshot.timestamp)
    };

    let mut url = format!(
        "{}-test.html?url={}",
        browser.flavor.harness_prefix(),
        urlencoding::encode(&format!("{}/{}", base, browser.url))
    );

    if browser.flavor == BrowserFlavor::Sim {
        if let Some(query_parameters) = &browser.query_parameters {
            url.push_str("&simQueryParameters=");
            url.push_str(&urlencoding::encode(query_parameters));
        }
    }
    if let Some(test_query_parameters) = &browser.test_query_parameters {
        url.push('&');
        url.push_str(test_query_parameters);
    }

    Some(url)
}

/// Pick the next test for a polling browser, or `None` when nothing is
/// deliverable. Increments the winner's dispatch count.
pub fn deliver_browser_test<R: Rng>(
    snapshots: &mut [Snapshot],
    es5_only: bool,
    rng: &mut R,
) -> Option<DispatchedTest> {
    // (snapshot index, test index) over the two newest snapshots
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for snapshot_index in 0..snapshots.len().min(2) {
        for test_index in snapshots[snapshot_index].browser_available_tests(es5_only) {
            candidates.push((snapshot_index, test_index));
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let min_count = candidates
        .iter()
        .map(|&(s, t)| snapshots[s].tests[t].count)
        .min()?;
    candidates.retain(|&(s, t)| snapshots[s].tests[t].count == min_count);

    let weights: Vec<f64> = candidates
        .iter()
        .map(|&(s, t)| snapshots[s].tests[t].weight)
        .collect();
    let (snapshot_index, test_index) = candidates[weighted_sample_index(rng, &weights)?];

    let url = browser_test_url(
        &snapshots[snapshot_index],
        &snapshots[snapshot_index].tests[test_index],
    )?;
    let snapshot_name = snapshots[snapshot_index].name.clone();
    let test = &mut snapshots[snapshot_index].tests[test_index];
    test.count += 1;

    Some(DispatchedTest {
        snapshot_name,
        names: test.names.clone(),
        url,
    })
}

/// Locations of every dispatchable local test in the two newest
/// snapshots, with their current weights. The caller weighted-samples.
pub fn available_local_tests(snapshots: &[Snapshot]) -> Vec<(usize, usize, f64)> {
    let mut available = Vec::new();
    for snapshot_index in 0..snapshots.len().min(2) {
        for test_index in snapshots[snapshot_index].local_available_tests() {
            available.push((
                snapshot_index,
                test_index,
                snapshots[snapshot_index].tests[test_index].weight,
            ));
        }
    }
    available
}
