//! Periodic maintenance loops
//!
//! Weight recomputation every 30 s, a checkpoint write every 5 minutes,
//! and the public report every 5 s. Each loop catches its own failures
//! and keeps going.

use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::update_recent_weights;
use crate::report::build_report;

use super::{now_millis, Coordinator};

const WEIGHTS_INTERVAL: Duration = Duration::from_secs(30);
const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Recompute the weights of the two newest snapshots' tests, forever.
pub async fn weights_loop(coordinator: Arc<Coordinator>) {
    loop {
        {
            let mut state = coordinator.state();
            update_recent_weights(&mut state.snapshots, now_millis());
        }
        tokio::time::sleep(WEIGHTS_INTERVAL).await;
    }
}

/// Write the durable checkpoint on a fixed cadence. A failed write is
/// recorded and retried at the next tick.
pub async fn autosave_loop(coordinator: Arc<Coordinator>) {
    loop {
        if let Err(e) = coordinator.save_checkpoint() {
            coordinator.record_error("autosave", &e.to_string());
        }
        tokio::time::sleep(AUTOSAVE_INTERVAL).await;
    }
}

/// Rebuild the public report JSON, forever.
pub async fn report_loop(coordinator: Arc<Coordinator>) {
    loop {
        {
            let mut state = coordinator.state();
            let report = build_report(&state.snapshots);
            state.report_json = report;
        }
        tokio::time::sleep(REPORT_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadences() {
        assert_eq!(WEIGHTS_INTERVAL, Duration::from_secs(30));
        assert_eq!(AUTOSAVE_INTERVAL, Duration::from_secs(300));
        assert_eq!(REPORT_INTERVAL, Duration::from_secs(5));
    }
}
