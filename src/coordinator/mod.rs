//! Coordinator state and lifecycle
//!
//! One `Coordinator` instance per process owns every snapshot. Five
//! cooperative loops plus the HTTP handlers mutate it; every
//! read-modify-write happens under the single state mutex, and the
//! mutex is never held across a suspension point. The checkpoint file
//! is the restart anchor.

mod local_loop;
mod loops;
mod snapshot_loop;

pub use local_loop::local_loop;
pub use loops::{autosave_loop, report_loop, weights_loop};
pub use snapshot_loop::snapshot_loop;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::checkpoint::{CheckpointFile, CheckpointResult, SnapshotRecord, SnapshotStub};
use crate::config::ServerConfig;
use crate::observability::Logger;
use crate::report::build_report;
use crate::snapshot::Snapshot;

/// Hard cap on retained snapshots
pub const MAX_SNAPSHOTS: usize = 70;
/// Snapshots older than this are eligible for eviction once removed
pub const SNAPSHOT_RETENTION_MS: i64 = 2 * 24 * 3600 * 1000;

/// Milliseconds since the epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Everything the loops and handlers share
#[derive(Debug)]
pub struct CoordinatorState {
    /// Index 0 is the newest snapshot
    pub snapshots: Vec<Snapshot>,
    /// Set while a snapshot is between initialization and insertion
    pub pending_snapshot: Option<SnapshotStub>,
    /// Snapshots whose directories still need removal
    pub trash_snapshots: Vec<SnapshotStub>,
    /// Last produced public report
    pub report_json: String,
    pub status: String,
    pub last_error: String,
    pub startup_timestamp: i64,
}

/// The process-wide test coordinator
#[derive(Debug)]
pub struct Coordinator {
    pub config: ServerConfig,
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CoordinatorState {
                snapshots: Vec::new(),
                pending_snapshot: None,
                trash_snapshots: Vec::new(),
                report_json: build_report(&[]),
                status: "Starting up".to_string(),
                last_error: String::new(),
                startup_timestamp: now_millis(),
            }),
        }
    }

    /// Lock the shared state. A panic in a detached task must not wedge
    /// the coordinator, so poisoning is stripped.
    pub fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the human-readable phase shown by `/aquaserver/status`
    pub fn set_status(&self, status: &str) {
        self.state().status = status.to_string();
        Logger::info("STATUS", &[("status", status)]);
    }

    /// Record a caught loop failure: surfaced through the status
    /// endpoint and logged, never fatal.
    pub fn record_error(&self, context: &str, message: &str) {
        let line = format!("{}: {}", context, message);
        {
            let mut state = self.state();
            if !state.last_error.is_empty() {
                state.last_error.push('\n');
            }
            state.last_error.push_str(&line);
        }
        Logger::error("COORDINATOR_ERROR", &[("context", context), ("message", message)]);
    }

    /// Append a result to a test, located by snapshot name plus name
    /// sequence. Unknown snapshots and tests are logged and ignored;
    /// reporting problems are never the client's fault.
    pub fn record_test_result(
        &self,
        snapshot_name: &str,
        names: &[String],
        passed: bool,
        milliseconds: i64,
        message: Option<String>,
    ) {
        let mut state = self.state();
        let Some(snapshot) = state
            .snapshots
            .iter_mut()
            .find(|snapshot| snapshot.name == snapshot_name)
        else {
            Logger::info(
                "RESULT_DISCARDED",
                &[(
                    "reason",
                    &format!("Could not find snapshot for name: {}", snapshot_name),
                )],
            );
            return;
        };
        let Some(test) = snapshot.find_test_mut(names) else {
            Logger::info(
                "RESULT_DISCARDED",
                &[(
                    "reason",
                    &format!(
                        "Could not find test {} in snapshot {}",
                        names.join("."),
                        snapshot_name
                    ),
                )],
            );
            return;
        };
        test.record_result(passed, milliseconds, message);
    }

    /// Capture and write the durable checkpoint.
    pub fn save_checkpoint(&self) -> CheckpointResult<()> {
        let file = {
            let state = self.state();
            CheckpointFile {
                snapshots: state.snapshots.iter().map(SnapshotRecord::of).collect(),
                pending_snapshot: state.pending_snapshot.clone(),
                trash_snapshots: state.trash_snapshots.clone(),
            }
        };
        file.write_to_file(&self.config.checkpoint_path())
    }

    /// Restore state from the checkpoint file, if one exists.
    ///
    /// A pending snapshot in the file is a construction the previous
    /// process never finished; its directory becomes a trash stub here
    /// and is reclaimed by the snapshot loop at startup.
    pub fn load_from_file(&self) -> CheckpointResult<()> {
        let Some(file) = CheckpointFile::read_from_file(&self.config.checkpoint_path())? else {
            return Ok(());
        };

        let mut snapshots = Vec::with_capacity(file.snapshots.len());
        for record in file.snapshots {
            snapshots.push(record.restore()?);
        }

        let mut state = self.state();
        state.snapshots = snapshots;
        state.trash_snapshots = file.trash_snapshots;
        if let Some(pending) = file.pending_snapshot {
            state.trash_snapshots.push(pending);
        }
        state.pending_snapshot = None;
        Ok(())
    }

    /// Fire-and-forget removal of a trashed snapshot's directory.
    ///
    /// Completion marks the snapshot removed, drops the trash entry,
    /// and writes a checkpoint so a restart does not re-delete.
    /// Failures stay in the trash list for the next boot.
    pub fn schedule_trash_deletion(self: &Arc<Self>, stub: SnapshotStub) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            // Root-dir snapshots alias the working tree; their trash
            // entries are dropped without touching the filesystem.
            if !stub.use_root_dir {
                if let Some(directory) = &stub.directory {
                    if let Err(e) = tokio::fs::remove_dir_all(directory).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            coordinator.record_error(
                                "trash deletion",
                                &format!("{}: {}", directory.display(), e),
                            );
                            return;
                        }
                    }
                }
            }

            {
                let mut state = coordinator.state();
                if let Some(snapshot) = state
                    .snapshots
                    .iter_mut()
                    .find(|snapshot| snapshot.directory == stub.directory)
                {
                    snapshot.mark_removed();
                }
                state
                    .trash_snapshots
                    .retain(|entry| entry.directory != stub.directory);
            }

            if let Err(e) = coordinator.save_checkpoint() {
                coordinator.record_error("trash deletion checkpoint", &e.to_string());
            }
        });
    }
}

/// True when the oldest snapshot should be popped: over the hard cap,
/// or past retention with its directory already gone. An old snapshot
/// whose directory still exists is kept until removal completes.
pub fn should_evict_oldest(snapshots: &[Snapshot], now_ms: i64) -> bool {
    if snapshots.len() > MAX_SNAPSHOTS {
        return true;
    }
    match snapshots.last() {
        Some(oldest) => oldest.timestamp < now_ms - SNAPSHOT_RETENTION_MS && !oldest.exists,
        None => false,
    }
}

/// Pop aged-out snapshots from the back of the list.
///
/// A popped snapshot whose directory is still on disk is appended to
/// `trash_snapshots` (unless already there) so its files are not
/// leaked; the caller schedules deletion for the returned stubs.
pub fn evict_old_snapshots(
    snapshots: &mut Vec<Snapshot>,
    trash_snapshots: &mut Vec<SnapshotStub>,
    now_ms: i64,
) -> Vec<SnapshotStub> {
    let mut newly_trashed = Vec::new();
    while should_evict_oldest(snapshots, now_ms) {
        let Some(popped) = snapshots.pop() else {
            break;
        };
        let already_trashed = trash_snapshots
            .iter()
            .any(|stub| stub.directory == popped.directory);
        if popped.exists && !already_trashed {
            let stub = SnapshotStub::of(&popped);
            trash_snapshots.push(stub.clone());
            newly_trashed.push(stub);
        }
    }
    newly_trashed
}
