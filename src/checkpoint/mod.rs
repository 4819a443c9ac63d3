//! Durable state checkpoint
//!
//! One JSON file anchors restarts: the full snapshot list (tests and
//! their results included), a stub for the snapshot being built when
//! the checkpoint was written, and stubs for every snapshot awaiting
//! directory removal. Stubs carry only what the delete routine needs.
//!
//! Restoring converts a pending stub into a trash stub — a crash
//! mid-construction leaves a partial directory that must be reclaimed,
//! never resumed.

mod errors;

pub use errors::{CheckpointError, CheckpointResult};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::{Snapshot, SnapshotResult, Test};

/// The checkpoint file shape
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointFile {
    pub snapshots: Vec<SnapshotRecord>,
    pub pending_snapshot: Option<SnapshotStub>,
    pub trash_snapshots: Vec<SnapshotStub>,
}

/// Full serialization of a live snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub root_dir: PathBuf,
    pub use_root_dir: bool,
    pub timestamp: i64,
    pub constructed: bool,
    pub name: String,
    pub exists: bool,
    pub directory: Option<PathBuf>,
    pub repos: Vec<String>,
    pub shas: BTreeMap<String, String>,
    pub tests: Vec<TestRecord>,
}

/// The fields that survive for trash and pending snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStub {
    pub root_dir: PathBuf,
    pub constructed: bool,
    pub directory: Option<PathBuf>,
    pub use_root_dir: bool,
}

/// One test inside a [`SnapshotRecord`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub description: Value,
    pub results: Vec<ResultRecord>,
    pub complete: bool,
    pub success: bool,
    pub count: u32,
    pub repo_commit_timestamp: i64,
    pub dependencies_commit_timestamp: i64,
}

/// One recorded outcome inside a [`TestRecord`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub passed: bool,
    pub message: Option<String>,
    pub milliseconds: i64,
}

impl SnapshotStub {
    /// Capture the removal-relevant fields of a snapshot
    pub fn of(snapshot: &Snapshot) -> Self {
        Self {
            root_dir: snapshot.root_dir.clone(),
            constructed: snapshot.constructed,
            directory: snapshot.directory.clone(),
            use_root_dir: snapshot.use_root_dir,
        }
    }
}

impl SnapshotRecord {
    /// Serialize a live snapshot
    pub fn of(snapshot: &Snapshot) -> Self {
        Self {
            root_dir: snapshot.root_dir.clone(),
            use_root_dir: snapshot.use_root_dir,
            timestamp: snapshot.timestamp,
            constructed: snapshot.constructed,
            name: snapshot.name.clone(),
            exists: snapshot.exists,
            directory: snapshot.directory.clone(),
            repos: snapshot.repos.clone(),
            shas: snapshot.shas.clone(),
            tests: snapshot.tests.iter().map(TestRecord::of).collect(),
        }
    }

    /// Reconstruct the in-memory snapshot, rebuilding the test map.
    pub fn restore(self) -> SnapshotResult<Snapshot> {
        let mut snapshot = Snapshot::initialize(&self.root_dir, self.use_root_dir, self.timestamp);
        snapshot.constructed = self.constructed;
        snapshot.exists = self.exists;
        snapshot.directory = self.directory;
        snapshot.repos = self.repos;
        snapshot.shas = self.shas;
        snapshot.tests = self
            .tests
            .into_iter()
            .map(TestRecord::restore)
            .collect::<SnapshotResult<Vec<_>>>()?;
        snapshot.index_tests();
        Ok(snapshot)
    }
}

impl TestRecord {
    fn of(test: &Test) -> Self {
        Self {
            description: test.description.clone(),
            results: test
                .results
                .iter()
                .map(|result| ResultRecord {
                    passed: result.passed,
                    message: result.message.clone(),
                    milliseconds: result.milliseconds,
                })
                .collect(),
            complete: test.complete,
            success: test.success,
            count: test.count,
            repo_commit_timestamp: test.repo_commit_timestamp,
            dependencies_commit_timestamp: test.dependencies_commit_timestamp,
        }
    }

    fn restore(self) -> SnapshotResult<Test> {
        let mut test = Test::from_description(
            self.description,
            self.repo_commit_timestamp,
            self.dependencies_commit_timestamp,
        )?;
        test.complete = self.complete;
        test.success = self.success;
        test.count = self.count;
        for result in self.results {
            test.record_result(result.passed, result.milliseconds, result.message);
        }
        Ok(test)
    }
}

impl CheckpointFile {
    /// Write the checkpoint with fsync; a torn write is never visible
    /// because the content lands in a temp file first.
    pub fn write_to_file(&self, path: &Path) -> CheckpointResult<()> {
        let json = serde_json::to_string(self)?;

        let temp_path = path.with_extension("json.tmp");
        let mut file =
            File::create(&temp_path).map_err(|e| CheckpointError::io(&temp_path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| CheckpointError::io(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| CheckpointError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, path).map_err(|e| CheckpointError::io(path, e))?;

        Ok(())
    }

    /// Read a checkpoint; `Ok(None)` when the file does not exist.
    pub fn read_from_file(path: &Path) -> CheckpointResult<Option<Self>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::io(path, e)),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_support::{build_test, lint_test, sim_test, snapshot_with_tests};
    use tempfile::TempDir;

    fn populated_snapshot() -> Snapshot {
        let mut snapshot = snapshot_with_tests(
            1700000000000,
            vec![
                lint_test("alpha"),
                build_test("alpha"),
                sim_test("alpha", true, &["alpha"]),
            ],
        );
        snapshot.repos = vec!["alpha".to_string()];
        snapshot
            .shas
            .insert("alpha".to_string(), "a".repeat(40));
        snapshot.tests[0].complete = true;
        snapshot.tests[0].record_result(true, 123, None);
        snapshot.tests[1].success = true;
        snapshot.tests[2].count = 4;
        snapshot.tests[2].record_result(false, 456, Some("boom".to_string()));
        snapshot
    }

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = populated_snapshot();
        let restored = SnapshotRecord::of(&snapshot).restore().unwrap();

        assert_eq!(restored.timestamp, snapshot.timestamp);
        assert_eq!(restored.name, snapshot.name);
        assert_eq!(restored.shas, snapshot.shas);
        assert_eq!(restored.repos, snapshot.repos);
        assert_eq!(restored.directory, snapshot.directory);
        assert_eq!(restored.use_root_dir, snapshot.use_root_dir);
        for (restored_test, test) in restored.tests.iter().zip(&snapshot.tests) {
            assert_eq!(restored_test.names, test.names);
            assert_eq!(restored_test.kind, test.kind);
            assert_eq!(restored_test.complete, test.complete);
            assert_eq!(restored_test.success, test.success);
            assert_eq!(restored_test.count, test.count);
            assert_eq!(restored_test.results, test.results);
        }
    }

    #[test]
    fn test_restored_snapshot_rebuilds_test_map() {
        let restored = SnapshotRecord::of(&populated_snapshot()).restore().unwrap();
        let names = vec!["alpha".to_string(), "build".to_string()];
        assert!(restored.find_test(&names).unwrap().success);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ct-state.json");

        let snapshot = populated_snapshot();
        let file = CheckpointFile {
            snapshots: vec![SnapshotRecord::of(&snapshot)],
            pending_snapshot: Some(SnapshotStub::of(&snapshot)),
            trash_snapshots: vec![],
        };
        file.write_to_file(&path).unwrap();

        let read = CheckpointFile::read_from_file(&path).unwrap().unwrap();
        assert_eq!(read.snapshots.len(), 1);
        assert_eq!(read.snapshots[0].name, "snapshot-1700000000000");
        assert_eq!(
            read.pending_snapshot.unwrap().directory,
            snapshot.directory
        );
        assert!(read.trash_snapshots.is_empty());
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let read = CheckpointFile::read_from_file(&dir.path().join("absent.json")).unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn test_stub_field_names_are_camel_case() {
        let snapshot = populated_snapshot();
        let json = serde_json::to_value(SnapshotStub::of(&snapshot)).unwrap();
        assert!(json.get("rootDir").is_some());
        assert!(json.get("useRootDir").is_some());
        assert!(json.get("directory").is_some());
        assert!(json.get("constructed").is_some());
    }

    #[test]
    fn test_test_record_keeps_raw_description() {
        let snapshot = populated_snapshot();
        let record = SnapshotRecord::of(&snapshot);
        assert_eq!(record.tests[0].description["type"], "lint");
        assert_eq!(record.tests[0].description["repo"], "alpha");
    }
}
