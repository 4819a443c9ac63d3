//! Snapshot construction
//!
//! Construction runs only at a stable point (no active repo stale) and
//! follows a fixed sequence:
//!
//! 1. Create the snapshot directory (skipped in root-dir mode)
//! 2. Capture the active repo list and each repo's commit id
//! 3. Copy each working checkout into the snapshot, sequentially
//! 4. Resolve per-repo and per-runnable commit timestamps
//! 5. Enumerate the tests of the frozen checkout
//! 6. Append the synthetic listing test, failing it on duplicate names
//!
//! The caller records a pending stub in the checkpoint before invoking
//! this, so a crash mid-sequence leaves a reclaimable directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::observability::Logger;
use crate::repos;

use super::errors::{SnapshotError, SnapshotResult};
use super::test::Test;
use super::Snapshot;

/// Name sequence of the synthetic test that reports listing problems
pub const LISTING_TEST_NAMES: [&str; 2] = ["perennial", "listContinuousTests"];

/// Recursively copy a directory tree. Symlinks and other special file
/// types are skipped.
fn copy_dir_recursive(src: &Path, dst: &Path) -> SnapshotResult<()> {
    fs::create_dir_all(dst).map_err(|e| SnapshotError::io(dst, e))?;

    let entries = fs::read_dir(src).map_err(|e| SnapshotError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SnapshotError::io(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        let file_type = entry.file_type().map_err(|e| SnapshotError::io(&src_path, e))?;
        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path).map_err(|e| SnapshotError::io(&src_path, e))?;
        }
    }

    Ok(())
}

/// Copy one repo checkout into the snapshot on a blocking thread.
async fn copy_repo(src: PathBuf, dst: PathBuf) -> SnapshotResult<()> {
    tokio::task::spawn_blocking(move || copy_dir_recursive(&src, &dst))
        .await
        .map_err(|e| SnapshotError::CopyTask(e.to_string()))?
}

/// Run the construction sequence against an initialized snapshot shell.
pub async fn construct(snapshot: &mut Snapshot) -> SnapshotResult<()> {
    let root = snapshot.root_dir.clone();
    let directory = snapshot
        .directory
        .clone()
        .expect("initialized snapshot has a directory");

    if !snapshot.use_root_dir {
        fs::create_dir_all(&directory).map_err(|e| SnapshotError::io(&directory, e))?;
    }

    snapshot.repos = repos::get_repo_list(&root, "active-repos")?;

    for repo in snapshot.repos.clone() {
        let sha = repos::git_rev_parse(&root, &repo, "master").await?;
        snapshot.shas.insert(repo.clone(), sha);

        if !snapshot.use_root_dir {
            copy_repo(root.join(&repo), directory.join(&repo)).await?;
        }
    }

    let mut last_repo_timestamps: HashMap<String, i64> = HashMap::new();
    for repo in &snapshot.repos {
        last_repo_timestamps.insert(
            repo.clone(),
            repos::git_last_commit_timestamp(&root, repo).await?,
        );
    }

    // Dependency timestamps are best-effort: a runnable whose dependency
    // scan fails simply keeps no entry (treated as 0 below).
    let mut last_runnable_timestamps: HashMap<String, i64> = HashMap::new();
    let runnables = repos::get_repo_list(&root, "active-runnables").unwrap_or_else(|e| {
        Logger::warn("RUNNABLE_LIST_FAILED", &[("error", &e.to_string())]);
        Vec::new()
    });
    for runnable in &runnables {
        match repos::print_dependencies(&directory, runnable).await {
            Ok(dependencies) => {
                let newest = dependencies
                    .iter()
                    .filter_map(|dep| last_repo_timestamps.get(dep))
                    .copied()
                    .max()
                    .unwrap_or(0);
                last_runnable_timestamps.insert(runnable.clone(), newest);
            }
            Err(e) => {
                Logger::warn(
                    "DEPENDENCY_SCAN_FAILED",
                    &[("repo", runnable.as_str()), ("error", &e.to_string())],
                );
            }
        }
    }

    let descriptions = repos::list_continuous_tests(&directory).await?;
    for description in descriptions {
        let first_name = description
            .get("test")
            .and_then(|names| names.get(0))
            .and_then(|name| name.as_str())
            .unwrap_or("");
        let repo_commit_timestamp = last_repo_timestamps.get(first_name).copied().unwrap_or(0);
        let dependencies_commit_timestamp = last_runnable_timestamps
            .get(first_name)
            .copied()
            .unwrap_or(0);

        snapshot.tests.push(Test::from_description(
            description,
            repo_commit_timestamp,
            dependencies_commit_timestamp,
        )?);
    }

    snapshot.tests.push(Test::internal(
        LISTING_TEST_NAMES.iter().map(|s| s.to_string()).collect(),
    ));

    let duplicates = snapshot.index_tests();
    let listing_index = snapshot.tests.len() - 1;
    if duplicates.is_empty() {
        snapshot.tests[listing_index].record_result(true, 0, None);
    } else {
        snapshot.tests[listing_index].record_result(
            false,
            0,
            Some(format!("Duplicate test names: {}", duplicates.join(", "))),
        );
    }

    snapshot.constructed = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_recursive_copies_nested_files() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        File::create(src.join("a.txt"))
            .unwrap()
            .write_all(b"alpha")
            .unwrap();
        File::create(src.join("nested").join("b.txt"))
            .unwrap()
            .write_all(b"beta")
            .unwrap();

        let dst = dir.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "alpha");
        assert_eq!(
            fs::read_to_string(dst.join("nested").join("b.txt")).unwrap(),
            "beta"
        );
    }

    #[test]
    fn test_copy_dir_recursive_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = copy_dir_recursive(&dir.path().join("absent"), &dir.path().join("dst"));
        assert!(err.is_err());
    }

    #[test]
    fn test_listing_test_names() {
        assert_eq!(LISTING_TEST_NAMES.join("."), "perennial.listContinuousTests");
    }
}
