//! Snapshot subsystem for aquaserver
//!
//! A snapshot is an immutable, named, on-disk copy of every active
//! repository at a mutually consistent set of commits, plus the list of
//! tests enumerated for that state. Snapshots are created only at
//! stable points (no repo stale), retired in two phases (trash list,
//! then asynchronous directory removal), and survive restarts through
//! the checkpoint file.
//!
//! Only `Test` runtime state (results, weight, count, complete,
//! success) mutates after construction; everything else is frozen.

mod creator;
mod errors;

pub use creator::construct;
pub use errors::{SnapshotError, SnapshotResult};
pub use test::{BrowserFlavor, BrowserTest, Test, TestKind, TestResult};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// A frozen cross-repo directory and its tests
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Working-directory root the snapshot was taken from
    pub root_dir: PathBuf,
    /// When true the snapshot IS the working tree (no copy was made)
    pub use_root_dir: bool,
    /// Creation time, ms since epoch
    pub timestamp: i64,
    /// `snapshot-<timestamp>`
    pub name: String,
    /// False once the construction sequence finished
    pub constructed: bool,
    /// False once on-disk removal completed
    pub exists: bool,
    /// Snapshot root on disk; None after removal
    pub directory: Option<PathBuf>,
    /// Repos captured in this snapshot
    pub repos: Vec<String>,
    /// Commit id per repo at capture time
    pub shas: BTreeMap<String, String>,
    /// Tests in listing order
    pub tests: Vec<Test>,
    test_map: HashMap<String, usize>,
}

impl Snapshot {
    /// Begin a snapshot: fix its timestamp, name, and directory.
    ///
    /// The directory is chosen before any I/O happens so the pending
    /// stub in the checkpoint can reclaim it after a crash. The real
    /// work happens in [`construct`].
    pub fn initialize(root_dir: &Path, use_root_dir: bool, timestamp: i64) -> Self {
        let directory = if use_root_dir {
            root_dir.to_path_buf()
        } else {
            root_dir.join("ct-snapshots").join(timestamp.to_string())
        };
        Self {
            root_dir: root_dir.to_path_buf(),
            use_root_dir,
            timestamp,
            name: format!("snapshot-{}", timestamp),
            constructed: false,
            exists: true,
            directory: Some(directory),
            repos: Vec::new(),
            shas: BTreeMap::new(),
            tests: Vec::new(),
            test_map: HashMap::new(),
        }
    }

    /// Rebuild the name→index map over `tests`, returning any duplicate
    /// name strings encountered (later duplicates are unreachable
    /// through [`Snapshot::find_test`]).
    pub fn index_tests(&mut self) -> Vec<String> {
        let mut duplicates = Vec::new();
        self.test_map.clear();
        for (index, test) in self.tests.iter().enumerate() {
            let key = test.name_string().to_string();
            if self.test_map.contains_key(&key) {
                duplicates.push(key);
            } else {
                self.test_map.insert(key, index);
            }
        }
        duplicates
    }

    /// Look up a test by its name sequence
    pub fn find_test(&self, names: &[String]) -> Option<&Test> {
        let key = names.join(".");
        self.test_map.get(&key).map(|&index| &self.tests[index])
    }

    /// Mutable lookup by name sequence
    pub fn find_test_mut(&mut self, names: &[String]) -> Option<&mut Test> {
        let key = names.join(".");
        let index = *self.test_map.get(&key)?;
        Some(&mut self.tests[index])
    }

    /// True when some build test for `repo` in this snapshot succeeded
    fn build_succeeded(&self, repo: &str) -> bool {
        self.tests.iter().any(|test| {
            test.success
                && matches!(&test.kind, TestKind::Build { repo: built, .. } if built == repo)
        })
    }

    /// Indices of browser tests currently deliverable from this snapshot.
    ///
    /// A browser test is held back until every build dependency has a
    /// successful build test here; `es5_only` additionally restricts to
    /// tests marked safe for legacy browsers.
    pub fn browser_available_tests(&self, es5_only: bool) -> Vec<usize> {
        self.tests
            .iter()
            .enumerate()
            .filter(|(_, test)| {
                let Some(browser) = test.browser() else {
                    return false;
                };
                if es5_only && !browser.es5 {
                    return false;
                }
                browser
                    .build_dependencies
                    .iter()
                    .all(|repo| self.build_succeeded(repo))
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Indices of local tests that have not been dispatched yet
    pub fn local_available_tests(&self) -> Vec<usize> {
        self.tests
            .iter()
            .enumerate()
            .filter(|(_, test)| test.is_local() && !test.complete)
            .map(|(index, _)| index)
            .collect()
    }

    /// Record that on-disk removal of this snapshot completed
    pub fn mark_removed(&mut self) {
        self.exists = false;
        self.directory = None;
    }
}

#[cfg(test)]
pub mod test_support {
    //! Builders shared by unit and integration tests

    use super::*;
    use serde_json::json;

    /// A constructed snapshot with the given timestamp and tests
    pub fn snapshot_with_tests(timestamp: i64, tests: Vec<Test>) -> Snapshot {
        let mut snapshot = Snapshot::initialize(Path::new("/tmp/ct-root"), false, timestamp);
        snapshot.tests = tests;
        let duplicates = snapshot.index_tests();
        assert!(duplicates.is_empty(), "duplicate test names: {duplicates:?}");
        snapshot.constructed = true;
        snapshot
    }

    pub fn lint_test(repo: &str) -> Test {
        Test::from_description(
            json!({ "test": [repo, "lint"], "type": "lint", "repo": repo }),
            0,
            0,
        )
        .unwrap()
    }

    pub fn build_test(repo: &str) -> Test {
        Test::from_description(
            json!({ "test": [repo, "build"], "type": "build", "repo": repo, "brands": ["phet"] }),
            0,
            0,
        )
        .unwrap()
    }

    pub fn sim_test(repo: &str, es5: bool, build_dependencies: &[&str]) -> Test {
        Test::from_description(
            json!({
                "test": [repo, "fuzz", "require.js"],
                "type": "sim-test",
                "url": format!("{repo}/{repo}_en.html"),
                "es5": es5,
                "buildDependencies": build_dependencies,
            }),
            0,
            0,
        )
        .unwrap()
    }
}
