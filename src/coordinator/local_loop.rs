//! Local test loop
//!
//! Consumes lint and build work on this host. A test is marked
//! `complete` in the same critical section that selects it, so it runs
//! at most once no matter how the subprocess ends.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{available_local_tests, weighted_sample_index};
use crate::repos;
use crate::snapshot::TestKind;

use super::{now_millis, Coordinator};

/// The grunt invocation a selected local test maps to
#[derive(Debug, Clone, PartialEq)]
enum LocalCommand {
    Lint,
    LintEverything,
    Build { brands: Vec<String> },
}

impl fmt::Display for LocalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalCommand::Lint => write!(f, "Lint"),
            LocalCommand::LintEverything => write!(f, "Lint-everything"),
            LocalCommand::Build { .. } => write!(f, "Build"),
        }
    }
}

/// A selected test, cloned out of the state so the subprocess runs
/// without the lock
#[derive(Debug, Clone)]
struct LocalJob {
    snapshot_name: String,
    names: Vec<String>,
    cwd: PathBuf,
    command: LocalCommand,
}

/// Run local tests until process exit.
pub async fn local_loop(coordinator: Arc<Coordinator>) {
    loop {
        let job = select_job(&coordinator);
        match job {
            None => tokio::time::sleep(Duration::from_secs(1)).await,
            Some(job) => {
                if let Err(e) = run_job(&coordinator, &job).await {
                    coordinator.record_error("local loop", &e);
                }
            }
        }
    }
}

/// Weighted-sample one dispatchable local test and mark it complete.
fn select_job(coordinator: &Coordinator) -> Option<LocalJob> {
    let mut state = coordinator.state();
    if state.snapshots.is_empty() {
        return None;
    }

    let available = available_local_tests(&state.snapshots);
    if available.is_empty() {
        return None;
    }

    let weights: Vec<f64> = available.iter().map(|&(_, _, weight)| weight).collect();
    let mut rng = rand::thread_rng();
    let (snapshot_index, test_index, _) = available[weighted_sample_index(&mut rng, &weights)?];

    let snapshot = &mut state.snapshots[snapshot_index];
    let snapshot_name = snapshot.name.clone();
    let directory = snapshot.directory.clone()?;
    let test = &mut snapshot.tests[test_index];

    // At-most-once execution regardless of what the subprocess does
    test.complete = true;

    let (cwd, command) = match &test.kind {
        TestKind::Lint { repo } => (directory.join(repo), LocalCommand::Lint),
        TestKind::LintEverything => (directory.join("perennial"), LocalCommand::LintEverything),
        TestKind::Build { repo, brands } => (
            directory.join(repo),
            LocalCommand::Build {
                brands: brands.clone(),
            },
        ),
        _ => return None,
    };

    Some(LocalJob {
        snapshot_name,
        names: test.names.clone(),
        cwd,
        command,
    })
}

/// Run the grunt subprocess and record the outcome on the originating
/// test.
async fn run_job(coordinator: &Coordinator, job: &LocalJob) -> Result<(), String> {
    let start = now_millis();

    let output = match &job.command {
        LocalCommand::Lint => repos::run("grunt", &["lint"], &job.cwd).await,
        LocalCommand::LintEverything => {
            repos::run("grunt", &["lint-everything", "--hide-progress-bar"], &job.cwd).await
        }
        LocalCommand::Build { brands } => {
            let brands_arg = format!("--brands={}", brands.join(","));
            repos::run("grunt", &[&brands_arg, "--lint=false"], &job.cwd).await
        }
    };
    let output = output.map_err(|e| e.to_string())?;
    let elapsed = now_millis() - start;

    if output.success() {
        if matches!(job.command, LocalCommand::Build { .. }) {
            let mut state = coordinator.state();
            if let Some(test) = state
                .snapshots
                .iter_mut()
                .find(|snapshot| snapshot.name == job.snapshot_name)
                .and_then(|snapshot| snapshot.find_test_mut(&job.names))
            {
                test.success = true;
            }
        }
        coordinator.record_test_result(
            &job.snapshot_name,
            &job.names,
            true,
            elapsed,
            Some(output.stdout),
        );
    } else {
        let message = format!(
            "{} failed with status code {}:\n{}\n{}",
            job.command, output.code, output.stdout, output.stderr
        )
        .trim()
        .to_string();
        coordinator.record_test_result(
            &job.snapshot_name,
            &job.names,
            false,
            elapsed,
            Some(message),
        );
    }

    Ok(())
}
