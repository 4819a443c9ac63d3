//! Repository plumbing
//!
//! Narrow wrappers around the git/npm/grunt/node subprocesses the
//! coordinator drives. Every wrapper runs in the checkout directory it
//! is given and captures stdout/stderr; callers decide whether a
//! non-zero exit is fatal for their loop.

mod errors;

pub use errors::{RepoError, RepoResult};

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Captured outcome of a finished subprocess
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// True when the process exited with status 0
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run a command to completion, capturing output regardless of exit status.
pub async fn run(command: &str, args: &[&str], cwd: &Path) -> RepoResult<ExecOutput> {
    let output = Command::new(command)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| RepoError::Spawn {
            command: format!("{} {}", command, args.join(" ")),
            source,
        })?;

    Ok(ExecOutput {
        // A signal-terminated child has no code; report -1 like a shell would report failure
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command, erroring on a non-zero exit status.
pub async fn execute(command: &str, args: &[&str], cwd: &Path) -> RepoResult<ExecOutput> {
    let output = run(command, args, cwd).await?;
    if !output.success() {
        return Err(RepoError::ExitStatus {
            command: format!("{} {}", command, args.join(" ")),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

/// Resolve a refspec to a 40-character commit id.
pub async fn git_rev_parse(root: &Path, repo: &str, refspec: &str) -> RepoResult<String> {
    let output = execute("git", &["rev-parse", refspec], &root.join(repo)).await?;
    let sha = output.stdout.trim().to_string();
    if sha.len() != 40 {
        return Err(RepoError::Output {
            command: format!("git rev-parse {}", refspec),
            message: format!("expected a 40-char sha, got {:?}", sha),
        });
    }
    Ok(sha)
}

/// Pull the current branch of a repository.
pub async fn git_pull(root: &Path, repo: &str) -> RepoResult<()> {
    execute("git", &["pull"], &root.join(repo)).await?;
    Ok(())
}

/// Timestamp (ms since epoch) of the last commit on the current branch.
pub async fn git_last_commit_timestamp(root: &Path, repo: &str) -> RepoResult<i64> {
    let output = execute("git", &["log", "-1", "--format=%ct"], &root.join(repo)).await?;
    let seconds: i64 = output
        .stdout
        .trim()
        .parse()
        .map_err(|_| RepoError::Output {
            command: "git log -1 --format=%ct".to_string(),
            message: format!("non-numeric commit timestamp {:?}", output.stdout.trim()),
        })?;
    Ok(seconds * 1000)
}

/// True iff the local master sha differs from the remote master sha.
pub async fn is_stale(root: &Path, repo: &str) -> RepoResult<bool> {
    let local = git_rev_parse(root, repo, "master").await?;

    let output = execute(
        "git",
        &["ls-remote", "origin", "refs/heads/master"],
        &root.join(repo),
    )
    .await?;
    let remote = output
        .stdout
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();
    if remote.len() != 40 {
        return Err(RepoError::Output {
            command: "git ls-remote origin refs/heads/master".to_string(),
            message: format!("expected a 40-char sha, got {:?}", remote),
        });
    }

    Ok(local != remote)
}

/// Clone every repo in the active list that is missing a checkout.
/// Returns the repos that were cloned.
pub async fn clone_missing_repos(root: &Path, clone_base_url: &str) -> RepoResult<Vec<String>> {
    let mut cloned = Vec::new();
    for repo in get_repo_list(root, "active-repos")? {
        if root.join(&repo).is_dir() {
            continue;
        }
        let url = format!("{}/{}.git", clone_base_url.trim_end_matches('/'), repo);
        execute("git", &["clone", &url, &repo], root).await?;
        cloned.push(repo);
    }
    Ok(cloned)
}

/// Synchronize a repository's node_modules (prune then update).
pub async fn npm_update(root: &Path, repo: &str) -> RepoResult<()> {
    let dir = root.join(repo);
    execute("npm", &["prune"], &dir).await?;
    execute("npm", &["update"], &dir).await?;
    Ok(())
}

/// Transpile all repos (runs in the chipper checkout).
pub async fn output_js_all(root: &Path) -> RepoResult<()> {
    execute("grunt", &["output-js-all"], &root.join("chipper")).await?;
    Ok(())
}

/// Read a repo list maintained in perennial/data.
pub fn get_repo_list(root: &Path, list: &str) -> RepoResult<Vec<String>> {
    let path = root.join("perennial").join("data").join(list);
    let contents = std::fs::read_to_string(&path).map_err(|source| RepoError::RepoList {
        list: list.to_string(),
        source,
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Enumerate the tests of a checkout as raw JSON descriptions.
///
/// The listing command lives in the checkout's perennial copy so the
/// test set always matches the snapshot being described.
pub async fn list_continuous_tests(checkout_root: &Path) -> RepoResult<Vec<serde_json::Value>> {
    let output = execute(
        "node",
        &["js/listContinuousTests.js"],
        &checkout_root.join("perennial"),
    )
    .await?;
    let descriptions: Vec<serde_json::Value> = serde_json::from_str(output.stdout.trim())?;
    Ok(descriptions)
}

/// Resolve the transitive dependency repos of a runnable.
pub async fn print_dependencies(checkout_root: &Path, repo: &str) -> RepoResult<Vec<String>> {
    let output = execute(
        "node",
        &["js/scripts/print-dependencies.js", repo],
        &checkout_root.join("chipper"),
    )
    .await?;
    Ok(output
        .stdout
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|dep| !dep.is_empty())
        .map(str::to_string)
        .collect())
}
