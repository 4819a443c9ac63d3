//! Snapshot lifecycle loop
//!
//! Polls repo staleness, pulls until a stable point is reached, then
//! freezes a new snapshot and retires the surplus. Runs forever; every
//! failure is caught at the iteration boundary and surfaced through the
//! error sink.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use futures_util::future::join_all;

use crate::checkpoint::SnapshotStub;
use crate::dispatch::update_recent_weights;
use crate::observability::Logger;
use crate::repos;
use crate::snapshot::{construct, Snapshot};

use super::{evict_old_snapshots, now_millis, Coordinator};

/// Hour of day before which a fresh snapshot is deferred while the
/// newest one still has untouched browser tests
const QUIET_HOURS_END: u32 = 5;

/// Run the snapshot lifecycle until process exit.
pub async fn snapshot_loop(coordinator: Arc<Coordinator>) {
    let mut was_stale = startup(&coordinator).await;

    if coordinator.config.use_root_dir {
        if let Err(e) = create_root_dir_snapshot(&coordinator).await {
            coordinator.record_error("snapshot loop", &e);
        }
        return;
    }

    loop {
        if let Err(e) = iteration(&coordinator, &mut was_stale).await {
            coordinator.record_error("snapshot loop", &e);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Cold-start triage: resynchronize `wasStale` with upstream, reclaim
/// leftover trash directories, and refresh node_modules where missing.
/// Returns the initial `wasStale`.
async fn startup(coordinator: &Arc<Coordinator>) -> bool {
    let root = coordinator.config.root_dir.clone();

    let restored_shas = coordinator
        .state()
        .snapshots
        .first()
        .map(|snapshot| snapshot.shas.clone());
    let was_stale = match restored_shas {
        None => true,
        Some(shas) => {
            let mut mismatch = false;
            for (repo, sha) in &shas {
                match repos::git_rev_parse(&root, repo, "master").await {
                    Ok(fresh) if fresh == *sha => {}
                    Ok(_) => {
                        mismatch = true;
                        break;
                    }
                    Err(e) => {
                        coordinator.record_error("snapshot loop startup", &e.to_string());
                        mismatch = true;
                        break;
                    }
                }
            }
            mismatch
        }
    };

    let trash = coordinator.state().trash_snapshots.clone();
    for stub in trash {
        coordinator.schedule_trash_deletion(stub);
    }

    match repos::get_repo_list(&root, "active-repos") {
        Ok(active) => {
            for repo in active {
                let dir = root.join(&repo);
                if dir.join("package.json").exists() && !dir.join("node_modules").exists() {
                    if let Err(e) = repos::npm_update(&root, &repo).await {
                        coordinator.record_error("snapshot loop startup", &e.to_string());
                    }
                }
            }
        }
        Err(e) => coordinator.record_error("snapshot loop startup", &e.to_string()),
    }

    was_stale
}

/// Root-dir mode: one snapshot aliasing the working tree, then done.
async fn create_root_dir_snapshot(coordinator: &Arc<Coordinator>) -> Result<(), String> {
    coordinator.set_status("Creating snapshot");
    let mut snapshot = Snapshot::initialize(&coordinator.config.root_dir, true, now_millis());
    construct(&mut snapshot).await.map_err(|e| e.to_string())?;

    let mut state = coordinator.state();
    state.snapshots.insert(0, snapshot);
    update_recent_weights(&mut state.snapshots, now_millis());
    drop(state);

    coordinator.set_status("Running");
    Ok(())
}

async fn iteration(coordinator: &Arc<Coordinator>, was_stale: &mut bool) -> Result<(), String> {
    let root = coordinator.config.root_dir.clone();

    coordinator.set_status("Checking stale repos");
    let active = repos::get_repo_list(&root, "active-repos").map_err(|e| e.to_string())?;
    let staleness = join_all(active.iter().map(|repo| repos::is_stale(&root, repo))).await;
    let mut stale_repos = Vec::new();
    for (repo, result) in active.iter().zip(staleness) {
        if result.map_err(|e| e.to_string())? {
            stale_repos.push(repo.clone());
        }
    }

    if !stale_repos.is_empty() {
        *was_stale = true;

        coordinator.set_status("Pulling repos");
        for repo in &stale_repos {
            repos::git_pull(&root, repo).await.map_err(|e| e.to_string())?;
        }
        let cloned = repos::clone_missing_repos(&root, &coordinator.config.clone_base_url)
            .await
            .map_err(|e| e.to_string())?;

        coordinator.set_status("Updating node modules");
        for repo in stale_repos.iter().chain(&cloned) {
            if root.join(repo).join("package.json").exists() {
                repos::npm_update(&root, repo).await.map_err(|e| e.to_string())?;
            }
        }

        coordinator.set_status("Transpiling");
        repos::output_js_all(&root).await.map_err(|e| e.to_string())?;

        return Ok(());
    }

    // Stable point. Only worth a snapshot if something changed since
    // the last one.
    if !*was_stale {
        coordinator.set_status("Running");
        return Ok(());
    }

    let completed_all_tests = {
        let state = coordinator.state();
        match state.snapshots.first() {
            None => true,
            Some(newest) => !newest
                .tests
                .iter()
                .any(|test| test.is_browser() && test.count == 0),
        }
    };
    if local_hour() < QUIET_HOURS_END && !completed_all_tests {
        Logger::info(
            "SNAPSHOT_DEFERRED",
            &[("reason", "quiet hours, newest snapshot incomplete")],
        );
        return Ok(());
    }

    *was_stale = false;
    create_snapshot(coordinator).await
}

/// Freeze a new snapshot, prepend it, evict the surplus, and retire the
/// directories of everything beyond the active window.
async fn create_snapshot(coordinator: &Arc<Coordinator>) -> Result<(), String> {
    coordinator.set_status("Creating snapshot");

    let mut snapshot = Snapshot::initialize(&coordinator.config.root_dir, false, now_millis());
    coordinator.state().pending_snapshot = Some(SnapshotStub::of(&snapshot));

    // The pending stub stays behind on failure so the next boot can
    // reclaim the partial directory.
    construct(&mut snapshot).await.map_err(|e| e.to_string())?;

    let evicted = {
        let mut state = coordinator.state();
        state.snapshots.insert(0, snapshot);
        state.pending_snapshot = None;

        let now = now_millis();
        let state = &mut *state;
        let evicted = evict_old_snapshots(&mut state.snapshots, &mut state.trash_snapshots, now);
        update_recent_weights(&mut state.snapshots, now);
        evicted
    };
    for stub in evicted {
        coordinator.schedule_trash_deletion(stub);
    }

    if let Err(e) = coordinator.save_checkpoint() {
        coordinator.record_error("snapshot checkpoint", &e.to_string());
    }

    coordinator.set_status("Removing old snapshot files");
    let stubs = {
        let mut state = coordinator.state();
        let mut stubs = Vec::new();
        let trashed: Vec<Option<std::path::PathBuf>> = state
            .trash_snapshots
            .iter()
            .map(|stub| stub.directory.clone())
            .collect();
        for snapshot in state.snapshots.iter().skip(3) {
            if snapshot.exists && !trashed.contains(&snapshot.directory) {
                stubs.push(SnapshotStub::of(snapshot));
            }
        }
        state.trash_snapshots.extend(stubs.iter().cloned());
        stubs
    };
    for stub in stubs {
        coordinator.schedule_trash_deletion(stub);
    }

    coordinator.set_status("Running");
    Ok(())
}

fn local_hour() -> u32 {
    Local::now().hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::snapshot::test_support::{sim_test, snapshot_with_tests};
    use tempfile::TempDir;

    #[test]
    fn test_quiet_hours_boundary() {
        assert!(4 < QUIET_HOURS_END);
        assert!(5 >= QUIET_HOURS_END);
    }

    #[tokio::test]
    async fn test_startup_schedules_persisted_trash() {
        let dir = TempDir::new().unwrap();
        let coordinator = Arc::new(Coordinator::new(ServerConfig {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        }));

        let doomed = dir.path().join("ct-snapshots").join("777");
        std::fs::create_dir_all(&doomed).unwrap();
        coordinator.state().trash_snapshots.push(SnapshotStub {
            root_dir: dir.path().to_path_buf(),
            constructed: false,
            directory: Some(doomed.clone()),
            use_root_dir: false,
        });

        // No snapshots restored and no active-repos file: startup
        // records the list error but must still reclaim trash.
        let was_stale = startup(&coordinator).await;
        assert!(was_stale);

        for _ in 0..100 {
            if !doomed.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!doomed.exists());
    }

    #[test]
    fn test_completed_all_tests_definition() {
        let mut snapshot = snapshot_with_tests(1, vec![sim_test("alpha", false, &[])]);

        let untouched = snapshot
            .tests
            .iter()
            .any(|test| test.is_browser() && test.count == 0);
        assert!(untouched);

        snapshot.tests[0].count = 2;
        let untouched = snapshot
            .tests
            .iter()
            .any(|test| test.is_browser() && test.count == 0);
        assert!(!untouched);
    }
}
