//! aquaserver entry point
//!
//! Parses flags, restores the checkpoint, spawns the five coordinator
//! loops, and serves HTTP until killed. Teardown is abrupt: SIGINT
//! terminates in-flight subprocesses and loops; the periodic checkpoint
//! bounds the loss.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use aquaserver::config::ServerConfig;
use aquaserver::coordinator::{
    autosave_loop, local_loop, report_loop, snapshot_loop, weights_loop, Coordinator,
};
use aquaserver::http_server::HttpServer;
use aquaserver::observability::Logger;

#[derive(Debug, Parser)]
#[command(name = "aquaserver", about = "Continuous-integration test coordinator")]
struct Cli {
    /// Port for the HTTP API
    #[arg(long, default_value_t = 45366)]
    port: u16,

    /// Working-directory root holding the repository checkouts
    #[arg(long, default_value = ".")]
    root_dir: PathBuf,

    /// Serve a single snapshot rooted at the working tree (no copies)
    #[arg(long)]
    use_root_dir: bool,

    /// Base URL missing repositories are cloned from
    #[arg(long)]
    clone_base_url: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let error_json = serde_json::json!({
            "status": "error",
            "message": e
        });
        eprintln!("{}", error_json);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = ServerConfig::with_port(cli.port);
    config.root_dir = cli.root_dir;
    config.use_root_dir = cli.use_root_dir;
    if let Some(clone_base_url) = cli.clone_base_url {
        config.clone_base_url = clone_base_url;
    }

    let coordinator = Arc::new(Coordinator::new(config));

    // A damaged checkpoint degrades to a cold start, not a dead server
    if let Err(e) = coordinator.load_from_file() {
        coordinator.record_error("startup", &format!("checkpoint restore failed: {}", e));
    } else {
        let restored = coordinator.state().snapshots.len();
        Logger::info("STATE_RESTORED", &[("snapshots", &restored.to_string())]);
    }

    tokio::spawn(snapshot_loop(Arc::clone(&coordinator)));
    tokio::spawn(local_loop(Arc::clone(&coordinator)));
    tokio::spawn(weights_loop(Arc::clone(&coordinator)));
    tokio::spawn(autosave_loop(Arc::clone(&coordinator)));
    tokio::spawn(report_loop(Arc::clone(&coordinator)));

    HttpServer::new(coordinator)
        .start()
        .await
        .map_err(|e| e.to_string())
}
