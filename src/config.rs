//! Server configuration
//!
//! Configuration for the coordinator: bind address, working-directory
//! root, and root-dir mode. Every field has a serde default so a partial
//! config file (or bare CLI flags) is enough to boot.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 45366)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory holding the repository checkouts (default: ".")
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// When true, a single snapshot is rooted at the working tree itself:
    /// no copies are made and no further snapshots are created.
    #[serde(default)]
    pub use_root_dir: bool,

    /// Base URL missing repositories are cloned from
    #[serde(default = "default_clone_base_url")]
    pub clone_base_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    45366
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_clone_base_url() -> String {
    "https://github.com/phetsims".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root_dir: default_root_dir(),
            use_root_dir: false,
            clone_base_url: default_clone_base_url(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Directory that holds the immutable snapshot copies
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root_dir.join("ct-snapshots")
    }

    /// Path of the durable state checkpoint file
    pub fn checkpoint_path(&self) -> PathBuf {
        self.root_dir.join("ct-state.json")
    }

    /// Checkout directory of a named repository
    pub fn repo_dir(&self, repo: &str) -> PathBuf {
        self.root_dir.join(repo)
    }

    /// The working-directory root
    pub fn root(&self) -> &Path {
        &self.root_dir
    }
}
