//! Configuration types.

use crate::coordinator::DEFAULT_LOCK_TIMEOUT;
use crate::position::{DEFAULT_MAX_KEY_LENGTH, MIN_KEY_LENGTH, PositionAllocator};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 31995;

/// Which store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite file at `server.db_path` (default).
    #[default]
    Sqlite,
    /// Process-local, lost on exit.
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{other}' (expected sqlite or memory)")),
        }
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address to bind the HTTP listener to.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub storage: StorageBackend,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: default_bind(),
            port: default_port(),
            storage: StorageBackend::default(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("board-engine/boards.db")
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Ordering and locking behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Longest wait for a column or board lock before a request fails with
    /// `LOCK_TIMEOUT`.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Key length at which a container is renumbered instead of subdivided.
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,

    /// Columns created for a new board when the request names none.
    #[serde(default = "default_columns")]
    pub default_columns: Vec<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            max_key_length: default_max_key_length(),
            default_columns: default_columns(),
        }
    }
}

impl BoardConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn allocator(&self) -> PositionAllocator {
        PositionAllocator::new(self.max_key_length)
    }
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_millis() as u64
}

fn default_max_key_length() -> usize {
    DEFAULT_MAX_KEY_LENGTH
}

fn default_columns() -> Vec<String> {
    ["To Do", "In Progress", "Done"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub board: BoardConfig,
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.board.lock_timeout_ms == 0 {
            bail!("board.lock_timeout_ms must be greater than 0");
        }
        if self.board.max_key_length < MIN_KEY_LENGTH {
            bail!(
                "board.max_key_length must be at least {} (got {})",
                MIN_KEY_LENGTH,
                self.board.max_key_length
            );
        }
        if self.board.default_columns.iter().any(|c| c.trim().is_empty()) {
            bail!("board.default_columns must not contain blank names");
        }
        Ok(())
    }
}
