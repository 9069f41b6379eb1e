//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// Project-level config ($CWD/board-engine/)
    Project = 1,
    /// User-level config (~/.board-engine/)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Paths for each configuration tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project-level config directory
    pub project_dir: Option<PathBuf>,
    /// User-level config directory
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: BOARD_ENGINE_USER_DIR or ~/.board-engine
        let user_dir = std::env::var("BOARD_ENGINE_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".board-engine")));

        // Project dir: BOARD_ENGINE_PROJECT_DIR or $CWD/board-engine
        let project_dir = std::env::var("BOARD_ENGINE_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("board-engine")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    /// Config file for a tier, if that tier has a directory.
    pub fn config_file(&self, tier: ConfigTier) -> Option<PathBuf> {
        match tier {
            ConfigTier::Project => self.project_dir.as_ref().map(|d| d.join("config.yaml")),
            ConfigTier::User => self.user_dir.as_ref().map(|d| d.join("config.yaml")),
            ConfigTier::Defaults | ConfigTier::Environment => None,
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Paths for each tier
    pub paths: ConfigPaths,
    /// Loaded configuration
    config: Config,
    /// Config files that contributed, lowest tier first
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        Self::load_with_env(paths, |key| std::env::var(key).ok())
    }

    /// Load configuration reading environment overrides through `env`.
    pub fn load_with_env<F>(paths: ConfigPaths, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Explicit config file replaces the file tiers entirely
        if let Some(explicit_path) = env("BOARD_ENGINE_CONFIG_PATH") {
            let path = PathBuf::from(&explicit_path);
            let mut config = Config::load(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            Self::apply_env_overrides(&mut config, &env);
            config.validate()?;
            return Ok(Self {
                paths,
                config,
                sources: vec![path],
            });
        }

        let mut configs: Vec<Value> = Vec::new();
        let mut sources = Vec::new();

        // Tier 1: Defaults
        configs.push(serde_json::to_value(Config::default())?);

        // Tiers 2 and 3: Project, then user
        for tier in [ConfigTier::Project, ConfigTier::User] {
            let Some(config_file) = paths.config_file(tier) else {
                continue;
            };
            if let Some(value) = read_yaml(&config_file, tier) {
                configs.push(value);
                sources.push(config_file);
            }
        }

        let merged = deep_merge_all(configs);
        let mut config: Config =
            serde_json::from_value(merged).context("invalid merged configuration")?;

        // Tier 4: Environment variable overrides
        Self::apply_env_overrides(&mut config, &env);
        config.validate()?;

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    /// Apply environment variable overrides to config.
    /// Unparseable values are ignored with a warning.
    fn apply_env_overrides<F>(config: &mut Config, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = env("BOARD_ENGINE_DB_PATH") {
            config.server.db_path = PathBuf::from(db_path);
        }

        if let Some(port) = env("BOARD_ENGINE_PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!("Ignoring BOARD_ENGINE_PORT={port}: not a port number"),
            }
        }

        if let Some(timeout) = env("BOARD_ENGINE_LOCK_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => config.board.lock_timeout_ms = ms,
                Err(_) => warn!("Ignoring BOARD_ENGINE_LOCK_TIMEOUT_MS={timeout}: not a number"),
            }
        }

        if let Some(storage) = env("BOARD_ENGINE_STORAGE") {
            match storage.parse() {
                Ok(storage) => config.server.storage = storage,
                Err(e) => warn!("Ignoring BOARD_ENGINE_STORAGE: {e}"),
            }
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Config files that were merged, lowest tier first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Get the project directory.
    pub fn project_dir(&self) -> Option<&Path> {
        self.paths.project_dir.as_deref()
    }

    /// Get the user directory.
    pub fn user_dir(&self) -> Option<&Path> {
        self.paths.user_dir.as_deref()
    }
}

/// Read a tier's YAML file. Missing files are skipped silently; unreadable
/// or malformed ones are skipped with a warning.
fn read_yaml(path: &Path, tier: ConfigTier) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Skipping {tier} config {}: {e}", path.display());
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Skipping {tier} config {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_config_paths_discover() {
        let paths = ConfigPaths::discover();
        assert!(paths.project_dir.is_some());
        // user_dir may or may not exist depending on environment
    }

    #[test]
    fn test_load_defaults_only() {
        // Create empty temp dirs so no config files are found
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );

        let loader = ConfigLoader::load_with_env(paths, no_env).unwrap();
        let config = loader.config();

        assert_eq!(config.board.lock_timeout_ms, 5000);
        assert_eq!(config.server.storage, StorageBackend::Sqlite);
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn test_project_config_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("board-engine");
        std::fs::create_dir_all(&project_dir).unwrap();

        let config_content = r#"
board:
  lock_timeout_ms: 750
"#;
        std::fs::write(project_dir.join("config.yaml"), config_content).unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(temp.path().join("user")));

        let loader = ConfigLoader::load_with_env(paths, no_env).unwrap();
        let config = loader.config();

        assert_eq!(config.board.lock_timeout_ms, 750);
        // Untouched fields keep their defaults
        assert_eq!(config.board.max_key_length, 12);
        assert_eq!(loader.sources().len(), 1);
    }

    #[test]
    fn test_user_config_overrides_project() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("board-engine");
        let user_dir = temp.path().join("user");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::create_dir_all(&user_dir).unwrap();

        let project_config = r#"
server:
  port: 4000
board:
  default_columns: [Backlog, Done]
"#;
        std::fs::write(project_dir.join("config.yaml"), project_config).unwrap();

        let user_config = r#"
server:
  port: 5000
"#;
        std::fs::write(user_dir.join("config.yaml"), user_config).unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(user_dir));

        let loader = ConfigLoader::load_with_env(paths, no_env).unwrap();
        let config = loader.config();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.board.default_columns, vec!["Backlog", "Done"]);
    }

    #[test]
    fn test_env_overrides_files() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("board-engine");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("config.yaml"), "server:\n  port: 4000\n").unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("BOARD_ENGINE_PORT", "6000"),
            ("BOARD_ENGINE_DB_PATH", "/tmp/x.db"),
            ("BOARD_ENGINE_LOCK_TIMEOUT_MS", "not-a-number"),
        ]);
        let paths = ConfigPaths::with_dirs(Some(project_dir), None);
        let loader =
            ConfigLoader::load_with_env(paths, |k| env.get(k).map(|v| v.to_string())).unwrap();
        let config = loader.config();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.board.lock_timeout_ms, 5000);
    }

    #[test]
    fn test_explicit_config_path_skips_tiers() {
        let temp = TempDir::new().unwrap();
        let explicit = temp.path().join("explicit.yaml");
        std::fs::write(&explicit, "server:\n  storage: memory\n").unwrap();

        let project_dir = temp.path().join("board-engine");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("config.yaml"), "server:\n  port: 4000\n").unwrap();

        let explicit_str = explicit.to_string_lossy().to_string();
        let paths = ConfigPaths::with_dirs(Some(project_dir), None);
        let loader = ConfigLoader::load_with_env(paths, |k| {
            (k == "BOARD_ENGINE_CONFIG_PATH").then(|| explicit_str.clone())
        })
        .unwrap();

        assert_eq!(loader.config().server.storage, StorageBackend::Memory);
        assert_ne!(loader.config().server.port, 4000);
    }

    #[test]
    fn test_invalid_merged_value_is_an_error() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("board-engine");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(
            project_dir.join("config.yaml"),
            "board:\n  max_key_length: 4\n",
        )
        .unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), None);
        assert!(ConfigLoader::load_with_env(paths, no_env).is_err());
    }
}
