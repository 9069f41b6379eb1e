//! Subcommand implementations.

use crate::config::{Config, StorageBackend};
use crate::coordinator::MoveCoordinator;
use crate::db::Database;
use crate::server::{AppState, start_server};
use crate::snapshot::{SnapshotFilter, SnapshotService};
use crate::store::{BoardStore, MemoryStore, invariant_violations};
use crate::types::NewBoard;
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::{info, warn};

/// Open the configured store.
pub fn open_store(config: &Config) -> Result<Arc<dyn BoardStore>> {
    let allocator = config.board.allocator();
    match config.server.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; boards are lost on exit");
            Ok(Arc::new(MemoryStore::new().with_allocator(allocator)))
        }
        StorageBackend::Sqlite => {
            let db_path = &config.server.db_path;
            if let Some(parent) = db_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let db = Database::open(db_path)
                .with_context(|| format!("failed to open database {}", db_path.display()))?
                .with_allocator(allocator);
            info!("Opened database at {}", db_path.display());
            Ok(Arc::new(db))
        }
    }
}

/// Build the coordinator for a store using the board settings.
pub fn coordinator(config: &Config, store: Arc<dyn BoardStore>) -> MoveCoordinator {
    MoveCoordinator::new(store)
        .with_allocator(config.board.allocator())
        .with_lock_timeout(config.board.lock_timeout())
}

/// Run the HTTP server until Ctrl-C.
pub async fn run_serve(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let coordinator = Arc::new(coordinator(&config, store));
    let state = AppState::new(coordinator, config.board.default_columns.clone());

    let handle = start_server(state, config.server.bind, config.server.port).await?;
    info!(
        lock_timeout_ms = config.board.lock_timeout_ms,
        max_key_length = config.board.max_key_length,
        "Serving boards on http://{}",
        handle.addr()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    handle.shutdown().await;
    Ok(())
}

/// Print a board snapshot as pretty JSON.
pub fn run_snapshot(config: &Config, board_id: &str) -> Result<()> {
    let store = open_store(config)?;
    let view = SnapshotService::new(store).snapshot(board_id, &SnapshotFilter::default())?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Check every board; fails if any invariant is violated.
pub fn run_check(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let problems = check_store(store.as_ref())?;

    if problems.is_empty() {
        println!("All boards consistent");
        return Ok(());
    }
    for problem in &problems {
        println!("{problem}");
    }
    bail!("{} invariant violation(s) found", problems.len())
}

/// Collect invariant violations across all boards of a store.
pub fn check_store(store: &dyn BoardStore) -> Result<Vec<String>> {
    let mut problems = Vec::new();
    for summary in store.list_boards()? {
        let board = store.get_board(&summary.id)?;
        problems.extend(invariant_violations(&board));
    }
    Ok(problems)
}

/// Create a board, print it, and return its ID.
pub fn run_create_board(config: &Config, name: &str, columns: Vec<String>) -> Result<String> {
    let store = open_store(config)?;
    let columns = if columns.is_empty() {
        config.board.default_columns.clone()
    } else {
        columns
    };
    let board = store.create_board(NewBoard::named(name).with_columns(columns))?;
    println!("{}", serde_json::to_string_pretty(&board)?);
    Ok(board.board.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewCard;
    use tempfile::TempDir;

    fn sqlite_config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.db_path = temp.path().join("nested").join("boards.db");
        config
    }

    #[test]
    fn test_open_store_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let config = sqlite_config(&temp);
        open_store(&config).unwrap();
        assert!(config.server.db_path.exists());
    }

    #[test]
    fn test_create_board_then_check() {
        let temp = TempDir::new().unwrap();
        let config = sqlite_config(&temp);
        let board_id = run_create_board(&config, "Launch", vec![]).unwrap();

        let store = open_store(&config).unwrap();
        let board = store.get_board(&board_id).unwrap();
        assert_eq!(board.columns.len(), config.board.default_columns.len());
        store
            .create_card(&board.columns[0].column.id, NewCard::titled("first"))
            .unwrap();

        assert!(check_store(store.as_ref()).unwrap().is_empty());
        assert!(run_check(&config).is_ok());
    }
}
