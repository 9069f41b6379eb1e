//! Board Engine
//!
//! HTTP service and CLI for Kanban board ordering and move consistency.

use anyhow::Result;
use board_engine::cli::commands::{run_check, run_create_board, run_serve, run_snapshot};
use board_engine::cli::{Cli, Command};
use board_engine::config::{ConfigLoader, ConfigPaths};
use board_engine::logging::{self, LogTarget};
use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    // --config acts as BOARD_ENGINE_CONFIG_PATH and wins over the environment
    let mut loader = ConfigLoader::load_with_env(ConfigPaths::discover(), |key| {
        if key == "BOARD_ENGINE_CONFIG_PATH" && cli.config.is_some() {
            return cli.config.clone();
        }
        std::env::var(key).ok()
    })?;
    for source in loader.sources() {
        debug!("Loaded config from {}", source.display());
    }

    cli.apply_overrides(loader.config_mut());
    let config = loader.into_config();
    config.validate()?;

    match cli.command {
        Some(Command::Snapshot { board_id }) => run_snapshot(&config, &board_id)?,
        Some(Command::Check) => run_check(&config)?,
        Some(Command::CreateBoard { name, columns }) => {
            run_create_board(&config, &name, columns)?;
        }
        Some(Command::Serve) | None => run_serve(config).await?,
    }

    Ok(())
}
