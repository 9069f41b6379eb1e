//! CLI command definitions for board-engine
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod commands;

use crate::config::{Config, StorageBackend};
use clap::{Parser, Subcommand, ValueEnum};

/// Storage backend selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageArg {
    Sqlite,
    Memory,
}

impl From<StorageArg> for StorageBackend {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Sqlite => StorageBackend::Sqlite,
            StorageArg::Memory => StorageBackend::Memory,
        }
    }
}

/// Kanban board ordering and move-consistency engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Storage backend (overrides config)
    #[arg(long, value_enum, global = true)]
    pub storage: Option<StorageArg>,

    /// HTTP port (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(db_path) = &self.database {
            config.server.db_path = db_path.into();
        }
        if let Some(storage) = self.storage {
            config.server.storage = storage.into();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve,

    /// Print a board snapshot as JSON
    Snapshot {
        /// Board ID
        board_id: String,
    },

    /// Verify ordering and ownership invariants for every board
    Check,

    /// Create a board and print it as JSON
    CreateBoard {
        /// Board name
        name: String,

        /// Column names, left to right (defaults from config when omitted)
        #[arg(long = "column")]
        columns: Vec<String>,
    },
}
