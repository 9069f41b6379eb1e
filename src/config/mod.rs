//! Layered configuration.
//!
//! Tiers, lowest to highest, merged field by field:
//! 1. **Defaults** - built into the binary
//! 2. **Project** - `$CWD/board-engine/config.yaml`
//! 3. **User** - `~/.board-engine/config.yaml`
//! 4. **Environment** - see below
//!
//! CLI flags are applied on top by the binary.
//!
//! ## Environment Variables
//! - `BOARD_ENGINE_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `BOARD_ENGINE_DB_PATH` - Database path
//! - `BOARD_ENGINE_PORT` - HTTP port
//! - `BOARD_ENGINE_LOCK_TIMEOUT_MS` - Lock wait bound
//! - `BOARD_ENGINE_STORAGE` - `sqlite` or `memory`
//! - `BOARD_ENGINE_USER_DIR` - User config dir (default: `~/.board-engine`)
//! - `BOARD_ENGINE_PROJECT_DIR` - Project config dir (default: `./board-engine`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
