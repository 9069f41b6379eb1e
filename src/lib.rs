//! Board Engine Library
//!
//! Ordering and move-consistency engine for Kanban boards: fractional
//! position keys, per-column move serialization, and consistent snapshots.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod locks;
pub mod logging;
pub mod position;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod types;
