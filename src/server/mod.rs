//! JSON-over-HTTP interface for the board engine.
//!
//! Clients mutate through the card/column routes and then refetch the board
//! snapshot; every error maps to a status code and a structured body.

mod extract;
mod routes;

pub use routes::{AppState, ServerHandle, build_router, start_server};
