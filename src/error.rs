//! Structured error types for board operations and HTTP responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    InvalidArgument,

    // Not found errors
    BoardNotFound,
    ColumnNotFound,
    CardNotFound,

    // Conflict errors
    ConcurrentModification,
    ColumnNotEmpty,

    // Contention
    LockTimeout,

    // Internal errors
    DatabaseError,
    InternalError,
}

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Board,
    Column,
    Card,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Board => write!(f, "board"),
            Entity::Column => write!(f, "column"),
            Entity::Card => write!(f, "card"),
        }
    }
}

/// Errors surfaced by the board store, move coordinator and snapshot service.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("{entity} {id} was modified concurrently; reload the board and retry")]
    ConcurrentModification {
        entity: Entity,
        id: String,
        details: String,
    },

    #[error("column {id} still owns {count} card(s)")]
    ColumnNotEmpty { id: String, count: usize },

    #[error("board busy: gave up waiting for a lock after {waited_ms}ms")]
    LockTimeout { waited_ms: u64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BoardError {
    // Convenience constructors

    pub fn board_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: Entity::Board,
            id: id.to_string(),
        }
    }

    pub fn column_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: Entity::Column,
            id: id.to_string(),
        }
    }

    pub fn card_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: Entity::Card,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn card_version_mismatch(id: &str, expected: i64, actual: i64) -> Self {
        Self::ConcurrentModification {
            entity: Entity::Card,
            id: id.to_string(),
            details: format!("expected version {expected}, found {actual}"),
        }
    }

    pub fn column_version_mismatch(id: &str, expected: i64, actual: i64) -> Self {
        Self::ConcurrentModification {
            entity: Entity::Column,
            id: id.to_string(),
            details: format!("expected version {expected}, found {actual}"),
        }
    }

    pub fn concurrent(entity: Entity, id: &str, details: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            entity,
            id: id.to_string(),
            details: details.into(),
        }
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BoardError::NotFound { entity, .. } => match entity {
                Entity::Board => ErrorCode::BoardNotFound,
                Entity::Column => ErrorCode::ColumnNotFound,
                Entity::Card => ErrorCode::CardNotFound,
            },
            BoardError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            BoardError::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            BoardError::ColumnNotEmpty { .. } => ErrorCode::ColumnNotEmpty,
            BoardError::LockTimeout { .. } => ErrorCode::LockTimeout,
            BoardError::Database(_) => ErrorCode::DatabaseError,
            BoardError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::BoardNotFound | ErrorCode::ColumnNotFound | ErrorCode::CardNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::InvalidArgument => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ConcurrentModification | ErrorCode::ColumnNotEmpty => StatusCode::CONFLICT,
            ErrorCode::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Serializable body for this error.
    pub fn body(&self) -> ErrorBody {
        let mut body = ErrorBody::new(self.code(), self.to_string());
        match self {
            BoardError::InvalidArgument { field, .. } => body.field = Some(field.clone()),
            BoardError::ConcurrentModification { details, .. } => {
                body.details = Some(details.clone())
            }
            _ => {}
        }
        body
    }

    /// True when the client must refetch the board before retrying.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            BoardError::ConcurrentModification { .. } | BoardError::NotFound { .. }
        )
    }
}

/// Structured error body for HTTP responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }
}

impl IntoResponse for BoardError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.body())).into_response()
    }
}

/// Field named by a serde "missing field" or "invalid type ... for field" message.
fn rejected_field(text: &str) -> Option<&str> {
    let start = text.find("field `")? + "field `".len();
    let len = text[start..].find('`')?;
    Some(&text[start..start + len])
}

impl From<JsonRejection> for BoardError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        let field = rejected_field(&text).unwrap_or("body").to_string();
        BoardError::InvalidArgument {
            field,
            reason: text,
        }
    }
}

impl From<QueryRejection> for BoardError {
    fn from(rejection: QueryRejection) -> Self {
        let text = rejection.body_text();
        let field = rejected_field(&text).unwrap_or("query").to_string();
        BoardError::InvalidArgument {
            field,
            reason: text,
        }
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for BoardError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<BoardError>() {
            Ok(board_err) => board_err,
            Err(err) => BoardError::internal(err),
        }
    }
}

/// Result type for board operations.
pub type BoardResult<T> = std::result::Result<T, BoardError>;
