//! Error types for idlemon-server

use hyper::StatusCode;
use thiserror::Error;

use crate::economy::ResourceKind;

pub type Result<T> = std::result::Result<T, GameError>;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Insufficient {resource}: required {required}, available {available}")]
    InsufficientFunds {
        resource: ResourceKind,
        required: i64,
        available: i64,
    },

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Ledger contention: {0}")]
    Contention(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Ledger integrity violation: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GameError {
    pub fn status(&self) -> StatusCode {
        match self {
            GameError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GameError::Validation(_)
            | GameError::Conflict(_)
            | GameError::InsufficientFunds { .. }
            | GameError::Json(_) => StatusCode::BAD_REQUEST,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GameError::Contention(_)
            | GameError::Timeout(_)
            | GameError::Integrity(_)
            | GameError::Database(_)
            | GameError::Io(_)
            | GameError::Config(_)
            | GameError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code placed beside the message in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Unauthorized(_) => "UNAUTHORIZED",
            GameError::Validation(_) | GameError::Json(_) => "INVALID_REQUEST",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Conflict(_) => "CONFLICT",
            GameError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            GameError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            _ => "INTERNAL",
        }
    }

    /// Message safe to hand to a client.
    ///
    /// Client-class errors carry their description outside production. Server-class
    /// errors never leak details, whatever the environment.
    pub fn public_message(&self, production: bool) -> String {
        let status = self.status();
        if production || status.is_server_error() {
            status.canonical_reason().unwrap_or("Error").to_string()
        } else {
            self.to_string()
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<rusqlite::Error> for GameError {
    fn from(err: rusqlite::Error) -> Self {
        classify_sqlite(err)
    }
}

/// Classify a raw SQLite failure by what the caller can do about it.
pub fn classify_sqlite(err: rusqlite::Error) -> GameError {
    match &err {
        rusqlite::Error::SqliteFailure(code, detail) => match code.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                GameError::Contention(detail.clone().unwrap_or_else(|| code.to_string()))
            }
            rusqlite::ErrorCode::ConstraintViolation => {
                GameError::Integrity(detail.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => GameError::Database(err),
        },
        _ => GameError::Database(err),
    }
}
