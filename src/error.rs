//! Error types for recipient-flow

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Allocation pool exhausted: requested {requested}, available {available}")]
    PoolExhausted { requested: u32, available: u32 },

    #[error("Allocation conflict persisted after {0} attempts")]
    ConflictRetriesExhausted(u32),

    #[error("No recipient allocations found for {0}")]
    MissingAllocations(String),

    #[error("Invalid participant id: {0}")]
    InvalidParticipant(String),

    #[error("Invalid answer for {question}: {value}")]
    InvalidAnswer { question: String, value: String },

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Page {page} does not accept {action}")]
    WrongPage { page: String, action: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
