// src/error.rs
// Crate-wide error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemodeckError {
    /// Rating values must be one of 1 (Again), 2 (Hard), 3 (Good), 4 (Easy).
    #[error("invalid rating value: {0}")]
    InvalidRating(u32),

    #[error("desired retention {0} is outside [0.6, 1.0]")]
    RetentionOutOfRange(f64),

    /// The loaded parameter vector does not match the model's weight count.
    /// Fatal at startup; not retryable.
    #[error("parameter vector has {got} weights, expected {expected}")]
    InvalidParameterVector { expected: usize, got: usize },

    #[error("a parameter optimization is already in progress")]
    OptimizerBusy,

    #[error("card {0} not found")]
    CardNotFound(i64),

    #[error("deck {0} not found")]
    DeckNotFound(i64),

    #[error("template {0} not found")]
    TemplateNotFound(i64),

    #[error("unknown template kind: {0}")]
    UnknownTemplateKind(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemodeckError>;
