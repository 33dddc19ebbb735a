// src/error.rs

use thiserror::Error;

/// Errors produced while loading inputs or binning reads.
#[derive(Debug, Error)]
pub enum BinningError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid parameter {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("classification tree error: {0}")]
    Tree(String),

    /// The start/end events built for a read do not describe valid intervals.
    #[error("corrupt interval events for read {read}: {message}")]
    InvalidEventStream { read: String, message: String },

    #[error("operation not supported by {0}")]
    Unsupported(&'static str),

    /// Cooperative cancellation; not a failure of the input.
    #[error("binning was canceled")]
    Canceled,

    /// A reader or worker thread panicked.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl BinningError {
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        BinningError::Config {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BinningError>;
