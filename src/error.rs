//! Error types for the session store, response cache and configuration layer.

use thiserror::Error;

/// Errors surfaced by `convostate`.
///
/// `NotFound` and `OutOfRange` are the only failures the state engine itself
/// produces; the remaining variants come from loading configuration.
#[derive(Debug, Error)]
pub enum StateError {
    /// The session ID does not exist in the store.
    #[error("session not found: {0}")]
    NotFound(String),

    /// An order item index outside `[0, len)`.
    #[error("order item index {index} out of range (order has {len} items)")]
    OutOfRange { index: usize, len: usize },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, StateError>;
