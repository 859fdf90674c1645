//! # Long-Poll Errors
//!
//! Error types for the long-poll manager.

use thiserror::Error;

/// Result type for long-poll operations
pub type LongpollResult<T> = Result<T, LongpollError>;

/// Long-poll errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LongpollError {
    // ==================
    // Configuration Errors
    // ==================
    /// Options rejected by `LongpollManager::start`
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// `start` was called outside a tokio runtime
    #[error("Long-poll manager must be started inside a tokio runtime")]
    NoRuntime,

    // ==================
    // Request Errors
    // ==================
    /// Category name is empty or too long
    #[error("Invalid subscription category, must be 1-{max} characters long")]
    InvalidCategory { max: usize },

    /// Requested timeout exceeds the configured maximum
    #[error("Invalid timeout {requested}s, must be between 0 and {max}s")]
    InvalidTimeout { requested: u64, max: u64 },

    // ==================
    // Lifecycle Errors
    // ==================
    /// Manager has been shut down
    #[error("Long-poll manager closed")]
    ManagerClosed,

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LongpollError {
    /// Returns true if the caller supplied bad input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LongpollError::InvalidCategory { .. } | LongpollError::InvalidTimeout { .. }
        )
    }

    pub(crate) fn poisoned() -> Self {
        LongpollError::Internal("Lock poisoned".into())
    }
}
