//! Observability subsystem
//!
//! - Log output setup (`tracing` + `tracing-subscriber`)
//! - Operational counters for the long-poll manager
//!
//! Observability failures never affect publish or poll.

pub mod logging;
mod metrics;

pub use logging::LoggingConfig;
pub use metrics::{MetricsRegistry, MetricsSnapshot};

use thiserror::Error;

/// Observability error
#[derive(Debug, Clone, Error)]
#[error("observability error: {message}")]
pub struct ObservabilityError {
    message: String,
}

impl ObservabilityError {
    /// Create a new observability error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Get the message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for observability operations
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;
