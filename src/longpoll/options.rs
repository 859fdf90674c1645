//! # Long-Poll Options
//!
//! Configuration accepted by `LongpollManager::start`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{LongpollError, LongpollResult};

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Emit per-operation debug logs
    #[serde(default)]
    pub logging_enabled: bool,

    /// Longest a poll may stay parked (default: 120)
    #[serde(default = "default_max_timeout")]
    pub max_longpoll_timeout_seconds: u64,

    /// Events retained per category (default: 100)
    #[serde(default = "default_buffer_size")]
    pub max_event_buffer_size: usize,

    /// Age after which events expire; 0 keeps them until evicted (default: 120)
    #[serde(default = "default_ttl")]
    pub event_time_to_live_seconds: u64,

    /// Remove an event once any subscriber has received it
    #[serde(default)]
    pub delete_event_after_first_retrieval: bool,
}

fn default_max_timeout() -> u64 {
    120
}

fn default_buffer_size() -> usize {
    100
}

fn default_ttl() -> u64 {
    120
}

impl Default for Options {
    fn default() -> Self {
        Self {
            logging_enabled: false,
            max_longpoll_timeout_seconds: default_max_timeout(),
            max_event_buffer_size: default_buffer_size(),
            event_time_to_live_seconds: default_ttl(),
            delete_event_after_first_retrieval: false,
        }
    }
}

impl Options {
    /// Validate the options
    pub fn validate(&self) -> LongpollResult<()> {
        if self.max_longpoll_timeout_seconds == 0 {
            return Err(LongpollError::InvalidOptions(
                "max_longpoll_timeout_seconds must be > 0".into(),
            ));
        }

        if self.max_event_buffer_size == 0 {
            return Err(LongpollError::InvalidOptions(
                "max_event_buffer_size must be > 0".into(),
            ));
        }

        // Guard against Duration overflow when converted to a deadline
        if self.max_longpoll_timeout_seconds > u32::MAX as u64 {
            return Err(LongpollError::InvalidOptions(format!(
                "max_longpoll_timeout_seconds must be <= {}",
                u32::MAX
            )));
        }

        Ok(())
    }

    /// Event time-to-live; zero means no expiry
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.event_time_to_live_seconds)
    }
}
