//! # Long-Poll Events
//!
//! Immutable events and the watermarks subscribers use to filter them.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

/// Longest category name accepted by publish and poll
pub const MAX_CATEGORY_LEN: usize = 1024;

/// An event published to a category
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Random identifier
    pub id: Uuid,

    /// Category the event was published to
    pub category: String,

    /// Monotonically increasing, unique within the category
    pub sequence: u64,

    /// Wall-clock creation time, serialized as epoch milliseconds
    #[serde(rename = "timestamp", serialize_with = "serialize_millis")]
    pub created_at: DateTime<Utc>,

    /// Opaque payload
    #[serde(rename = "data")]
    pub payload: Value,

    /// Monotonic creation time, used for TTL checks
    #[serde(skip)]
    pub(crate) created: Instant,
}

fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(ts.timestamp_millis())
}

impl Event {
    pub(crate) fn new(category: String, sequence: u64, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            sequence,
            created_at: Utc::now(),
            payload,
            created: Instant::now(),
        }
    }

    /// Creation time in milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    /// Returns true if the event is older than `ttl` at `now`.
    ///
    /// A zero TTL never expires.
    pub fn is_expired(&self, now: Instant, ttl: std::time::Duration) -> bool {
        !ttl.is_zero() && now.saturating_duration_since(self.created) > ttl
    }
}

/// What a subscriber has already seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// Last sequence number observed
    Sequence(u64),
    /// Epoch milliseconds; events created strictly after this are new
    Time(i64),
}

impl Watermark {
    /// Returns true if `event` is newer than this watermark
    pub fn admits(&self, event: &Event) -> bool {
        match *self {
            Watermark::Sequence(since) => event.sequence > since,
            Watermark::Time(since_ms) => event.timestamp_millis() > since_ms,
        }
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Watermark::Sequence(0)
    }
}

/// Returns true if `category` is an acceptable category name
pub fn is_valid_category(category: &str) -> bool {
    let len = category.chars().count();
    (1..=MAX_CATEGORY_LEN).contains(&len)
}
