//! # Event Store
//!
//! Per-category ring buffer of events, bounded by size and age.
//!
//! ## Invariants
//! - `len() <= capacity`; overflow evicts from the head (oldest first).
//! - Sequence numbers are strictly increasing from head to tail.
//! - Expired events are never returned by `query`, even before a sweep.
//!
//! The buffer itself is not synchronized. The registry wraps it in the
//! category lock together with the waiter set so append and wake are atomic.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::event::{Event, Watermark};

/// Result of an append
#[derive(Debug, Clone)]
pub struct Appended {
    /// The newly created event
    pub event: Event,
    /// Events evicted from the head to stay within capacity
    pub evicted: usize,
}

/// Bounded, expiring event buffer for one category
#[derive(Debug)]
pub struct EventBuffer {
    /// Events ordered by sequence
    events: VecDeque<Event>,

    /// Maximum events retained
    capacity: usize,

    /// Maximum event age; zero disables expiry
    ttl: Duration,

    /// Sequence assigned to the next append
    next_sequence: u64,
}

impl EventBuffer {
    /// Create an empty buffer
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            ttl,
            next_sequence: 1,
        }
    }

    /// Append an event to the tail, evicting from the head if over capacity
    pub fn append(&mut self, category: &str, payload: Value) -> Appended {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let event = Event::new(category.to_string(), sequence, payload);
        self.events.push_back(event.clone());

        let mut evicted = 0;
        while self.events.len() > self.capacity {
            self.events.pop_front();
            evicted += 1;
        }

        Appended { event, evicted }
    }

    /// Non-expired events newer than `watermark`, in sequence order
    pub fn query(&self, watermark: Watermark, now: Instant) -> Vec<Event> {
        self.live_from(watermark, now)
            .filter(|e| watermark.admits(e))
            .cloned()
            .collect()
    }

    /// Like `query`, but also removes the returned events
    pub fn take(&mut self, watermark: Watermark, now: Instant) -> Vec<Event> {
        let taken = self.query(watermark, now);
        if !taken.is_empty() {
            let sequences: BTreeSet<u64> = taken.iter().map(|e| e.sequence).collect();
            self.remove_sequences(&sequences);
        }
        taken
    }

    /// Remove the events with the given sequence numbers
    pub fn remove_sequences(&mut self, sequences: &BTreeSet<u64>) -> usize {
        let before = self.events.len();
        self.events.retain(|e| !sequences.contains(&e.sequence));
        before - self.events.len()
    }

    /// Drop every event older than the TTL at `now`
    pub fn expire_older_than(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        // Creation order matches sequence order, so expired events form a prefix
        while let Some(front) = self.events.front() {
            if !front.is_expired(now, self.ttl) {
                break;
            }
            self.events.pop_front();
            expired += 1;
        }
        expired
    }

    /// Drop all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Sequence of the most recently appended event (0 if none yet)
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Skip the expired prefix and, for sequence watermarks, everything at or below it
    fn live_from(&self, watermark: Watermark, now: Instant) -> impl Iterator<Item = &Event> {
        let start = match watermark {
            Watermark::Sequence(since) => self.events.partition_point(|e| e.sequence <= since),
            Watermark::Time(_) => 0,
        };
        let ttl = self.ttl;
        self.events
            .range(start..)
            .skip_while(move |e| e.is_expired(now, ttl))
    }
}
