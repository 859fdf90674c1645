//! Metrics registry for the long-poll manager
//!
//! - Counters only, monotonic
//! - Reset only when a manager starts
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by the manager and its janitor
///
/// Uses Relaxed ordering; counters are read for reporting only.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Events appended
    events_published: AtomicU64,
    /// Events dropped to stay within buffer capacity
    events_evicted: AtomicU64,
    /// Events dropped by the janitor for exceeding their TTL
    events_expired: AtomicU64,
    /// Events dropped after their first delivery
    events_consumed: AtomicU64,
    /// Polls answered with events
    polls_delivered: AtomicU64,
    /// Polls that reached their deadline
    polls_timed_out: AtomicU64,
    /// Polls resolved by shutdown
    polls_closed: AtomicU64,
    /// Polls refused for bad arguments or a closed manager
    polls_rejected: AtomicU64,
    /// Tickets parked
    tickets_parked: AtomicU64,
    /// Tickets dropped by the janitor after their poller went away
    tickets_abandoned: AtomicU64,
    /// Janitor sweeps completed
    sweeps: AtomicU64,
    /// Categories a sweep could not lock
    sweep_failures: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Event metrics

    pub fn increment_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_events_evicted(&self, count: u64) {
        self.events_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_events_expired(&self, count: u64) {
        self.events_expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_events_consumed(&self, count: u64) {
        self.events_consumed.fetch_add(count, Ordering::Relaxed);
    }

    // Poll metrics

    pub fn increment_polls_delivered(&self) {
        self.polls_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_polls_delivered(&self, count: u64) {
        self.polls_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_polls_timed_out(&self) {
        self.polls_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_polls_closed(&self, count: u64) {
        self.polls_closed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_polls_rejected(&self) {
        self.polls_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Ticket metrics

    pub fn increment_tickets_parked(&self) {
        self.tickets_parked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tickets_abandoned(&self, count: u64) {
        self.tickets_abandoned.fetch_add(count, Ordering::Relaxed);
    }

    // Janitor metrics

    pub fn increment_sweeps(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sweep_failures(&self) {
        self.sweep_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_evicted: self.events_evicted.load(Ordering::Relaxed),
            events_expired: self.events_expired.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            polls_delivered: self.polls_delivered.load(Ordering::Relaxed),
            polls_timed_out: self.polls_timed_out.load(Ordering::Relaxed),
            polls_closed: self.polls_closed.load(Ordering::Relaxed),
            polls_rejected: self.polls_rejected.load(Ordering::Relaxed),
            tickets_parked: self.tickets_parked.load(Ordering::Relaxed),
            tickets_abandoned: self.tickets_abandoned.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweep_failures: self.sweep_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_published: u64,
    pub events_evicted: u64,
    pub events_expired: u64,
    pub events_consumed: u64,
    pub polls_delivered: u64,
    pub polls_timed_out: u64,
    pub polls_closed: u64,
    pub polls_rejected: u64,
    pub tickets_parked: u64,
    pub tickets_abandoned: u64,
    pub sweeps: u64,
    pub sweep_failures: u64,
}
