//! # Long-Poll Manager
//!
//! Owns the category registry, the janitor and the counters, and exposes
//! `start`, `publish`, `poll` and `shutdown`.
//!
//! The manager is a cheap `Clone` handle. Construct it once and pass it to
//! every request handler and publisher that needs it.
//!
//! ## Shutdown ordering
//! `shutdown` sets the closed flag before it locks any category. `publish`
//! and `poll` re-check the flag while holding the category lock, so no ticket
//! can be parked on a category after shutdown has drained it. A drained
//! registry refuses to create categories, so nothing is left behind either.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::coordinator::{self, PollOutcome, Ticket};
use super::errors::{LongpollError, LongpollResult};
use super::event::{is_valid_category, Event, Watermark, MAX_CATEGORY_LEN};
use super::janitor::{Janitor, SWEEP_INTERVAL};
use super::options::Options;
use super::registry::{CategoryRegistry, CategoryStats};
use crate::observability::{MetricsRegistry, MetricsSnapshot};

/// Upper bound on how long `shutdown` waits for the janitor
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A poll request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub category: String,
    pub watermark: Watermark,
    pub timeout_seconds: u64,
}

impl PollRequest {
    /// Poll for events with a sequence above `since`
    pub fn since(category: impl Into<String>, since: u64, timeout_seconds: u64) -> Self {
        Self {
            category: category.into(),
            watermark: Watermark::Sequence(since),
            timeout_seconds,
        }
    }

    /// Poll for events created after `since_ms` (epoch milliseconds)
    pub fn since_time(category: impl Into<String>, since_ms: i64, timeout_seconds: u64) -> Self {
        Self {
            category: category.into(),
            watermark: Watermark::Time(since_ms),
            timeout_seconds,
        }
    }
}

#[derive(Debug)]
struct ManagerInner {
    options: Options,
    registry: Arc<CategoryRegistry>,
    metrics: Arc<MetricsRegistry>,
    closed: AtomicBool,
    next_ticket: AtomicU64,
    janitor: Mutex<Option<Janitor>>,
}

/// Handle to a running long-poll manager
#[derive(Debug, Clone)]
pub struct LongpollManager {
    inner: Arc<ManagerInner>,
}

impl LongpollManager {
    /// Validate `options` and start a manager with its janitor.
    ///
    /// Must be called from within a tokio runtime. On error nothing is spawned.
    pub fn start(options: Options) -> LongpollResult<Self> {
        options.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(LongpollError::NoRuntime);
        }

        let registry = Arc::new(CategoryRegistry::new(options.max_event_buffer_size, options.ttl()));
        let metrics = Arc::new(MetricsRegistry::new());
        let janitor = Janitor::spawn(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            SWEEP_INTERVAL,
            options.logging_enabled,
        );

        tracing::info!(
            max_timeout_secs = options.max_longpoll_timeout_seconds,
            buffer_size = options.max_event_buffer_size,
            ttl_secs = options.event_time_to_live_seconds,
            delete_after_retrieval = options.delete_event_after_first_retrieval,
            "long-poll manager started"
        );

        Ok(Self {
            inner: Arc::new(ManagerInner {
                options,
                registry,
                metrics,
                closed: AtomicBool::new(false),
                next_ticket: AtomicU64::new(1),
                janitor: Mutex::new(Some(janitor)),
            }),
        })
    }

    /// Options the manager was started with
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Returns true once `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Append an event to `category` and wake every ticket waiting for it
    pub fn publish(&self, category: &str, payload: impl Into<Value>) -> LongpollResult<Event> {
        self.ensure_open()?;
        check_category(category)?;

        let inner = &self.inner;
        let payload = payload.into();

        let (appended, report) = loop {
            let entry = inner.registry.get_or_create(category)?;
            let mut state = entry.lock()?;
            if self.is_closed() {
                return Err(LongpollError::ManagerClosed);
            }
            if state.retired {
                continue;
            }

            let now = Instant::now();
            let state = &mut *state;
            let appended = state.buffer.append(category, payload);
            let report = state.waiters.wake(&state.buffer, &appended.event, now);

            if inner.options.delete_event_after_first_retrieval && !report.delivered.is_empty() {
                let removed = state.buffer.remove_sequences(&report.delivered);
                inner.metrics.add_events_consumed(removed as u64);
            }
            break (appended, report);
        };

        inner.metrics.increment_events_published();
        inner.metrics.add_events_evicted(appended.evicted as u64);
        inner.metrics.add_polls_delivered(report.woken as u64);

        if inner.options.logging_enabled {
            tracing::debug!(
                category = %category,
                sequence = appended.event.sequence,
                woken = report.woken,
                evicted = appended.evicted,
                "published event"
            );
        }

        Ok(appended.event)
    }

    /// Answer a poll now if events are buffered, otherwise park it until a
    /// matching publish, its timeout, or shutdown.
    ///
    /// Timeouts above `max_longpoll_timeout_seconds` are rejected, not clamped.
    /// A zero timeout checks once and never parks.
    pub async fn poll(&self, request: PollRequest) -> LongpollResult<PollOutcome> {
        let inner = &self.inner;
        if let Err(e) = self.validate_poll(&request) {
            inner.metrics.increment_polls_rejected();
            return Err(e);
        }

        let delete_after = inner.options.delete_event_after_first_retrieval;

        let (entry, id, rx, deadline) = loop {
            // A check that never parks must not create the category
            let entry = if request.timeout_seconds == 0 {
                match inner.registry.get(&request.category)? {
                    Some(entry) => entry,
                    None => {
                        inner.metrics.increment_polls_timed_out();
                        return Ok(PollOutcome::TimedOut);
                    }
                }
            } else {
                inner.registry.get_or_create(&request.category)?
            };

            let mut state = entry.lock()?;
            if self.is_closed() {
                inner.metrics.increment_polls_rejected();
                return Err(LongpollError::ManagerClosed);
            }
            if state.retired {
                continue;
            }

            let now = Instant::now();
            let events = if delete_after {
                state.buffer.take(request.watermark, now)
            } else {
                state.buffer.query(request.watermark, now)
            };

            if !events.is_empty() {
                drop(state);
                if delete_after {
                    inner.metrics.add_events_consumed(events.len() as u64);
                }
                inner.metrics.increment_polls_delivered();
                return Ok(PollOutcome::Delivered(events));
            }

            if request.timeout_seconds == 0 {
                drop(state);
                inner.metrics.increment_polls_timed_out();
                return Ok(PollOutcome::TimedOut);
            }

            let id = inner.next_ticket.fetch_add(1, Ordering::Relaxed);
            let deadline = now + Duration::from_secs(request.timeout_seconds);
            let (ticket, rx) = Ticket::new(request.watermark, deadline);
            state.waiters.park(id, ticket);
            drop(state);
            break (entry, id, rx, deadline);
        };

        inner.metrics.increment_tickets_parked();
        if inner.options.logging_enabled {
            tracing::debug!(
                category = %request.category,
                ticket = id,
                timeout_secs = request.timeout_seconds,
                "parked poll"
            );
        }

        let outcome = coordinator::wait(entry, id, rx, deadline).await;

        match &outcome {
            // Delivered and closed are counted by the resolver
            PollOutcome::TimedOut => inner.metrics.increment_polls_timed_out(),
            PollOutcome::Delivered(_) | PollOutcome::Closed => {}
        }
        if inner.options.logging_enabled {
            tracing::debug!(
                category = %request.category,
                ticket = id,
                events = outcome.events().len(),
                timed_out = outcome.is_timed_out(),
                closed = outcome.is_closed(),
                "resolved poll"
            );
        }

        Ok(outcome)
    }

    /// Stop the janitor, resolve every parked ticket as closed and drop all
    /// buffers. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("long-poll manager shutting down");

        let janitor = match self.inner.janitor.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let mut closed = 0;
        match self.inner.registry.drain() {
            Ok(entries) => {
                for entry in entries {
                    match entry.lock() {
                        Ok(mut state) => {
                            closed += state.waiters.close_all();
                            state.buffer.clear();
                        }
                        Err(e) => {
                            // Dropping the entry drops its senders; waiters resolve as closed
                            tracing::error!(category = %entry.name(), error = %e, "failed to drain category");
                        }
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to drain category registry"),
        }
        self.inner.metrics.add_polls_closed(closed as u64);

        if let Some(janitor) = janitor {
            janitor.stop(SHUTDOWN_GRACE).await;
        }

        tracing::info!(tickets_closed = closed, "long-poll manager stopped");
    }

    /// Counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Per-category statistics, sorted by category name
    pub fn category_stats(&self) -> LongpollResult<Vec<CategoryStats>> {
        let mut stats = self
            .inner
            .registry
            .snapshot()?
            .iter()
            .map(|entry| entry.stats())
            .collect::<LongpollResult<Vec<_>>>()?;
        stats.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(stats)
    }

    /// Non-blocking read of a category's buffered events. Never removes events.
    pub fn peek(&self, category: &str, watermark: Watermark) -> LongpollResult<Vec<Event>> {
        self.ensure_open()?;
        check_category(category)?;
        match self.inner.registry.get(category)? {
            Some(entry) => Ok(entry.lock()?.buffer.query(watermark, Instant::now())),
            None => Ok(Vec::new()),
        }
    }

    fn ensure_open(&self) -> LongpollResult<()> {
        if self.is_closed() {
            Err(LongpollError::ManagerClosed)
        } else {
            Ok(())
        }
    }

    fn validate_poll(&self, request: &PollRequest) -> LongpollResult<()> {
        self.ensure_open()?;
        check_category(&request.category)?;

        let max = self.inner.options.max_longpoll_timeout_seconds;
        if request.timeout_seconds > max {
            return Err(LongpollError::InvalidTimeout {
                requested: request.timeout_seconds,
                max,
            });
        }
        Ok(())
    }
}

fn check_category(category: &str) -> LongpollResult<()> {
    if is_valid_category(category) {
        Ok(())
    } else {
        Err(LongpollError::InvalidCategory { max: MAX_CATEGORY_LEN })
    }
}
