//! # Subscription Coordinator
//!
//! Parks poll requests as tickets and resolves each one exactly once.
//!
//! A ticket is resolved by whichever happens first: a publish whose event
//! its watermark admits, its deadline, or shutdown. The resolving side
//! removes the ticket from the waiter set and sends on its oneshot while
//! holding the category lock, so the losing side always finds the ticket
//! gone and becomes a no-op.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::event::{Event, Watermark};
use super::registry::CategoryEntry;
use super::store::EventBuffer;

/// How long past its deadline a ticket may linger before the janitor drops it
const ABANDON_GRACE: Duration = Duration::from_secs(5);

/// Final state of a poll
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// New events, in sequence order
    Delivered(Vec<Event>),
    /// Nothing arrived before the deadline
    TimedOut,
    /// The manager shut down while the poll was parked
    Closed,
}

impl PollOutcome {
    /// Events carried by a `Delivered` outcome
    pub fn events(&self) -> &[Event] {
        match self {
            PollOutcome::Delivered(events) => events,
            _ => &[],
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, PollOutcome::Delivered(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, PollOutcome::TimedOut)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PollOutcome::Closed)
    }
}

/// Resolution sent to a parked ticket
#[derive(Debug)]
pub(crate) enum Resolution {
    Delivered(Vec<Event>),
    Closed,
}

impl From<Resolution> for PollOutcome {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Delivered(events) => PollOutcome::Delivered(events),
            Resolution::Closed => PollOutcome::Closed,
        }
    }
}

/// A parked poll request
#[derive(Debug)]
pub(crate) struct Ticket {
    watermark: Watermark,
    deadline: Instant,
    tx: oneshot::Sender<Resolution>,
}

impl Ticket {
    /// Create a ticket and the receiver its poller waits on
    pub(crate) fn new(watermark: Watermark, deadline: Instant) -> (Self, oneshot::Receiver<Resolution>) {
        let (tx, rx) = oneshot::channel();
        (Self { watermark, deadline, tx }, rx)
    }

    /// The poller is gone, or the ticket outlived its deadline by far
    fn is_abandoned(&self, now: Instant) -> bool {
        self.tx.is_closed() || now > self.deadline + ABANDON_GRACE
    }
}

/// Outcome of waking a category's waiters after a publish
#[derive(Debug, Default)]
pub(crate) struct WakeReport {
    /// Tickets resolved as delivered
    pub woken: usize,
    /// Sequences handed to at least one ticket
    pub delivered: BTreeSet<u64>,
}

/// Tickets parked on one category
#[derive(Debug, Default)]
pub(crate) struct WaiterSet {
    tickets: HashMap<u64, Ticket>,
}

impl WaiterSet {
    pub(crate) fn park(&mut self, id: u64, ticket: Ticket) {
        self.tickets.insert(id, ticket);
    }

    /// Remove a pending ticket. Returns false if it was already resolved.
    pub(crate) fn cancel(&mut self, id: u64) -> bool {
        self.tickets.remove(&id).is_some()
    }

    /// Resolve every ticket whose watermark admits `event`.
    ///
    /// Each ticket receives everything in `buffer` newer than its own
    /// watermark, not just `event`.
    pub(crate) fn wake(&mut self, buffer: &EventBuffer, event: &Event, now: Instant) -> WakeReport {
        let mut report = WakeReport::default();

        let ready: Vec<u64> = self
            .tickets
            .iter()
            .filter(|(_, t)| t.watermark.admits(event))
            .map(|(id, _)| *id)
            .collect();

        for id in ready {
            let Some(ticket) = self.tickets.remove(&id) else {
                continue;
            };

            let events = buffer.query(ticket.watermark, now);
            if events.is_empty() {
                // Cannot happen while `event` is still buffered; keep waiting
                self.tickets.insert(id, ticket);
                continue;
            }

            let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
            if ticket.tx.send(Resolution::Delivered(events)).is_ok() {
                report.woken += 1;
                report.delivered.extend(sequences);
            }
        }

        report
    }

    /// Resolve every ticket as closed. Returns how many were pending.
    pub(crate) fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for (_, ticket) in self.tickets.drain() {
            if ticket.tx.send(Resolution::Closed).is_ok() {
                closed += 1;
            }
        }
        closed
    }

    /// Drop tickets nobody is waiting on any more
    pub(crate) fn prune_abandoned(&mut self, now: Instant) -> usize {
        let before = self.tickets.len();
        self.tickets.retain(|_, t| !t.is_abandoned(now));
        before - self.tickets.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.tickets.len()
    }
}

/// Cancels a parked ticket if its poll future goes away before resolution
struct TicketGuard {
    entry: Arc<CategoryEntry>,
    id: u64,
}

impl TicketGuard {
    /// Returns true if the ticket was still pending and is now removed
    fn cancel(&self) -> bool {
        match self.entry.lock() {
            Ok(mut state) => state.waiters.cancel(self.id),
            Err(_) => false,
        }
    }
}

impl Drop for TicketGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Wait for a parked ticket to resolve or for its deadline to pass
pub(crate) async fn wait(
    entry: Arc<CategoryEntry>,
    id: u64,
    mut rx: oneshot::Receiver<Resolution>,
    deadline: Instant,
) -> PollOutcome {
    let guard = TicketGuard { entry, id };

    match tokio::time::timeout_at(deadline, &mut rx).await {
        Ok(Ok(resolution)) => resolution.into(),
        // Sender dropped without resolving: the bucket was released
        Ok(Err(_)) => PollOutcome::Closed,
        Err(_) => settle_after_deadline(&guard, &mut rx),
    }
}

/// Decide a ticket whose deadline passed before a resolution was observed.
/// Removing the ticket wins the timeout; if it is already gone, a resolver
/// sent under the category lock and that resolution stands.
fn settle_after_deadline(guard: &TicketGuard, rx: &mut oneshot::Receiver<Resolution>) -> PollOutcome {
    if guard.cancel() {
        return PollOutcome::TimedOut;
    }
    match rx.try_recv() {
        Ok(resolution) => resolution.into(),
        Err(_) => PollOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::longpoll::registry::CategoryRegistry;
    use serde_json::json;

    fn buffer() -> EventBuffer {
        EventBuffer::new(10, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_wake_resolves_matching_tickets() {
        let mut buf = buffer();
        let mut waiters = WaiterSet::default();
        let deadline = Instant::now() + Duration::from_secs(30);

        let (t1, mut rx1) = Ticket::new(Watermark::Sequence(0), deadline);
        let (t2, mut rx2) = Ticket::new(Watermark::Sequence(0), deadline);
        waiters.park(1, t1);
        waiters.park(2, t2);

        let event = buf.append("cat", json!("A")).event;
        let report = waiters.wake(&buf, &event, Instant::now());

        assert_eq!(report.woken, 2);
        assert_eq!(report.delivered.into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(waiters.len(), 0);
        assert!(matches!(rx1.try_recv(), Ok(Resolution::Delivered(e)) if e.len() == 1));
        assert!(matches!(rx2.try_recv(), Ok(Resolution::Delivered(e)) if e.len() == 1));
    }

    #[tokio::test]
    async fn test_wake_skips_satisfied_watermarks() {
        let mut buf = buffer();
        let mut waiters = WaiterSet::default();
        let deadline = Instant::now() + Duration::from_secs(30);

        let (ahead, _rx) = Ticket::new(Watermark::Sequence(5), deadline);
        waiters.park(1, ahead);

        let event = buf.append("cat", json!("A")).event;
        let report = waiters.wake(&buf, &event, Instant::now());

        assert_eq!(report.woken, 0);
        assert_eq!(waiters.len(), 1);
    }

    #[tokio::test]
    async fn test_woken_ticket_gets_backlog_from_its_watermark() {
        let mut buf = buffer();
        let mut waiters = WaiterSet::default();
        let deadline = Instant::now() + Duration::from_secs(30);

        buf.append("cat", json!("A"));
        buf.append("cat", json!("B"));
        let (ticket, mut rx) = Ticket::new(Watermark::Sequence(1), deadline);
        waiters.park(1, ticket);

        let event = buf.append("cat", json!("C")).event;
        waiters.wake(&buf, &event, Instant::now());

        match rx.try_recv() {
            Ok(Resolution::Delivered(events)) => {
                let seqs: Vec<u64> = events.iter().map(|e| e.sequence).collect();
                assert_eq!(seqs, vec![2, 3]);
            }
            other => panic!("Expected delivery, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_not_counted() {
        let mut buf = buffer();
        let mut waiters = WaiterSet::default();
        let deadline = Instant::now() + Duration::from_secs(30);

        let (ticket, rx) = Ticket::new(Watermark::Sequence(0), deadline);
        waiters.park(1, ticket);
        drop(rx);

        let event = buf.append("cat", json!("A")).event;
        let report = waiters.wake(&buf, &event, Instant::now());

        assert_eq!(report.woken, 0);
        assert!(report.delivered.is_empty());
    }

    #[tokio::test]
    async fn test_close_all() {
        let mut waiters = WaiterSet::default();
        let deadline = Instant::now() + Duration::from_secs(30);
        let (t1, mut rx1) = Ticket::new(Watermark::Sequence(0), deadline);
        waiters.park(1, t1);

        assert_eq!(waiters.close_all(), 1);
        assert!(matches!(rx1.try_recv(), Ok(Resolution::Closed)));
        assert_eq!(waiters.len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_is_exactly_once() {
        let mut waiters = WaiterSet::default();
        let (ticket, _rx) = Ticket::new(Watermark::Sequence(0), Instant::now());
        waiters.park(7, ticket);

        assert!(waiters.cancel(7));
        assert!(!waiters.cancel(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_abandoned() {
        let mut waiters = WaiterSet::default();
        let deadline = Instant::now() + Duration::from_secs(1);

        let (gone, rx_gone) = Ticket::new(Watermark::Sequence(0), deadline);
        let (live, _rx_live) = Ticket::new(Watermark::Sequence(0), deadline);
        waiters.park(1, gone);
        waiters.park(2, live);
        drop(rx_gone);

        assert_eq!(waiters.prune_abandoned(Instant::now()), 1);
        assert_eq!(waiters.len(), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(waiters.prune_abandoned(Instant::now()), 1);
        assert_eq!(waiters.len(), 0);
    }

    /// Park ticket `id` on a fresh "cat" category
    fn parked(deadline: Instant) -> (CategoryRegistry, Arc<CategoryEntry>, oneshot::Receiver<Resolution>) {
        let registry = CategoryRegistry::new(10, Duration::from_secs(60));
        let entry = registry.get_or_create("cat").unwrap();
        let (ticket, rx) = Ticket::new(Watermark::Sequence(0), deadline);
        entry.lock().unwrap().waiters.park(1, ticket);
        (registry, entry, rx)
    }

    /// Publish under the category lock, optionally removing delivered events
    fn publish_locked(entry: &CategoryEntry, delete_after: bool) -> WakeReport {
        let mut state = entry.lock().unwrap();
        let state = &mut *state;
        let event = state.buffer.append("cat", json!("A")).event;
        let report = state.waiters.wake(&state.buffer, &event, Instant::now());
        if delete_after {
            state.buffer.remove_sequences(&report.delivered);
        }
        report
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_sent_before_deadline_check_wins() {
        for delete_after in [false, true] {
            let deadline = Instant::now() + Duration::from_secs(1);
            let (_registry, entry, mut rx) = parked(deadline);

            let report = publish_locked(&entry, delete_after);
            assert_eq!(report.woken, 1);
            tokio::time::advance(Duration::from_secs(2)).await;

            // Deadline passed, but the ticket was already resolved under the lock
            let guard = TicketGuard { entry: Arc::clone(&entry), id: 1 };
            let outcome = settle_after_deadline(&guard, &mut rx);
            assert!(outcome.is_delivered());
            assert_eq!(outcome.events()[0].payload, json!("A"));

            let buffered = entry.stats().unwrap().buffered;
            assert_eq!(buffered, if delete_after { 0 } else { 1 });
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_ticket_times_out_and_is_removed() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let (_registry, entry, mut rx) = parked(deadline);
        tokio::time::advance(Duration::from_secs(2)).await;

        let guard = TicketGuard { entry: Arc::clone(&entry), id: 1 };
        assert!(settle_after_deadline(&guard, &mut rx).is_timed_out());
        assert_eq!(entry.stats().unwrap().waiting, 0);

        // A later publish finds nobody to deliver to, so the event stays
        let report = publish_locked(&entry, true);
        assert_eq!(report.woken, 0);
        assert_eq!(entry.stats().unwrap().buffered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_at_deadline_has_single_winner() {
        for delete_after in [false, true] {
            let deadline = Instant::now() + Duration::from_secs(1);
            let (_registry, entry, rx) = parked(deadline);

            let waiter = tokio::spawn(wait(Arc::clone(&entry), 1, rx, deadline));
            tokio::time::sleep_until(deadline).await;
            let report = publish_locked(&entry, delete_after);
            let outcome = waiter.await.unwrap();

            // Either the publish resolved the ticket or the timeout removed it first
            if report.woken == 1 {
                assert!(outcome.is_delivered());
                assert_eq!(outcome.events().len(), 1);
            } else {
                assert!(outcome.is_timed_out());
                assert_eq!(entry.stats().unwrap().buffered, 1);
            }
            assert_eq!(entry.stats().unwrap().waiting, 0);
        }
    }
}
