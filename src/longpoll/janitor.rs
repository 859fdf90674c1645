//! # Janitor
//!
//! Background task that expires aged-out events, drops abandoned tickets and
//! removes categories nobody has published to or is waiting on.
//!
//! Categories are swept one at a time from a snapshot of the registry, so
//! at most one category lock is held at any moment. The map is write-locked
//! only at the end of a sweep, and only if idle categories were found.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::registry::CategoryRegistry;
use crate::observability::MetricsRegistry;

/// Interval between sweeps; below the one-second TTL granularity
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// What one sweep did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub categories: usize,
    pub expired: usize,
    pub abandoned: usize,
    pub pruned: usize,
    pub failed: usize,
}

/// Sweep every category once
pub fn sweep(registry: &CategoryRegistry, metrics: &MetricsRegistry, now: Instant) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match registry.snapshot() {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "janitor could not read category registry");
            metrics.increment_sweep_failures();
            report.failed += 1;
            return report;
        }
    };

    let mut idle = Vec::new();
    for entry in entries {
        report.categories += 1;
        match entry.lock() {
            Ok(mut state) => {
                report.expired += state.buffer.expire_older_than(now);
                report.abandoned += state.waiters.prune_abandoned(now);
                if state.is_idle() {
                    idle.push(Arc::clone(&entry));
                }
            }
            Err(e) => {
                tracing::warn!(category = %entry.name(), error = %e, "janitor skipped category");
                metrics.increment_sweep_failures();
                report.failed += 1;
            }
        }
    }

    match registry.remove_idle(&idle) {
        Ok(pruned) => report.pruned = pruned,
        Err(e) => {
            tracing::warn!(error = %e, "janitor could not prune idle categories");
            metrics.increment_sweep_failures();
            report.failed += 1;
        }
    }

    metrics.add_events_expired(report.expired as u64);
    metrics.add_tickets_abandoned(report.abandoned as u64);
    metrics.increment_sweeps();
    report
}

/// Handle to the running janitor task
#[derive(Debug)]
pub(crate) struct Janitor {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Janitor {
    /// Spawn the janitor on the current runtime
    pub(crate) fn spawn(
        registry: Arc<CategoryRegistry>,
        metrics: Arc<MetricsRegistry>,
        interval: Duration,
        verbose: bool,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = sweep(&registry, &metrics, Instant::now());
                        if verbose && (report.expired > 0 || report.abandoned > 0 || report.pruned > 0) {
                            tracing::debug!(
                                expired = report.expired,
                                abandoned = report.abandoned,
                                pruned = report.pruned,
                                categories = report.categories,
                                "janitor sweep"
                            );
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        tracing::debug!("janitor stopping");
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx, handle }
    }

    /// Signal the task to stop and wait up to `grace` for it to finish
    pub(crate) async fn stop(self, grace: Duration) {
        let _ = self.shutdown_tx.send(());
        let mut handle = self.handle;
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            tracing::warn!("janitor did not stop within grace period; aborting");
            handle.abort();
        }
    }
}
