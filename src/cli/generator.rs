//! Demo message generator
//!
//! Publishes `"Number: <i>"` to one category on a fixed interval. It is an
//! ordinary caller of the publish API and runs as its own task.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::longpoll::{LongpollError, LongpollManager};

/// Spawn the generator. It stops on `shutdown` or once the manager closes.
pub fn spawn(
    manager: LongpollManager,
    category: String,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut published = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match manager.publish(&category, format!("Number: {}", published)) {
                        Ok(_) => published += 1,
                        Err(LongpollError::ManagerClosed) => break,
                        Err(e) => tracing::warn!(category = %category, error = %e, "generator publish failed"),
                    }
                }

                _ = shutdown.recv() => break,
            }
        }

        tracing::debug!(category = %category, published, "generator stopped");
        published
    })
}
