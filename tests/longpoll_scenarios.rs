//! Long-Poll Manager Scenario Tests
//!
//! End-to-end properties of publish, poll and shutdown:
//! - Ordering, no gaps, no duplicates
//! - Capacity eviction, oldest first
//! - Timeout and wake-up timing
//! - Delete-after-first-retrieval semantics
//! - Shutdown resolves parked polls

use std::time::Duration;

use longpoll::{LongpollError, LongpollManager, Options, PollOutcome, PollRequest, Watermark};
use serde_json::json;
use tokio::time::Instant;

fn scenario_options() -> Options {
    Options {
        logging_enabled: false,
        max_longpoll_timeout_seconds: 120,
        max_event_buffer_size: 100,
        event_time_to_live_seconds: 120,
        delete_event_after_first_retrieval: false,
    }
}

fn sequences(outcome: &PollOutcome) -> Vec<u64> {
    outcome.events().iter().map(|e| e.sequence).collect()
}

// =============================================================================
// Reference Scenario
// =============================================================================

/// Publish "A", poll from 0 gets it at once; poll from 1 times out after ~1s.
#[tokio::test(start_paused = true)]
async fn test_reference_scenario() {
    let manager = LongpollManager::start(scenario_options()).unwrap();
    manager.publish("cat", "A").unwrap();

    let started = Instant::now();
    let first = manager.poll(PollRequest::since("cat", 0, 5)).await.unwrap();
    assert!(first.is_delivered());
    assert_eq!(first.events().len(), 1);
    assert_eq!(first.events()[0].sequence, 1);
    assert_eq!(first.events()[0].payload, json!("A"));
    assert_eq!(started.elapsed(), Duration::ZERO);

    let started = Instant::now();
    let second = manager.poll(PollRequest::since("cat", 1, 1)).await.unwrap();
    assert!(second.is_timed_out());
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_millis(1_100));

    manager.shutdown().await;
}

// =============================================================================
// Ordering
// =============================================================================

/// Queries return strictly increasing sequences with no gaps or duplicates.
#[tokio::test]
async fn test_query_is_ordered_without_gaps() {
    let manager = LongpollManager::start(scenario_options()).unwrap();
    for i in 0..50 {
        manager.publish("cat", i).unwrap();
    }

    for since in [0u64, 1, 17, 49] {
        let outcome = manager.poll(PollRequest::since("cat", since, 0)).await.unwrap();
        let expected: Vec<u64> = (since + 1..=50).collect();
        assert_eq!(sequences(&outcome), expected);
    }

    manager.shutdown().await;
}

/// Concurrent publishers on one category still produce a single total order.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_total_order() {
    let manager = LongpollManager::start(Options {
        max_event_buffer_size: 1_000,
        ..scenario_options()
    })
    .unwrap();

    let mut handles = Vec::new();
    for p in 0..4 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..100 {
                manager.publish("shared", json!({"p": p, "i": i})).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let outcome = manager.poll(PollRequest::since("shared", 0, 0)).await.unwrap();
    assert_eq!(sequences(&outcome), (1..=400).collect::<Vec<u64>>());

    manager.shutdown().await;
}

// =============================================================================
// Capacity
// =============================================================================

/// The buffer never exceeds capacity and evicts the oldest first.
#[tokio::test]
async fn test_capacity_eviction() {
    let manager = LongpollManager::start(Options {
        max_event_buffer_size: 3,
        ..scenario_options()
    })
    .unwrap();

    for i in 1..=10 {
        manager.publish("cat", i).unwrap();
        let stats = manager.category_stats().unwrap();
        assert!(stats[0].buffered <= 3);
    }

    let outcome = manager.poll(PollRequest::since("cat", 0, 0)).await.unwrap();
    assert_eq!(sequences(&outcome), vec![8, 9, 10]);
    assert_eq!(manager.metrics().events_evicted, 7);

    manager.shutdown().await;
}

// =============================================================================
// Wake-up
// =============================================================================

/// A parked poll is delivered the matching publish before its deadline.
#[tokio::test(start_paused = true)]
async fn test_parked_poll_woken_by_publish() {
    let manager = LongpollManager::start(scenario_options()).unwrap();

    let poller = manager.clone();
    let started = Instant::now();
    let handle = tokio::spawn(async move { poller.poll(PollRequest::since("cat", 0, 30)).await });

    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.publish("cat", "hello").unwrap();

    let outcome = handle.await.unwrap().unwrap();
    assert!(outcome.is_delivered());
    assert_eq!(outcome.events()[0].payload, json!("hello"));
    assert!(started.elapsed() < Duration::from_secs(30));

    manager.shutdown().await;
}

/// One publish wakes every ticket parked on the category.
#[tokio::test(start_paused = true)]
async fn test_broadcast_wakes_all_waiters() {
    let manager = LongpollManager::start(scenario_options()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let poller = manager.clone();
        handles.push(tokio::spawn(async move {
            poller.poll(PollRequest::since("cat", 0, 60)).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.category_stats().unwrap()[0].waiting, 10);

    manager.publish("cat", "fan-out").unwrap();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(sequences(&outcome), vec![1]);
    }
    assert_eq!(manager.category_stats().unwrap()[0].waiting, 0);

    manager.shutdown().await;
}

/// Publishing to another category does not wake the ticket.
#[tokio::test(start_paused = true)]
async fn test_other_category_does_not_wake() {
    let manager = LongpollManager::start(scenario_options()).unwrap();

    let poller = manager.clone();
    let handle = tokio::spawn(async move { poller.poll(PollRequest::since("a", 0, 2)).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.publish("b", "x").unwrap();

    assert!(handle.await.unwrap().unwrap().is_timed_out());
    manager.shutdown().await;
}

/// A time watermark parks until something newer arrives.
#[tokio::test(start_paused = true)]
async fn test_since_time_watermark() {
    let manager = LongpollManager::start(scenario_options()).unwrap();
    let old = manager.publish("cat", "old").unwrap();

    let poller = manager.clone();
    let since = old.timestamp_millis();
    let handle = tokio::spawn(async move {
        poller.poll(PollRequest::since_time("cat", since, 30)).await
    });

    // Wall-clock milliseconds must move past the old event's timestamp
    std::thread::sleep(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.publish("cat", "new").unwrap();

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.events().len(), 1);
    assert_eq!(outcome.events()[0].payload, json!("new"));

    manager.shutdown().await;
}

// =============================================================================
// Retention
// =============================================================================

/// With delete-after-retrieval, a delivered event is gone for everyone.
#[tokio::test]
async fn test_delete_after_first_retrieval() {
    let manager = LongpollManager::start(Options {
        delete_event_after_first_retrieval: true,
        ..scenario_options()
    })
    .unwrap();
    manager.publish("cat", "once").unwrap();

    let first = manager.poll(PollRequest::since("cat", 0, 0)).await.unwrap();
    assert_eq!(first.events().len(), 1);

    let second = manager.poll(PollRequest::since("cat", 0, 0)).await.unwrap();
    assert!(second.is_timed_out());
    assert_eq!(manager.metrics().events_consumed, 1);

    manager.shutdown().await;
}

/// With delete-after-retrieval, every ticket woken by one publish still gets it.
#[tokio::test(start_paused = true)]
async fn test_delete_after_retrieval_broadcasts_before_removal() {
    let manager = LongpollManager::start(Options {
        delete_event_after_first_retrieval: true,
        ..scenario_options()
    })
    .unwrap();

    let a = manager.clone();
    let b = manager.clone();
    let ha = tokio::spawn(async move { a.poll(PollRequest::since("cat", 0, 30)).await });
    let hb = tokio::spawn(async move { b.poll(PollRequest::since("cat", 0, 30)).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.publish("cat", "both").unwrap();
    assert_eq!(ha.await.unwrap().unwrap().events().len(), 1);
    assert_eq!(hb.await.unwrap().unwrap().events().len(), 1);

    let late = manager.poll(PollRequest::since("cat", 0, 0)).await.unwrap();
    assert!(late.is_timed_out());

    manager.shutdown().await;
}

/// Without delete-after-retrieval, events stay visible to every older watermark.
#[tokio::test]
async fn test_events_replayable_without_delete() {
    let manager = LongpollManager::start(scenario_options()).unwrap();
    manager.publish("cat", "A").unwrap();
    manager.publish("cat", "B").unwrap();

    for _ in 0..3 {
        let outcome = manager.poll(PollRequest::since("cat", 0, 0)).await.unwrap();
        assert_eq!(sequences(&outcome), vec![1, 2]);
    }
    let outcome = manager.poll(PollRequest::since("cat", 1, 0)).await.unwrap();
    assert_eq!(sequences(&outcome), vec![2]);

    manager.shutdown().await;
}

/// Expired events are invisible to polls and removed by the janitor.
#[tokio::test(start_paused = true)]
async fn test_ttl_expiry() {
    let manager = LongpollManager::start(Options {
        event_time_to_live_seconds: 2,
        ..scenario_options()
    })
    .unwrap();
    manager.publish("cat", "short-lived").unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;

    let outcome = manager.poll(PollRequest::since("cat", 0, 0)).await.unwrap();
    assert!(outcome.is_timed_out());
    assert_eq!(manager.category_stats().unwrap()[0].buffered, 0);
    assert_eq!(manager.metrics().events_expired, 1);

    manager.shutdown().await;
}

// =============================================================================
// Shutdown
// =============================================================================

/// Shutdown resolves parked polls as closed; later calls fail fast.
#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_parked_polls() {
    let manager = LongpollManager::start(scenario_options()).unwrap();

    let mut handles = Vec::new();
    for category in ["a", "b", "c"] {
        let poller = manager.clone();
        handles.push(tokio::spawn(async move {
            poller.poll(PollRequest::since(category, 0, 120)).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    manager.shutdown().await;

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_closed());
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.metrics().polls_closed, 3);

    assert_eq!(manager.publish("a", "late").unwrap_err(), LongpollError::ManagerClosed);
    assert_eq!(
        manager.poll(PollRequest::since("a", 0, 1)).await.unwrap_err(),
        LongpollError::ManagerClosed
    );
    assert!(manager.category_stats().unwrap().is_empty());
}

// =============================================================================
// Isolation
// =============================================================================

/// A rejected request does not disturb parked waiters.
#[tokio::test(start_paused = true)]
async fn test_bad_request_isolated() {
    let manager = LongpollManager::start(scenario_options()).unwrap();

    let poller = manager.clone();
    let handle = tokio::spawn(async move { poller.poll(PollRequest::since("cat", 0, 30)).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.poll(PollRequest::since("", 0, 5)).await.is_err());
    assert!(manager.poll(PollRequest::since("cat", 0, 500)).await.is_err());

    manager.publish("cat", "ok").unwrap();
    assert!(handle.await.unwrap().unwrap().is_delivered());

    manager.shutdown().await;
}

/// A cancelled poll leaves no ticket behind.
#[tokio::test(start_paused = true)]
async fn test_cancelled_poll_removes_ticket() {
    let manager = LongpollManager::start(scenario_options()).unwrap();

    let poller = manager.clone();
    let handle = tokio::spawn(async move { poller.poll(PollRequest::since("cat", 0, 60)).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.category_stats().unwrap()[0].waiting, 1);

    handle.abort();
    let _ = handle.await;
    assert_eq!(manager.category_stats().unwrap()[0].waiting, 0);

    let peeked = manager.peek("cat", Watermark::Sequence(0)).unwrap();
    assert!(peeked.is_empty());

    manager.shutdown().await;
}
