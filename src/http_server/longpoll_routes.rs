//! Long-Poll HTTP Routes
//!
//! The poll entry point. Status mapping:
//!
//! - events available → `200 {"events": [...]}`
//! - timeout → `200 {"timeout": "no events before timeout", "timestamp": <ms>}`
//! - bad arguments → `400 {"error", "code"}`
//! - manager closed → `503 {"error", "code"}`

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{ApiError, ApiResult};
use crate::longpoll::{Event, LongpollManager, PollOutcome, PollRequest, Watermark};

/// Message returned when a poll times out
pub const TIMEOUT_MESSAGE: &str = "no events before timeout";

// ==================
// Request/Response Types
// ==================

/// Query parameters of a poll
#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub category: String,
    /// Last sequence already seen
    #[serde(default)]
    pub since: Option<u64>,
    /// Epoch milliseconds; used when `since` is absent
    #[serde(default)]
    pub since_time: Option<i64>,
    /// Seconds to wait; defaults to the manager's maximum
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Query parameters of a fixed-category poll
#[derive(Debug, Default, Deserialize)]
pub struct WatermarkParams {
    #[serde(default)]
    pub since: Option<u64>,
    #[serde(default)]
    pub since_time: Option<i64>,
}

fn watermark(since: Option<u64>, since_time: Option<i64>) -> Watermark {
    match (since, since_time) {
        (Some(seq), _) => Watermark::Sequence(seq),
        (None, Some(ms)) => Watermark::Time(ms),
        (None, None) => Watermark::default(),
    }
}

/// Body of a poll response
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PollResponse {
    Events { events: Vec<Event> },
    Timeout { timeout: String, timestamp: i64 },
}

impl PollResponse {
    fn timeout() -> Self {
        PollResponse::Timeout {
            timeout: TIMEOUT_MESSAGE.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

// ==================
// Routes
// ==================

/// Route state for a fixed-category subscription
#[derive(Debug, Clone)]
pub struct FixedSubscription {
    pub manager: LongpollManager,
    pub category: String,
    pub timeout_seconds: u64,
}

/// `GET /events?category=&since=&since_time=&timeout=`
pub fn longpoll_routes(manager: LongpollManager) -> Router {
    Router::new()
        .route("/events", get(poll_handler))
        .with_state(manager)
}

/// `GET <path>?since=&since_time=` with category and timeout fixed server-side
pub fn fixed_subscription_routes(path: &str, subscription: FixedSubscription) -> Router {
    Router::new()
        .route(path, get(fixed_poll_handler))
        .with_state(subscription)
}

// ==================
// Handlers
// ==================

async fn poll_handler(
    State(manager): State<LongpollManager>,
    params: Result<Query<PollParams>, QueryRejection>,
) -> ApiResult<Json<PollResponse>> {
    let Query(params) = params.map_err(|e| ApiError::InvalidQueryParam(e.body_text()))?;
    let timeout_seconds = params
        .timeout
        .unwrap_or(manager.options().max_longpoll_timeout_seconds);

    let request = PollRequest {
        category: params.category,
        watermark: watermark(params.since, params.since_time),
        timeout_seconds,
    };
    respond(&manager, request).await
}

async fn fixed_poll_handler(
    State(subscription): State<FixedSubscription>,
    params: Result<Query<WatermarkParams>, QueryRejection>,
) -> ApiResult<Json<PollResponse>> {
    let Query(params) = params.map_err(|e| ApiError::InvalidQueryParam(e.body_text()))?;

    let request = PollRequest {
        category: subscription.category.clone(),
        watermark: watermark(params.since, params.since_time),
        timeout_seconds: subscription.timeout_seconds,
    };
    respond(&subscription.manager, request).await
}

async fn respond(manager: &LongpollManager, request: PollRequest) -> ApiResult<Json<PollResponse>> {
    match manager.poll(request).await? {
        PollOutcome::Delivered(events) => Ok(Json(PollResponse::Events { events })),
        PollOutcome::TimedOut => Ok(Json(PollResponse::timeout())),
        PollOutcome::Closed => Err(ApiError::Closed),
    }
}
