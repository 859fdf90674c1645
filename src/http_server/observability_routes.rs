//! Observability HTTP Routes
//!
//! Health check and manager metrics.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::errors::ApiResult;
use crate::longpoll::{CategoryStats, LongpollManager};
use crate::observability::MetricsSnapshot;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Metrics response
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub counters: MetricsSnapshot,
    pub waiting: usize,
    pub categories: Vec<CategoryStats>,
}

/// `GET /health` and `GET /metrics`
pub fn observability_routes(manager: LongpollManager) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(manager)
}

/// Health check handler; reports "closed" once the manager has shut down
async fn health_handler(State(manager): State<LongpollManager>) -> impl IntoResponse {
    let (status, label) = if manager.is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "closed")
    } else {
        (StatusCode::OK, "ok")
    };

    let response = HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (status, Json(response))
}

async fn metrics_handler(State(manager): State<LongpollManager>) -> ApiResult<Json<MetricsResponse>> {
    let categories = manager.category_stats()?;
    let waiting = categories.iter().map(|c| c.waiting).sum();

    Ok(Json(MetricsResponse {
        counters: manager.metrics(),
        waiting,
        categories,
    }))
}
