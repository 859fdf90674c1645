//! # HTTP Server Module
//!
//! Exposes the long-poll manager over HTTP with axum.
//!
//! # Endpoints
//!
//! - `/events` - Long-poll a category
//! - `/health` - Health check
//! - `/metrics` - Manager counters and per-category stats

pub mod config;
pub mod errors;
pub mod longpoll_routes;
pub mod observability_routes;
pub mod server;

pub use config::{CorsConfig, HttpServerConfig};
pub use errors::{ApiError, ApiResult};
pub use longpoll_routes::{FixedSubscription, PollResponse};
pub use server::HttpServer;
