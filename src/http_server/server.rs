//! # HTTP Server
//!
//! Combines the long-poll and observability routers behind CORS, request
//! tracing and panic recovery.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::config::HttpServerConfig;
use super::errors::ErrorResponse;
use super::longpoll_routes::{fixed_subscription_routes, longpoll_routes, FixedSubscription};
use super::observability_routes::observability_routes;
use crate::longpoll::LongpollManager;

/// HTTP server for the long-poll manager
pub struct HttpServer {
    config: HttpServerConfig,
    routes: Router,
}

impl HttpServer {
    /// Create a server exposing `/events`, `/health` and `/metrics`
    pub fn new(config: HttpServerConfig, manager: LongpollManager) -> Self {
        let routes = Router::new()
            .merge(observability_routes(manager.clone()))
            .merge(longpoll_routes(manager));
        Self { config, routes }
    }

    /// Add a route that always polls one category with a fixed timeout
    pub fn with_fixed_subscription(mut self, path: &str, subscription: FixedSubscription) -> Self {
        self.routes = self.routes.merge(fixed_subscription_routes(path, subscription));
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// The fully layered router (for testing)
    pub fn router(self) -> Router {
        // Outermost first: CORS, then tracing, then panic recovery
        // Applied innermost first so each layer sees axum's `Body` (which is
        // `Default`, as `Cors` requires).
        self.routes
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http())
            .layer(self.config.cors.layer())
    }

    /// Serve until `shutdown` completes, then drain in-flight requests
    pub async fn start<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address '{}': {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "long-poll HTTP server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("long-poll HTTP server stopped");
        Ok(())
    }
}

/// Answer a panicking handler with a JSON 500 instead of dropping the connection
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "request handler panicked");

    let body = ErrorResponse {
        error: "panic error".to_string(),
        code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
