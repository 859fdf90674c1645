//! HTTP Server Configuration
//!
//! Configuration for the HTTP server including host, port, and CORS settings.

use std::time::Duration;

use axum::http::{HeaderName, Method};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS policy
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: CorsConfig::default(),
        }
    }
}

impl HttpServerConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// CORS policy. `"*"` in `allow_origins` allows any origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_origins")]
    pub allow_origins: Vec<String>,

    #[serde(default = "default_headers")]
    pub allow_headers: Vec<String>,

    #[serde(default = "default_methods")]
    pub allow_methods: Vec<String>,

    #[serde(default = "default_expose_headers")]
    pub expose_headers: Vec<String>,

    #[serde(default = "default_true")]
    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds (default: 5600)
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_headers() -> Vec<String> {
    [
        "Origin",
        "Authorization",
        "Content-Type",
        "Content-Length",
        "Accept",
        "Accept-Encoding",
        "X-HttpRequest",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE"].iter().map(|s| s.to_string()).collect()
}

fn default_expose_headers() -> Vec<String> {
    vec!["Content-Length".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_max_age() -> u64 {
    5600
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_origins(),
            allow_headers: default_headers(),
            allow_methods: default_methods(),
            expose_headers: default_expose_headers(),
            allow_credentials: default_true(),
            max_age_secs: default_max_age(),
        }
    }
}

impl CorsConfig {
    /// Build the CORS middleware. Entries that fail to parse are skipped.
    pub fn layer(&self) -> CorsLayer {
        let wildcard = self.allow_origins.iter().any(|o| o == "*");
        let origin = if wildcard && self.allow_credentials {
            // Credentials forbid a literal `*`; echo the caller's origin instead
            AllowOrigin::mirror_request()
        } else if wildcard {
            AllowOrigin::from(Any)
        } else {
            let origins: Vec<_> = self
                .allow_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            AllowOrigin::list(origins)
        };

        let methods: Vec<Method> = self
            .allow_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(parse_headers(&self.allow_headers))
            .expose_headers(parse_headers(&self.expose_headers))
            .allow_credentials(self.allow_credentials)
            .max_age(Duration::from_secs(self.max_age_secs))
    }
}

fn parse_headers(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|h| match h.parse() {
            Ok(name) => Some(name),
            Err(_) => {
                tracing::warn!(header = %h, "ignoring invalid CORS header name");
                None
            }
        })
        .collect()
}
