//! CLI command implementations
//!
//! `serve` boots in this order: config, logging, manager, generator, HTTP.
//! On Ctrl-C the manager shuts down first so parked polls are answered
//! before the HTTP server drains.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::http_server::{FixedSubscription, HttpServer, HttpServerConfig};
use crate::longpoll::{LongpollManager, Options};
use crate::observability::{logging, LoggingConfig};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::generator;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener and CORS
    #[serde(default)]
    pub http: HttpServerConfig,

    /// Long-poll manager options
    #[serde(default)]
    pub longpoll: Options,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Demo generator and its fixed route
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Demo generator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Run the generator and mount the fixed route (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Messages go to `unread_messages_for_<user_id>`
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Seconds between published messages (default: 3)
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,

    /// Route path (default: "/unread_messages")
    #[serde(default = "default_route")]
    pub route: String,

    /// Timeout forced on every poll of the route (default: 10)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}
fn default_user_id() -> String {
    "my_pretty_uuid".to_string()
}
fn default_interval() -> u64 {
    3
}
fn default_route() -> String {
    "/unread_messages".to_string()
}
fn default_timeout() -> u64 {
    10
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            user_id: default_user_id(),
            interval_seconds: default_interval(),
            route: default_route(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl DemoConfig {
    /// Category the generator publishes to
    pub fn category(&self) -> String {
        format!("unread_messages_for_{}", self.user_id)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file, or use defaults if it does not exist
    pub fn load_or_default(path: &Path) -> CliResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> CliResult<()> {
        self.longpoll
            .validate()
            .map_err(|e| CliError::config_error(e.to_string()))?;

        if self.demo.enabled {
            if self.demo.interval_seconds == 0 {
                return Err(CliError::config_error("demo.interval_seconds must be > 0"));
            }

            if !self.demo.route.starts_with('/') {
                return Err(CliError::config_error(format!(
                    "demo.route must start with '/': '{}'",
                    self.demo.route
                )));
            }

            // Otherwise every request to the demo route would be rejected
            if self.demo.timeout_seconds > self.longpoll.max_longpoll_timeout_seconds {
                return Err(CliError::config_error(format!(
                    "demo.timeout_seconds ({}) exceeds longpoll.max_longpoll_timeout_seconds ({})",
                    self.demo.timeout_seconds, self.longpoll.max_longpoll_timeout_seconds
                )));
            }
        }

        Ok(())
    }

    /// Logging config with manager debug output enabled when requested
    fn effective_logging(&self) -> LoggingConfig {
        let mut logging = self.logging.clone();
        if self.longpoll.logging_enabled {
            logging.level.push_str(",longpoll=debug");
        }
        logging
    }
}

/// Run a parsed command
pub async fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Serve { config, port } => {
            let mut config = Config::load_or_default(&config)?;
            if let Some(port) = port {
                config.http.port = port;
            }
            logging::init(&config.effective_logging())
                .map_err(|e| CliError::boot_failed(e.to_string()))?;
            serve(config).await
        }
        Command::CheckConfig { config } => {
            let config = Config::load(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Boot the manager, the generator and the HTTP server; run until Ctrl-C
pub async fn serve(config: Config) -> CliResult<()> {
    let manager = LongpollManager::start(config.longpoll.clone())
        .map_err(|e| CliError::boot_failed(e.to_string()))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut server = HttpServer::new(config.http.clone(), manager.clone());

    let generator = if config.demo.enabled {
        let category = config.demo.category();
        server = server.with_fixed_subscription(
            &config.demo.route,
            FixedSubscription {
                manager: manager.clone(),
                category: category.clone(),
                timeout_seconds: config.demo.timeout_seconds,
            },
        );
        tracing::info!(category = %category, route = %config.demo.route, "demo generator enabled");
        Some(generator::spawn(
            manager.clone(),
            category,
            Duration::from_secs(config.demo.interval_seconds),
            shutdown_tx.subscribe(),
        ))
    } else {
        None
    };

    let signal_manager = manager.clone();
    let signal_tx = shutdown_tx.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("shutdown requested");
        let _ = signal_tx.send(());
        signal_manager.shutdown().await;
    };

    let result = server.start(shutdown).await;

    // Covers the bind-failure path; both are no-ops after a normal shutdown
    let _ = shutdown_tx.send(());
    manager.shutdown().await;
    if let Some(handle) = generator {
        if let Ok(published) = handle.await {
            tracing::info!(published, "demo generator finished");
        }
    }

    result.map_err(CliError::from)
}
