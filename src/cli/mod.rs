//! CLI module for the long-poll server
//!
//! Provides command-line interface for:
//! - serve: boot the manager, the demo generator and the HTTP server
//! - check-config: validate and print a configuration file

mod args;
mod commands;
mod errors;
pub mod generator;

pub use args::{Cli, Command};
pub use commands::{run_command, serve, Config, DemoConfig};
pub use errors::{CliError, CliErrorCode, CliResult};

/// Parse arguments and run the selected command
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command).await
}
