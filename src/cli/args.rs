//! CLI argument definitions using clap
//!
//! Commands:
//! - longpoll serve --config <path> [--port <port>]
//! - longpoll check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// longpoll - HTTP long-poll event server
#[derive(Parser, Debug)]
#[command(name = "longpoll")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server and the demo message generator
    Serve {
        /// Path to configuration file; defaults apply if it does not exist
        #[arg(long, default_value = "./longpoll.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a configuration file and print the resolved settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./longpoll.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
