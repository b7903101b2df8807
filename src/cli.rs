//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// Bakta job service: submits annotation jobs to Kubernetes and keeps their
/// status in sync.
#[derive(Debug, Parser)]
#[command(name = "bakta-jobs", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable debug logging. `RUST_LOG` takes precedence when set.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the API, the workload callback listener and the reconciler.
    Serve,

    /// Load and validate the configuration, then print it with secrets redacted.
    CheckConfig,
}
