// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Decision Engine CLI
//!
//! The `aegis-decision` binary hosts the authorization decision engine.
//!
//! ## Commands
//!
//! - `aegis-decision serve` - Run the decision API, audit dispatcher and SLO monitor
//! - `aegis-decision policy validate|diff|init` - Policy document tooling
//! - `aegis-decision config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use aegis_decision::commands::{self, ConfigCommand, PolicyCommand};
use aegis_decision::server;
use aegis_decision_core::domain::engine_config::EngineConfigManifest;

/// AEGIS Decision Engine - tenant-scoped authorization decisions with audit
#[derive(Parser)]
#[command(name = "aegis-decision")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AEGIS_DECISION_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision engine server
    #[command(name = "serve")]
    Serve,

    /// Policy document tooling
    #[command(name = "policy")]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = EngineConfigManifest::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            let logging = &config.spec.observability.logging;
            init_logging(
                cli.log_level.as_deref().unwrap_or(&logging.level),
                cli.log_format.as_deref().unwrap_or(&logging.format),
            )?;
            server::run(config).await
        }
        Commands::Policy { command } => {
            init_logging(
                cli.log_level.as_deref().unwrap_or("warn"),
                cli.log_format.as_deref().unwrap_or("text"),
            )?;
            commands::policy::handle_command(command).await
        }
        Commands::Config { command } => {
            init_logging(
                cli.log_level.as_deref().unwrap_or("warn"),
                cli.log_format.as_deref().unwrap_or("text"),
            )?;
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_target(false).compact().init();
    }

    Ok(())
}
