// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aegis_decision_core::domain::engine_config::{AuditSinkConfig, EngineConfigManifest, CONFIG_ENV_VAR};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file populated with defaults
    Generate {
        /// Output path (default: ./aegis-decision.yaml)
        #[arg(short, long, default_value = "./aegis-decision.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = EngineConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_ENV_VAR,
            std::env::var(CONFIG_ENV_VAR)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aegis-decision.yaml");
        println!("  4. ~/.aegis/decision.yaml");
        println!("  5. /etc/aegis/decision.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!(
        "  Policy: {}",
        spec.policy_path.as_deref().unwrap_or("(none, deny all)")
    );
    println!("  Listen: {}:{}", spec.network.bind_address, spec.network.port);
    println!();

    println!("{}", "Token verification:".bold());
    let key = if spec.token.rsa_public_key_path.is_some() {
        "RS256 public key"
    } else if spec.token.hs256_secret.is_some() {
        "HS256 shared secret"
    } else {
        "(not configured)"
    };
    println!("  Key: {}", key);
    println!("  Issuer: {}", spec.token.issuer.as_deref().unwrap_or("(any)"));
    println!("  Audience: {}", spec.token.audience.as_deref().unwrap_or("(any)"));
    println!("  Leeway: {}s", spec.token.leeway_seconds);
    println!();

    println!("{}", "Audit:".bold());
    println!(
        "  Queue: {} records, batches of {}",
        spec.audit.queue_capacity, spec.audit.batch_size
    );
    println!("  Retries: {} attempts", spec.audit.max_attempts);
    for sink in &spec.audit.sinks {
        match sink {
            AuditSinkConfig::Log => println!("  - log"),
            AuditSinkConfig::Metrics => println!("  - metrics"),
            AuditSinkConfig::Http { endpoint, .. } => println!("  - http → {}", endpoint),
        }
    }
    println!();

    println!("{}", "SLOs:".bold());
    for slo in &spec.slo.objectives {
        println!("  {} (objective {})", slo.name.bold(), slo.objective);
    }
    println!();

    let metrics = &spec.observability.metrics;
    println!("{}", "Observability:".bold());
    println!(
        "  Logging: {} ({})",
        spec.observability.logging.level, spec.observability.logging.format
    );
    if metrics.enabled {
        println!("  Metrics: :{}/metrics", metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = EngineConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", output.display());
    }

    EngineConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
