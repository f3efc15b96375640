// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy document commands
//!
//! Commands: validate, diff, flatten, init

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use aegis_decision_core::domain::policy_config::{PolicyBundle, PolicyDiff, PolicyManifest};

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Validate a policy document exactly as a reload would
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show role changes between two policy documents
    Diff {
        #[arg(value_name = "OLD")]
        old: PathBuf,

        #[arg(value_name = "NEW")]
        new: PathBuf,
    },

    /// Print the document with inheritance resolved into explicit permissions
    Flatten {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Write a starter policy document
    Init {
        /// Output path (default: ./policy.yaml)
        #[arg(short, long, default_value = "./policy.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: PolicyCommand) -> Result<()> {
    match command {
        PolicyCommand::Validate { file } => validate(&file),
        PolicyCommand::Diff { old, new } => diff(&old, &new),
        PolicyCommand::Flatten { file } => flatten(&file),
        PolicyCommand::Init { output } => init(&output),
    }
}

fn load(path: &Path) -> Result<(PolicyManifest, PolicyBundle)> {
    let manifest =
        PolicyManifest::from_file(path).with_context(|| format!("Failed to read policy {:?}", path))?;
    let bundle =
        PolicyBundle::from_manifest(&manifest).with_context(|| format!("Policy {:?} is invalid", path))?;
    Ok((manifest, bundle))
}

fn validate(path: &Path) -> Result<()> {
    let (_, bundle) = load(path)?;

    println!("{}", format!("✓ Policy {} is valid", bundle.policy_id()).green());
    let mut roles: Vec<_> = bundle.matrix.roles().collect();
    roles.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
    for role in roles {
        let inherits = role
            .inherits
            .as_deref()
            .map(|base| format!(" (inherits {})", base))
            .unwrap_or_default();
        println!(
            "  {} [{}] {} permissions{}",
            role.name.bold(),
            role.level,
            role.permissions.len(),
            inherits.dimmed()
        );
    }
    Ok(())
}

fn diff(old: &Path, new: &Path) -> Result<()> {
    let (_, before) = load(old)?;
    let (_, after) = load(new)?;
    print!("{}", render_diff(&before.diff(&after)));
    Ok(())
}

fn render_diff(diff: &PolicyDiff) -> String {
    let mut out = format!("{} → {}\n", diff.previous_policy, diff.new_policy);
    if diff.is_empty() {
        out.push_str("  no role or PII changes\n");
        return out;
    }
    for role in &diff.added_roles {
        out.push_str(&format!("  + {}\n", role));
    }
    for role in &diff.removed_roles {
        out.push_str(&format!("  - {}\n", role));
    }
    for role in &diff.changed_roles {
        out.push_str(&format!("  ~ {}\n", role));
    }
    if diff.pii_changed {
        out.push_str("  ~ pii policy\n");
    }
    out
}

fn flatten(path: &Path) -> Result<()> {
    let (mut manifest, bundle) = load(path)?;
    manifest.spec.roles = bundle.matrix.to_flat_definitions();
    print!("{}", manifest.to_yaml_string()?);
    Ok(())
}

fn init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    std::fs::write(output, include_str!("../../templates/policy.yaml"))
        .with_context(|| format!("Failed to write policy to {:?}", output))?;
    println!("{}", format!("✓ Policy generated: {}", output.display()).green());
    Ok(())
}
