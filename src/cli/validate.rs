use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::context::CliContext;
use super::output::emit_structured;
use crate::app::load_policy_service;
use crate::config::StoreProfile;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Policy file to check instead of the configured one
    #[arg(long, value_name = "FILE")]
    pub policies: Option<PathBuf>,
}

#[derive(Serialize)]
struct ValidationReport {
    config_path: Option<PathBuf>,
    profile: StoreProfile,
    policy_entries: usize,
    resource_policies: usize,
    record_policies: usize,
    users: usize,
}

pub async fn cmd_validate(args: ValidateArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(path) = args.policies {
        config.policies_path = Some(path);
    }
    config.validate().context("Invalid configuration")?;
    let (_, _, document) = load_policy_service(&config).context("Invalid policies")?;

    let report = ValidationReport {
        config_path: ctx.config_path().map(|path| path.to_path_buf()),
        profile: config.persistence.profile,
        policy_entries: document.len(),
        resource_policies: document
            .policies
            .iter()
            .filter(|entry| entry.resource_rules.is_some())
            .count(),
        record_policies: document
            .policies
            .iter()
            .filter(|entry| entry.record_rules.is_some())
            .count(),
        users: config.users.len(),
    };

    if emit_structured(ctx.output(), &report)? {
        return Ok(());
    }
    println!("Configuration OK");
    match &report.config_path {
        Some(path) => println!("- Config File: {}", path.display()),
        None => println!("- Config File: (defaults)"),
    }
    println!("- Persistence Profile: {:?}", report.profile);
    println!(
        "- Policies: {} entries ({} resource, {} record)",
        report.policy_entries, report.resource_policies, report.record_policies
    );
    println!("- Users: {}", report.users);
    Ok(())
}
