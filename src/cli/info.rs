use anyhow::Result;
use gatehouse_rule_engine::loader::ENV_POLICY_PATHS;
use gatehouse_rule_engine::RuleCatalog;

use super::context::CliContext;

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let catalog = RuleCatalog::with_builtins();

    println!("Gatehouse System Information");
    println!("============================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {}", env!("GIT_HASH"));
    println!();

    println!("Configuration:");
    match ctx.config_path() {
        Some(path) => println!("- Config File: {}", path.display()),
        None => println!("- Config File: (defaults)"),
    }
    println!("- Persistence Profile: {:?}", config.persistence.profile);
    println!(
        "- Offset TTL: {}",
        humantime::format_duration(config.persistence.offset_ttl)
    );
    println!(
        "- Worker Timeout: {}",
        humantime::format_duration(config.worker_timeout())
    );
    println!("- Stream Boundary: {:?}", config.pipeline.boundary);
    match &config.policies_path {
        Some(path) => println!("- Policy File: {}", path.display()),
        None => println!("- Policy File: (from {ENV_POLICY_PATHS})"),
    }
    println!("- Users: {}", config.users.len());
    println!();

    println!("Built-in Rules:");
    println!("- Resource: {}", catalog.resource.names().join(", "));
    println!("- Record: {}", catalog.record.names().join(", "));
    Ok(())
}
