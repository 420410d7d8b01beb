use super::info::cmd_info;
use super::request::cmd_request;
use super::validate::cmd_validate;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use crate::cli::env::CliArgs;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Validate(args) => cmd_validate(args, ctx).await,
        Commands::Request(args) => cmd_request(args, ctx).await,
        Commands::Info => cmd_info(ctx).await,
    }
}
