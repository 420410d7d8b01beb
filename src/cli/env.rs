use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;

/// Gatehouse: attribute-based access control over hierarchical resources.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Gatehouse YAML config (default config/gatehouse.yaml); GATEHOUSE__* variables override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Log pipeline stages and rule merges at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Render command results as human text, json or yaml
    #[arg(short, long, default_value = "human")]
    pub output: crate::cli::output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
