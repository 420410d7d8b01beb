use clap::Subcommand;

use super::request::RequestArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Load the configuration and compile every policy
    Validate(ValidateArgs),

    /// Run one data request through an in-process pipeline
    Request(RequestArgs),

    /// Show build and configuration information
    Info,
}
