use std::path::PathBuf;

use gatehouse_core_types::GateError;
use gatehouse_persistence::PersistenceError;
use gatehouse_rule_engine::RuleError;
use thiserror::Error;

/// Failures while assembling the application from its configuration.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration file {} does not exist", .0.display())]
    MissingConfig(PathBuf),
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Policy(#[from] RuleError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("{0}")]
    Unsupported(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl From<AppError> for GateError {
    fn from(value: AppError) -> Self {
        GateError::new(value.to_string())
    }
}
