use gatehouse_core_types::GateError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("unknown rule: {0}")]
    UnknownRule(String),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("invalid policy: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("rule `{rule_id}` failed: {reason}")]
    Apply { rule_id: String, reason: String },
    #[error("no policy for resource {0}")]
    NoSuchPolicy(String),
}

impl RuleError {
    /// Configuration errors surface at load time and are never reported per request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RuleError::UnknownRule(_)
                | RuleError::InvalidRule(_)
                | RuleError::Invalid(_)
                | RuleError::Io(_)
        )
    }
}

impl From<RuleError> for GateError {
    fn from(value: RuleError) -> Self {
        GateError::new(value.to_string())
    }
}

/// Failure raised by a rule's own transform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RuleFailure(pub String);

impl RuleFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
