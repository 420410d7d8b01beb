use std::time::Duration;

use gatehouse_core_types::{GateError, Token};
use gatehouse_persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OffsetError {
    #[error("offset lookup failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("no offset for token {token} within {after:?}")]
    TimedOut { token: Token, after: Duration },
    #[error("offset request for token {token} cancelled: {reason}")]
    Cancelled { token: Token, reason: String },
    #[error("offset worker for token {0} stopped without replying")]
    WorkerLost(Token),
}

impl OffsetError {
    /// Lookups that failed in the store, as opposed to never finding an offset.
    pub fn is_persistence(&self) -> bool {
        matches!(self, OffsetError::Persistence(_))
    }
}

impl From<OffsetError> for GateError {
    fn from(value: OffsetError) -> Self {
        GateError::new(value.to_string())
    }
}
