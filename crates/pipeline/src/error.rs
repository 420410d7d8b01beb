use gatehouse_core_types::GateError;
use gatehouse_event_bus::BusError;
use gatehouse_offset_coordinator::OffsetError;
use gatehouse_persistence::PersistenceError;
use gatehouse_rule_engine::RuleError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Offset(#[from] OffsetError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<StageError> for GateError {
    fn from(value: StageError) -> Self {
        GateError::new(value.to_string())
    }
}
