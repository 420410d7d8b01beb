use gatehouse_core_types::GateError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("persistence backend unavailable: {0}")]
    Unavailable(String),
    #[error("persistence backend error: {0}")]
    Backend(String),
    #[error("record codec error: {0}")]
    Codec(String),
}

impl PersistenceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                PersistenceError::Unavailable(format!("sqlite: {err}"))
            }
            other => PersistenceError::Backend(format!("sqlite: {other}")),
        }
    }
}

impl From<PersistenceError> for GateError {
    fn from(value: PersistenceError) -> Self {
        GateError::new(value.to_string())
    }
}
