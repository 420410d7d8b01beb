use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use gatehouse_core_types::{GateError, Token};

mod topic;

pub use topic::{InMemoryTopic, TopicReader};

/// Trait implemented by payload types that can be carried on a topic.
pub trait Event: Clone + Send + Sync + fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + fmt::Debug + 'static {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("topic `{0}` is closed")]
    Closed(String),
}

impl From<BusError> for GateError {
    fn from(value: BusError) -> Self {
        GateError::new(value.to_string())
    }
}

/// The two sentinels bracketing one token's messages on a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamMarker {
    #[default]
    Start,
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame<E> {
    Start,
    Message(E),
    End,
}

/// One message on a topic, keyed by the request token.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope<E> {
    pub token: Token,
    pub frame: Frame<E>,
}

impl<E> Envelope<E> {
    pub fn start(token: Token) -> Self {
        Self {
            token,
            frame: Frame::Start,
        }
    }

    pub fn message(token: Token, payload: E) -> Self {
        Self {
            token,
            frame: Frame::Message(payload),
        }
    }

    pub fn end(token: Token) -> Self {
        Self {
            token,
            frame: Frame::End,
        }
    }

    pub fn marker(&self) -> Option<StreamMarker> {
        match self.frame {
            Frame::Start => Some(StreamMarker::Start),
            Frame::End => Some(StreamMarker::End),
            Frame::Message(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&E> {
        match &self.frame {
            Frame::Message(payload) => Some(payload),
            _ => None,
        }
    }
}

/// An envelope together with the offset the log assigned to it.
#[derive(Clone, Debug, PartialEq)]
pub struct Committed<E> {
    pub offset: i64,
    pub envelope: Envelope<E>,
}

/// Append-only ordered log. Offsets start at zero and grow by one per publish.
#[async_trait]
pub trait EventLog<E>: Send + Sync
where
    E: Event,
{
    fn name(&self) -> &str;
    async fn publish(&self, envelope: Envelope<E>) -> Result<i64, BusError>;
    fn read(&self, offset: i64) -> Option<Committed<E>>;
    /// Offset the next publish will be assigned.
    fn end_offset(&self) -> i64;
    /// Changes whenever the log grows or closes.
    fn watch_end(&self) -> watch::Receiver<i64>;
    fn is_closed(&self) -> bool;
}

pub type LogHandle<E> = Arc<dyn EventLog<E> + 'static>;
