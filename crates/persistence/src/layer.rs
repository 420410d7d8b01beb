use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::errors::PersistenceError;

/// Asynchronous key/value contract shared by every backend.
///
/// `Ok(None)` always means "not found"; backend failures are `Err`.
#[async_trait]
pub trait PersistenceLayer<R: Entity>: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<R>, PersistenceError>;
    /// Stores `record` under `key`. Durable backends ignore `ttl`.
    async fn put(&self, key: &str, record: R, ttl: Option<Duration>)
        -> Result<(), PersistenceError>;
    async fn delete(&self, key: &str) -> Result<(), PersistenceError>;
}

pub type PersistenceHandle<R> = Arc<dyn PersistenceLayer<R> + 'static>;

pub(crate) fn namespaced<R: Entity>(key: &str) -> String {
    format!("{}:{}", R::KEYSPACE, key)
}
