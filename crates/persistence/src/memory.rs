use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

use crate::entity::Entity;
use crate::errors::PersistenceError;
use crate::layer::{namespaced, PersistenceLayer};

/// Unbounded in-process store. Entries live until explicitly deleted.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl<R: Entity> PersistenceLayer<R> for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<R>, PersistenceError> {
        let Some(document) = self.inner.get(&namespaced::<R>(key)).map(|v| v.clone()) else {
            return Ok(None);
        };
        serde_json::from_value(document)
            .map(Some)
            .map_err(|err| PersistenceError::codec(format!("{err}")))
    }

    async fn put(
        &self,
        key: &str,
        record: R,
        ttl: Option<Duration>,
    ) -> Result<(), PersistenceError> {
        if ttl.is_some() {
            trace!(keyspace = R::KEYSPACE, key, "durable store ignores ttl");
        }
        let document =
            serde_json::to_value(&record).map_err(|err| PersistenceError::codec(format!("{err}")))?;
        self.inner.insert(namespaced::<R>(key), document);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.inner.remove(&namespaced::<R>(key));
        Ok(())
    }
}
