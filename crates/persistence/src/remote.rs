#![cfg(feature = "redis")]

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::entity::{Entity, Fields};
use crate::errors::PersistenceError;
use crate::layer::{namespaced, PersistenceLayer};

/// Remote flat key/field backend. Each record is a hash whose expiry is set in
/// the same transaction as its fields.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    ttl: Duration,
}

impl RedisStore {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(url)
            .map_err(|err| PersistenceError::unavailable(format!("redis client: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| PersistenceError::unavailable(format!("redis connect: {err}")))?;
        debug!(ttl_ms = ttl.as_millis() as u64, "redis store connected");
        Ok(Self { manager, ttl })
    }

    fn expiry_millis(&self, requested: Option<Duration>) -> i64 {
        let ttl = requested.map(|t| t.min(self.ttl)).unwrap_or(self.ttl);
        i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
    }
}

#[async_trait]
impl<R: Entity> PersistenceLayer<R> for RedisStore {
    #[tracing::instrument(skip(self), fields(keyspace = R::KEYSPACE))]
    async fn get(&self, key: &str) -> Result<Option<R>, PersistenceError> {
        let mut conn = self.manager.clone();
        let fields: Fields = conn
            .hgetall(namespaced::<R>(key))
            .await
            .map_err(|err| PersistenceError::unavailable(format!("redis hgetall: {err}")))?;
        if fields.is_empty() {
            return Ok(None);
        }
        R::from_fields(&fields).map(Some)
    }

    #[tracing::instrument(skip(self, record), fields(keyspace = R::KEYSPACE))]
    async fn put(
        &self,
        key: &str,
        record: R,
        ttl: Option<Duration>,
    ) -> Result<(), PersistenceError> {
        let fields: Vec<(String, String)> = record.to_fields()?.into_iter().collect();
        let namespaced = namespaced::<R>(key);
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .del(&namespaced)
            .ignore()
            .hset_multiple(&namespaced, &fields)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&namespaced)
            .arg(self.expiry_millis(ttl))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|err| PersistenceError::unavailable(format!("redis put: {err}")))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(keyspace = R::KEYSPACE))]
    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(namespaced::<R>(key))
            .await
            .map_err(|err| PersistenceError::unavailable(format!("redis del: {err}")))?;
        Ok(())
    }
}
