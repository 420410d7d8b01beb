use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::Row;
use tracing::{debug, trace};

use crate::entity::Entity;
use crate::errors::PersistenceError;
use crate::layer::PersistenceLayer;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    keyspace TEXT NOT NULL,
    key TEXT NOT NULL,
    document TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (keyspace, key)
)
"#;

/// Durable relational backend. Records are stored as JSON documents, so the
/// offset keeps its native integer form.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    #[tracing::instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::backend(format!("invalid database url: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self::from_pool(pool).await?;
        debug!("sqlite store ready");
        Ok(store)
    }

    /// Wraps an existing pool, creating the entity table when missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, PersistenceError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl<R: Entity> PersistenceLayer<R> for SqliteStore {
    #[tracing::instrument(skip(self), fields(keyspace = R::KEYSPACE))]
    async fn get(&self, key: &str) -> Result<Option<R>, PersistenceError> {
        let row = sqlx::query("SELECT document FROM entities WHERE keyspace = ? AND key = ?")
            .bind(R::KEYSPACE)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.try_get("document")?;
                serde_json::from_str(&document)
                    .map(Some)
                    .map_err(|err| PersistenceError::codec(format!("{err}")))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, record), fields(keyspace = R::KEYSPACE))]
    async fn put(
        &self,
        key: &str,
        record: R,
        ttl: Option<Duration>,
    ) -> Result<(), PersistenceError> {
        if ttl.is_some() {
            trace!("durable store ignores ttl");
        }
        let document = serde_json::to_string(&record)
            .map_err(|err| PersistenceError::codec(format!("{err}")))?;
        sqlx::query(
            r#"
            INSERT INTO entities (keyspace, key, document) VALUES (?, ?, ?)
            ON CONFLICT (keyspace, key) DO UPDATE SET
                document = excluded.document,
                updated_at = strftime('%s', 'now')
            "#,
        )
        .bind(R::KEYSPACE)
        .bind(key)
        .bind(&document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(keyspace = R::KEYSPACE))]
    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM entities WHERE keyspace = ? AND key = ?")
            .bind(R::KEYSPACE)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
