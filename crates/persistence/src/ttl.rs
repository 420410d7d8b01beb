use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::entity::{Entity, Fields};
use crate::errors::PersistenceError;
use crate::layer::{namespaced, PersistenceLayer};

#[derive(Clone, Debug)]
struct TtlEntry {
    fields: Fields,
    expires_at: Instant,
}

/// In-process flat key/field cache whose entries expire a fixed time after write.
///
/// The effective ttl of a write is the requested ttl capped at the cache's own
/// ttl, or the cache ttl when none is requested. Expired entries read as
/// absent and are dropped lazily on read, or in bulk by [`spawn_sweeper`].
///
/// [`spawn_sweeper`]: TtlMemoryCache::spawn_sweeper
#[derive(Clone, Debug)]
pub struct TtlMemoryCache {
    inner: Arc<DashMap<String, TtlEntry>>,
    ttl: Duration,
}

impl TtlMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
        requested.map(|t| t.min(self.ttl)).unwrap_or(self.ttl)
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&self.inner)
    }

    /// Starts a task that purges expired entries every `period`.
    ///
    /// The task holds only a weak reference and ends once every clone of the
    /// cache is dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let weak: Weak<DashMap<String, TtlEntry>> = Arc::downgrade(&self.inner);
        let period = period.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("ttl cache dropped, sweeper exiting");
                    break;
                };
                purge(&inner);
            }
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn purge(inner: &DashMap<String, TtlEntry>) -> usize {
    let now = Instant::now();
    let before = inner.len();
    inner.retain(|_, entry| entry.expires_at > now);
    let purged = before.saturating_sub(inner.len());
    if purged > 0 {
        debug!(purged, "purged expired cache entries");
    }
    purged
}

#[async_trait]
impl<R: Entity> PersistenceLayer<R> for TtlMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<R>, PersistenceError> {
        let namespaced = namespaced::<R>(key);
        let now = Instant::now();
        let live = self
            .inner
            .get(&namespaced)
            .map(|entry| (entry.expires_at > now).then(|| entry.fields.clone()));
        match live {
            Some(Some(fields)) => R::from_fields(&fields).map(Some),
            Some(None) => {
                self.inner
                    .remove_if(&namespaced, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        record: R,
        ttl: Option<Duration>,
    ) -> Result<(), PersistenceError> {
        let entry = TtlEntry {
            fields: record.to_fields()?,
            expires_at: Instant::now() + self.effective_ttl(ttl),
        };
        self.inner.insert(namespaced::<R>(key), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.inner.remove(&namespaced::<R>(key));
        Ok(())
    }
}
