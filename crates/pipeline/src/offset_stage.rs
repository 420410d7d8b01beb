use std::sync::Arc;
use std::time::Duration;

use gatehouse_core_types::TokenOffset;
use gatehouse_event_bus::{Committed, StreamMarker, TopicReader};
use gatehouse_offset_coordinator::OffsetCoordinator;
use gatehouse_persistence::PersistenceHandle;
use tracing::{debug, info, instrument};

use crate::audit::AuditReporter;
use crate::error::StageError;
use crate::model::AuthorisedResource;

/// Records where each token's stream sits on the output topic.
pub struct TopicOffsetStage {
    offsets: PersistenceHandle<TokenOffset>,
    coordinator: Arc<OffsetCoordinator>,
    boundary: StreamMarker,
    offset_ttl: Duration,
    audit: AuditReporter,
}

impl TopicOffsetStage {
    pub fn new(
        offsets: PersistenceHandle<TokenOffset>,
        coordinator: Arc<OffsetCoordinator>,
        boundary: StreamMarker,
        offset_ttl: Duration,
        audit: AuditReporter,
    ) -> Self {
        Self {
            offsets,
            coordinator,
            boundary,
            offset_ttl,
            audit,
        }
    }

    pub fn boundary(&self) -> StreamMarker {
        self.boundary
    }

    pub async fn run(self: Arc<Self>, mut output: TopicReader<AuthorisedResource>) {
        while let Some(committed) = output.next().await {
            if let Err(err) = self.handle(&committed).await {
                self.audit.report(&committed.envelope.token, None, &err).await;
            }
        }
        info!("output topic closed, topic offset stage finished");
    }

    /// Persists the offset of a boundary marker, then wakes any worker waiting on it.
    ///
    /// Redelivery of the same marker rewrites the same value.
    #[instrument(skip_all, fields(token = %committed.envelope.token, offset = committed.offset))]
    pub async fn handle(
        &self,
        committed: &Committed<AuthorisedResource>,
    ) -> Result<Option<TokenOffset>, StageError> {
        if committed.envelope.marker() != Some(self.boundary) {
            return Ok(None);
        }
        let offset = TokenOffset::new(committed.envelope.token.clone(), committed.offset);
        self.offsets
            .put(offset.token.as_str(), offset.clone(), Some(self.offset_ttl))
            .await?;
        let pushed = self.coordinator.offset_available(offset.clone());
        debug!(pushed, "token offset recorded");
        Ok(Some(offset))
    }
}
