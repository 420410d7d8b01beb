use std::sync::Arc;

use gatehouse_core_types::{ResourceId, Token};
use gatehouse_event_bus::{BusError, Frame, LogHandle, StreamMarker, TopicReader};
use gatehouse_offset_coordinator::OffsetCoordinator;
use gatehouse_persistence::{AuthorisedRequest, PersistenceHandle};
use gatehouse_rule_engine::{apply_rules, Record, RuleCatalog};
use tracing::{debug, instrument};

use crate::error::StageError;
use crate::model::AuthorisedResource;

/// Reads back the resources authorised for a token.
pub struct FilteredResourceStage {
    coordinator: Arc<OffsetCoordinator>,
    output: LogHandle<AuthorisedResource>,
    boundary: StreamMarker,
}

impl FilteredResourceStage {
    pub fn new(
        coordinator: Arc<OffsetCoordinator>,
        output: LogHandle<AuthorisedResource>,
        boundary: StreamMarker,
    ) -> Self {
        Self {
            coordinator,
            output,
            boundary,
        }
    }

    /// Waits for the token's offset, then collects its messages up to the end marker.
    #[instrument(skip_all, fields(token = %token))]
    pub async fn authorised_resources(
        &self,
        token: &Token,
    ) -> Result<Vec<AuthorisedResource>, StageError> {
        let offset = self.coordinator.get_offset(token.clone()).await?;
        // an end boundary only proves completeness; the stream starts earlier
        let from = match self.boundary {
            StreamMarker::Start => offset.offset,
            StreamMarker::End => 0,
        };
        debug!(from, boundary = ?self.boundary, "reading output topic");

        let mut reader = TopicReader::new(Arc::clone(&self.output), from);
        let mut resources = Vec::new();
        while let Some(committed) = reader.next().await {
            if committed.envelope.token != *token {
                continue;
            }
            match committed.envelope.frame {
                Frame::Start => resources.clear(),
                Frame::Message(resource) => resources.push(resource),
                Frame::End => return Ok(resources),
            }
        }
        Err(BusError::Closed(self.output.name().to_string()).into())
    }
}

/// Applies the record rules stored for `(token, resource)` to records a reader produced.
pub struct RecordFilter {
    catalog: Arc<RuleCatalog>,
    authorised: PersistenceHandle<AuthorisedRequest>,
}

impl RecordFilter {
    pub fn new(catalog: Arc<RuleCatalog>, authorised: PersistenceHandle<AuthorisedRequest>) -> Self {
        Self {
            catalog,
            authorised,
        }
    }

    /// Records a rule drops are left out. A resource without record rules passes records unchanged.
    pub async fn filter(
        &self,
        token: &Token,
        resource_id: &ResourceId,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Vec<Record>, StageError> {
        let key = AuthorisedRequest::key(token, resource_id);
        let Some(request) = self.authorised.get(&key).await? else {
            return Err(StageError::InvalidRequest(format!(
                "no authorised request for {key}"
            )));
        };
        let compiled = match &request.record_rules {
            Some(rules) => Some(self.catalog.compile_record(rules)?),
            None => None,
        };

        let mut kept = Vec::new();
        for record in records {
            let filtered = apply_rules(record, &request.user, &request.context, compiled.as_ref())?;
            kept.extend(filtered);
        }
        Ok(kept)
    }
}
