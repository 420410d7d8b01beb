use gatehouse_core_types::{Context, ResourceId, Token, UserId};
use gatehouse_event_bus::{Envelope, LogHandle};
use tracing::{debug, instrument};

use crate::audit::AuditReporter;
use crate::error::StageError;
use crate::model::DataRequest;

/// Entry point for clients: turns a data request into a token and a bracketed stream.
pub struct Ingress {
    requests: LogHandle<DataRequest>,
    audit: AuditReporter,
}

impl Ingress {
    pub fn new(requests: LogHandle<DataRequest>, audit: AuditReporter) -> Self {
        Self { requests, audit }
    }

    /// Publishes start marker, request and end marker under a fresh token.
    ///
    /// On failure an audit error event is published for the token before the
    /// error is returned.
    #[instrument(skip_all, fields(user = %user_id, resource = %resource_id))]
    pub async fn register_data_request(
        &self,
        user_id: UserId,
        resource_id: ResourceId,
        context: Context,
    ) -> Result<Token, StageError> {
        let token = Token::new();
        let request = DataRequest {
            user_id,
            resource_id,
            context,
        };
        match self.publish(&token, &request).await {
            Ok(()) => {
                debug!(token = %token, "data request registered");
                Ok(token)
            }
            Err(err) => {
                self.audit.report(&token, Some(&request), &err).await;
                Err(err)
            }
        }
    }

    async fn publish(&self, token: &Token, request: &DataRequest) -> Result<(), StageError> {
        if request.user_id.0.trim().is_empty() {
            return Err(StageError::InvalidRequest("user id is empty".into()));
        }
        if request.resource_id.as_str().trim().is_empty() {
            return Err(StageError::InvalidRequest("resource id is empty".into()));
        }
        self.requests.publish(Envelope::start(token.clone())).await?;
        self.requests
            .publish(Envelope::message(token.clone(), request.clone()))
            .await?;
        self.requests.publish(Envelope::end(token.clone())).await?;
        Ok(())
    }
}
