use std::sync::Arc;

use gatehouse_core_types::Token;
use gatehouse_event_bus::{Envelope, Frame, LogHandle, TopicReader};
use gatehouse_persistence::{AuthorisedRequest, PersistenceHandle};
use gatehouse_rule_engine::{apply_rules, PolicyService, Resource};
use tracing::{debug, info, instrument, warn};

use crate::audit::AuditReporter;
use crate::error::StageError;
use crate::model::{AuthorisedResource, DataRequest};
use crate::users::UserDirectory;

/// Applies resource rules to each request and forwards what survives.
///
/// Markers are forwarded for every token, so a request whose resource was
/// denied or failed still yields a complete, empty stream downstream.
pub struct PolicyStage {
    policies: Arc<dyn PolicyService>,
    users: Arc<dyn UserDirectory>,
    authorised: PersistenceHandle<AuthorisedRequest>,
    output: LogHandle<AuthorisedResource>,
    audit: AuditReporter,
}

impl PolicyStage {
    pub fn new(
        policies: Arc<dyn PolicyService>,
        users: Arc<dyn UserDirectory>,
        authorised: PersistenceHandle<AuthorisedRequest>,
        output: LogHandle<AuthorisedResource>,
        audit: AuditReporter,
    ) -> Self {
        Self {
            policies,
            users,
            authorised,
            output,
            audit,
        }
    }

    /// Consumes the request topic until it closes or the output topic rejects a publish.
    pub async fn run(self: Arc<Self>, mut requests: TopicReader<DataRequest>) {
        while let Some(committed) = requests.next().await {
            if let Err(err) = self.handle(committed.envelope).await {
                warn!(%err, "policy stage stopping");
                return;
            }
        }
        info!("request topic closed, policy stage finished");
    }

    /// Only output-topic failures are returned; per-request failures become audit events.
    pub async fn handle(&self, envelope: Envelope<DataRequest>) -> Result<(), StageError> {
        let Envelope { token, frame } = envelope;
        match frame {
            Frame::Start => {
                self.output.publish(Envelope::start(token)).await?;
            }
            Frame::End => {
                self.output.publish(Envelope::end(token)).await?;
            }
            Frame::Message(request) => match self.authorise(&token, &request).await {
                Ok(Some(resource)) => {
                    self.output
                        .publish(Envelope::message(token, resource))
                        .await?;
                }
                Ok(None) => debug!(token = %token, resource = %request.resource_id, "resource denied"),
                Err(err) => self.audit.report(&token, Some(&request), &err).await,
            },
        }
        Ok(())
    }

    #[instrument(skip_all, fields(token = %token, resource = %request.resource_id))]
    async fn authorise(
        &self,
        token: &Token,
        request: &DataRequest,
    ) -> Result<Option<AuthorisedResource>, StageError> {
        let user = self.users.resolve(&request.user_id);
        let rules = self.policies.compiled_resource_rules(&request.resource_id)?;

        let resource = Resource::new(request.resource_id.as_str());
        let Some(resource) = apply_rules(resource, &user, &request.context, Some(&rules))? else {
            return Ok(None);
        };

        let record_rules = self.policies.get_record_rules(&request.resource_id);
        let entity = AuthorisedRequest {
            token: token.clone(),
            resource_id: request.resource_id.clone(),
            user: user.clone(),
            context: request.context.clone(),
            record_rules: record_rules.clone(),
        };
        self.authorised
            .put(&entity.storage_key(), entity, None)
            .await?;

        Ok(Some(AuthorisedResource {
            user,
            context: request.context.clone(),
            resource,
            record_rules,
        }))
    }
}
