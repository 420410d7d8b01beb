use std::sync::Arc;
use std::time::Duration;

use gatehouse_core_types::{Context, ResourceId, Token, TokenOffset, UserId};
use gatehouse_event_bus::{InMemoryTopic, LogHandle, StreamMarker, TopicReader};
use gatehouse_offset_coordinator::{CoordinatorConfig, OffsetCoordinator};
use gatehouse_persistence::{AuthorisedRequest, PersistenceHandle};
use gatehouse_rule_engine::{PolicyService, RuleCatalog};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audit::AuditReporter;
use crate::error::StageError;
use crate::filtered::{FilteredResourceStage, RecordFilter};
use crate::ingress::Ingress;
use crate::model::{AuditErrorEvent, AuthorisedResource, DataRequest};
use crate::offset_stage::TopicOffsetStage;
use crate::policy_stage::PolicyStage;
use crate::users::UserDirectory;

pub const REQUEST_TOPIC: &str = "data-requests";
pub const OUTPUT_TOPIC: &str = "authorised-resources";
pub const ERROR_TOPIC: &str = "audit-errors";

/// Default lifetime of a stored token offset.
pub const DEFAULT_OFFSET_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub boundary: StreamMarker,
    pub offset_ttl: Duration,
    pub coordinator: CoordinatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            boundary: StreamMarker::Start,
            offset_ttl: DEFAULT_OFFSET_TTL,
            coordinator: CoordinatorConfig::with_worker_timeout(DEFAULT_OFFSET_TTL),
        }
    }
}

/// Collaborators the stages are built from.
pub struct PipelineDeps {
    pub policies: Arc<dyn PolicyService>,
    pub catalog: Arc<RuleCatalog>,
    pub users: Arc<dyn UserDirectory>,
    pub authorised: PersistenceHandle<AuthorisedRequest>,
    pub offsets: PersistenceHandle<TokenOffset>,
}

/// An in-process pipeline: ingress, policy stage, topic-offset stage and readers.
pub struct Pipeline {
    requests: Arc<InMemoryTopic<DataRequest>>,
    output: Arc<InMemoryTopic<AuthorisedResource>>,
    errors: Arc<InMemoryTopic<AuditErrorEvent>>,
    ingress: Ingress,
    filtered: FilteredResourceStage,
    records: RecordFilter,
    coordinator: Arc<OffsetCoordinator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Wires the stages together and spawns their consumer tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let requests = InMemoryTopic::<DataRequest>::new(REQUEST_TOPIC);
        let output = InMemoryTopic::<AuthorisedResource>::new(OUTPUT_TOPIC);
        let errors = InMemoryTopic::<AuditErrorEvent>::new(ERROR_TOPIC);

        let requests_log: LogHandle<DataRequest> = requests.clone();
        let output_log: LogHandle<AuthorisedResource> = output.clone();
        let errors_log: LogHandle<AuditErrorEvent> = errors.clone();

        let coordinator =
            OffsetCoordinator::new(Arc::clone(&deps.offsets), config.coordinator.clone());

        let ingress = Ingress::new(
            Arc::clone(&requests_log),
            AuditReporter::new("ingress", Arc::clone(&errors_log)),
        );
        let policy_stage = Arc::new(PolicyStage::new(
            deps.policies,
            deps.users,
            Arc::clone(&deps.authorised),
            Arc::clone(&output_log),
            AuditReporter::new("policy-stage", Arc::clone(&errors_log)),
        ));
        let offset_stage = Arc::new(TopicOffsetStage::new(
            deps.offsets,
            Arc::clone(&coordinator),
            config.boundary,
            config.offset_ttl,
            AuditReporter::new("topic-offset-stage", errors_log),
        ));
        let filtered = FilteredResourceStage::new(
            Arc::clone(&coordinator),
            Arc::clone(&output_log),
            config.boundary,
        );
        let records = RecordFilter::new(deps.catalog, deps.authorised);

        let tasks = vec![
            tokio::spawn(policy_stage.run(TopicReader::new(requests_log, 0))),
            tokio::spawn(offset_stage.run(TopicReader::new(output_log, 0))),
        ];
        info!(boundary = ?config.boundary, offset_ttl = ?config.offset_ttl, "pipeline started");

        Self {
            requests,
            output,
            errors,
            ingress,
            filtered,
            records,
            coordinator,
            tasks: Mutex::new(tasks),
        }
    }

    pub async fn register_data_request(
        &self,
        user_id: UserId,
        resource_id: ResourceId,
        context: Context,
    ) -> Result<Token, StageError> {
        self.ingress
            .register_data_request(user_id, resource_id, context)
            .await
    }

    pub async fn authorised_resources(
        &self,
        token: &Token,
    ) -> Result<Vec<AuthorisedResource>, StageError> {
        self.filtered.authorised_resources(token).await
    }

    /// Registers a request and waits for the resources it was granted.
    pub async fn request(
        &self,
        user_id: UserId,
        resource_id: ResourceId,
        context: Context,
    ) -> Result<(Token, Vec<AuthorisedResource>), StageError> {
        let token = self
            .register_data_request(user_id, resource_id, context)
            .await?;
        let resources = self.authorised_resources(&token).await?;
        Ok((token, resources))
    }

    pub fn records(&self) -> &RecordFilter {
        &self.records
    }

    pub fn coordinator(&self) -> &Arc<OffsetCoordinator> {
        &self.coordinator
    }

    pub fn error_topic(&self) -> &Arc<InMemoryTopic<AuditErrorEvent>> {
        &self.errors
    }

    pub fn output_topic(&self) -> &Arc<InMemoryTopic<AuthorisedResource>> {
        &self.output
    }

    /// Audit events published so far for `token`.
    pub fn errors_for(&self, token: &Token) -> Vec<AuditErrorEvent> {
        self.errors
            .read_from(0)
            .into_iter()
            .filter(|committed| committed.envelope.token == *token)
            .filter_map(|committed| committed.envelope.payload().cloned())
            .collect()
    }

    /// Closes the topics in flow order, waits for the stages and cancels pending workers.
    pub async fn shutdown(&self) {
        self.requests.close();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        let mut tasks = tasks.into_iter();
        if let Some(policy) = tasks.next() {
            if let Err(err) = policy.await {
                warn!(%err, "policy stage task failed");
            }
        }
        self.output.close();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(%err, "stage task failed");
            }
        }
        self.errors.close();
        self.coordinator.shutdown();
        info!("pipeline stopped");
    }
}
