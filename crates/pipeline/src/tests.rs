use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core_types::{Context, ResourceId, Token, TokenOffset, User, UserId};
use gatehouse_event_bus::{
    Committed, Envelope, EventLog, Frame, InMemoryTopic, LogHandle, StreamMarker,
};
use gatehouse_offset_coordinator::{CoordinatorConfig, OffsetCoordinator};
use gatehouse_persistence::{
    AuthorisedRequest, MemoryStore, PersistenceError, PersistenceHandle, PersistenceLayer,
};
use gatehouse_rule_engine::{
    InMemoryPolicyService, PolicyService, Record, RecordRules, ResourceRules, RuleCatalog,
};

use crate::audit::AuditReporter;
use crate::error::StageError;
use crate::filtered::{FilteredResourceStage, RecordFilter};
use crate::ingress::Ingress;
use crate::model::{AuditErrorEvent, AuthorisedResource, DataRequest};
use crate::offset_stage::TopicOffsetStage;
use crate::policy_stage::PolicyStage;
use crate::users::{InMemoryUserDirectory, UserDirectory};

fn errors_topic() -> (Arc<InMemoryTopic<AuditErrorEvent>>, AuditReporter) {
    let topic = InMemoryTopic::<AuditErrorEvent>::new("errors");
    let log: LogHandle<AuditErrorEvent> = topic.clone();
    (topic, AuditReporter::new("test-service", log))
}

fn audit_events(topic: &InMemoryTopic<AuditErrorEvent>) -> Vec<AuditErrorEvent> {
    topic
        .read_from(0)
        .into_iter()
        .filter_map(|committed| committed.envelope.payload().cloned())
        .collect()
}

fn policies() -> Arc<InMemoryPolicyService> {
    let service = InMemoryPolicyService::new(Arc::new(RuleCatalog::with_builtins()));
    service
        .set_resource_rules(
            ResourceId::new("file:/hr/"),
            ResourceRules::new().with_message("hr only").with_rule("staff", "require_role:hr"),
        )
        .unwrap();
    service
        .set_record_rules(
            ResourceId::new("file:/hr/"),
            RecordRules::new().with_message("hide ssn").with_rule("ssn", "mask_field:ssn"),
        )
        .unwrap();
    Arc::new(service)
}

struct PolicyFixture {
    stage: PolicyStage,
    output: Arc<InMemoryTopic<AuthorisedResource>>,
    errors: Arc<InMemoryTopic<AuditErrorEvent>>,
    authorised: Arc<MemoryStore>,
}

fn policy_fixture() -> PolicyFixture {
    let output = InMemoryTopic::<AuthorisedResource>::new("output");
    let output_log: LogHandle<AuthorisedResource> = output.clone();
    let (errors, audit) = errors_topic();
    let authorised = Arc::new(MemoryStore::new());
    let users = InMemoryUserDirectory::from_users([User::new("harriet").with_role("hr")]);
    let store: PersistenceHandle<AuthorisedRequest> = authorised.clone();
    let stage = PolicyStage::new(policies(), Arc::new(users), store, output_log, audit);
    PolicyFixture {
        stage,
        output,
        errors,
        authorised,
    }
}

fn request(user: &str, resource: &str) -> DataRequest {
    DataRequest {
        user_id: UserId::from(user),
        resource_id: ResourceId::new(resource),
        context: Context::with_purpose("payroll"),
    }
}

async fn feed(stage: &PolicyStage, token: &Token, request: DataRequest) {
    for envelope in [
        Envelope::start(token.clone()),
        Envelope::message(token.clone(), request),
        Envelope::end(token.clone()),
    ] {
        stage.handle(envelope).await.unwrap();
    }
}

#[tokio::test]
async fn ingress_brackets_the_request_under_a_fresh_token() {
    let requests = InMemoryTopic::<DataRequest>::new("requests");
    let (errors, audit) = errors_topic();
    let ingress = Ingress::new(requests.clone(), audit);

    let first = ingress
        .register_data_request(
            UserId::from("alice"),
            ResourceId::new("file:/hr/salaries.csv"),
            Context::with_purpose("payroll"),
        )
        .await
        .unwrap();
    let second = ingress
        .register_data_request(
            UserId::from("alice"),
            ResourceId::new("file:/hr/salaries.csv"),
            Context::default(),
        )
        .await
        .unwrap();
    assert_ne!(first, second);

    let entries = requests.read_from(0);
    assert_eq!(entries.len(), 6);
    assert!(entries[..3].iter().all(|c| c.envelope.token == first));
    assert_eq!(entries[0].envelope.marker(), Some(StreamMarker::Start));
    let payload = entries[1].envelope.payload().unwrap();
    assert_eq!(payload.resource_id.as_str(), "file:/hr/salaries.csv");
    assert_eq!(payload.context.purpose(), Some("payroll"));
    assert_eq!(entries[2].envelope.marker(), Some(StreamMarker::End));
    assert!(errors.is_empty());
}

#[tokio::test]
async fn ingress_failures_are_audited() {
    let requests = InMemoryTopic::<DataRequest>::new("requests");
    let (errors, audit) = errors_topic();
    let ingress = Ingress::new(requests.clone(), audit);

    let err = ingress
        .register_data_request(
            UserId::from(""),
            ResourceId::new("file:/a"),
            Context::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::InvalidRequest(_)));
    assert!(requests.is_empty());

    requests.close();
    let err = ingress
        .register_data_request(
            UserId::from("alice"),
            ResourceId::new("file:/a"),
            Context::with_purpose("audit"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Bus(_)));

    let events = audit_events(&errors);
    assert_eq!(events.len(), 2);
    let closed = &events[1];
    assert_eq!(closed.service_name, "test-service");
    assert_eq!(closed.user_id, UserId::from("alice"));
    assert_eq!(closed.resource_id.as_str(), "file:/a");
    assert_eq!(closed.context.purpose(), Some("audit"));
    assert!(closed.error.contains("closed"));
    assert!(!closed.server_hostname.is_empty());
}

#[tokio::test]
async fn authorised_resources_are_persisted_and_forwarded() {
    let fixture = policy_fixture();
    let token = Token::from("tok-1");
    feed(&fixture.stage, &token, request("harriet", "file:/hr/salaries.csv")).await;

    let entries = fixture.output.read_from(0);
    assert_eq!(entries.len(), 3);
    let forwarded = entries[1].envelope.payload().unwrap();
    assert_eq!(forwarded.resource.id.as_str(), "file:/hr/salaries.csv");
    assert!(forwarded.user.has_role("hr"));
    assert_eq!(forwarded.record_rules.as_ref().unwrap().message, "hide ssn");

    let key = AuthorisedRequest::key(&token, &ResourceId::new("file:/hr/salaries.csv"));
    let store: PersistenceHandle<AuthorisedRequest> = fixture.authorised.clone();
    let stored = store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.token, token);
    assert_eq!(stored.context.purpose(), Some("payroll"));
    assert!(stored.record_rules.is_some());
    assert!(fixture.errors.is_empty());
}

#[tokio::test]
async fn denied_resources_leave_an_empty_bracketed_stream() {
    let fixture = policy_fixture();
    let token = Token::from("tok-2");
    feed(&fixture.stage, &token, request("mallory", "file:/hr/salaries.csv")).await;

    let markers: Vec<_> = fixture
        .output
        .read_from(0)
        .iter()
        .map(|c| c.envelope.marker())
        .collect();
    assert_eq!(markers, vec![Some(StreamMarker::Start), Some(StreamMarker::End)]);
    assert!(fixture.authorised.is_empty());
    assert!(fixture.errors.is_empty());
}

#[tokio::test]
async fn missing_policy_is_reported_for_the_request() {
    let fixture = policy_fixture();
    let token = Token::from("tok-3");
    feed(&fixture.stage, &token, request("harriet", "s3:/bucket/key")).await;

    assert_eq!(fixture.output.len(), 2);
    let events = audit_events(&fixture.errors);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].token, token);
    assert_eq!(events[0].resource_id.as_str(), "s3:/bucket/key");
    assert!(events[0].error.contains("no policy"));
}

#[tokio::test]
async fn closed_output_stops_the_stage() {
    let fixture = policy_fixture();
    fixture.output.close();
    let err = fixture
        .stage
        .handle(Envelope::start(Token::from("tok-4")))
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Bus(_)));
}

fn committed(offset: i64, envelope: Envelope<AuthorisedResource>) -> Committed<AuthorisedResource> {
    Committed { offset, envelope }
}

#[tokio::test]
async fn offset_stage_records_only_the_boundary_marker() {
    let offsets: PersistenceHandle<TokenOffset> = Arc::new(MemoryStore::new());
    let coordinator = OffsetCoordinator::new(Arc::clone(&offsets), CoordinatorConfig::default());
    let (_errors, audit) = errors_topic();
    let stage = TopicOffsetStage::new(
        Arc::clone(&offsets),
        Arc::clone(&coordinator),
        StreamMarker::Start,
        Duration::from_secs(60),
        audit,
    );

    let token = Token::from("tok-5");
    let waiting = coordinator.request_offset(token.clone());

    let recorded = stage
        .handle(&committed(7, Envelope::start(token.clone())))
        .await
        .unwrap();
    assert_eq!(recorded, Some(TokenOffset::new(token.clone(), 7)));
    assert_eq!(
        stage
            .handle(&committed(8, Envelope::end(token.clone())))
            .await
            .unwrap(),
        None
    );

    assert_eq!(waiting.recv().await.unwrap(), TokenOffset::new(token.clone(), 7));
    let stored = offsets.get(token.as_str()).await.unwrap();
    assert_eq!(stored.map(|o| o.offset), Some(7));
}

struct BrokenStore;

#[async_trait]
impl PersistenceLayer<TokenOffset> for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<TokenOffset>, PersistenceError> {
        Ok(None)
    }

    async fn put(
        &self,
        _key: &str,
        _record: TokenOffset,
        _ttl: Option<Duration>,
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::unavailable("store offline"))
    }

    async fn delete(&self, _key: &str) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[tokio::test]
async fn offset_write_failures_do_not_push() {
    let offsets: PersistenceHandle<TokenOffset> = Arc::new(BrokenStore);
    let coordinator = OffsetCoordinator::new(Arc::clone(&offsets), CoordinatorConfig::default());
    let (_errors, audit) = errors_topic();
    let stage = TopicOffsetStage::new(
        offsets,
        Arc::clone(&coordinator),
        StreamMarker::Start,
        Duration::from_secs(60),
        audit,
    );
    let token = Token::from("tok-6");
    let _waiting = coordinator.request_offset(token.clone());

    let err = stage
        .handle(&committed(0, Envelope::start(token.clone())))
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Persistence(_)));
    assert!(coordinator.has_worker(&token));
}

fn resource(id: &str) -> AuthorisedResource {
    AuthorisedResource {
        user: User::new("harriet"),
        context: Context::default(),
        resource: gatehouse_rule_engine::Resource::new(id),
        record_rules: None,
    }
}

#[tokio::test]
async fn filtered_stage_reads_only_its_token_between_markers() {
    for boundary in [StreamMarker::Start, StreamMarker::End] {
        let output = InMemoryTopic::<AuthorisedResource>::new("output");
        let log: LogHandle<AuthorisedResource> = output.clone();
        let offsets: PersistenceHandle<TokenOffset> = Arc::new(MemoryStore::new());
        let coordinator =
            OffsetCoordinator::new(Arc::clone(&offsets), CoordinatorConfig::default());
        let stage = FilteredResourceStage::new(Arc::clone(&coordinator), log, boundary);

        let mine = Token::from("mine");
        let other = Token::from("other");
        let publish = [
            Envelope::start(other.clone()),
            Envelope::start(mine.clone()),
            Envelope::message(other.clone(), resource("file:/other")),
            Envelope::message(mine.clone(), resource("file:/a")),
            Envelope::message(mine.clone(), resource("file:/b")),
            Envelope::end(mine.clone()),
            Envelope::end(other.clone()),
        ];
        for envelope in publish {
            output.publish(envelope).await.unwrap();
        }
        let boundary_offset = match boundary {
            StreamMarker::Start => 1,
            StreamMarker::End => 5,
        };
        offsets
            .put(mine.as_str(), TokenOffset::new(mine.clone(), boundary_offset), None)
            .await
            .unwrap();

        let resources = stage.authorised_resources(&mine).await.unwrap();
        let ids: Vec<_> = resources.iter().map(|r| r.resource.id.as_str()).collect();
        assert_eq!(ids, vec!["file:/a", "file:/b"], "boundary {boundary:?}");
    }
}

#[tokio::test]
async fn record_filter_applies_the_stored_rules() {
    let fixture = policy_fixture();
    let token = Token::from("tok-7");
    feed(&fixture.stage, &token, request("harriet", "file:/hr/salaries.csv")).await;

    let authorised: PersistenceHandle<AuthorisedRequest> = fixture.authorised.clone();
    let filter = RecordFilter::new(Arc::new(RuleCatalog::with_builtins()), authorised);
    let records = vec![
        Record::new().with_field("name", "Alice").with_field("ssn", "123"),
        Record::new().with_field("name", "Bob").with_field("ssn", "456"),
    ];
    let filtered = filter
        .filter(&token, &ResourceId::new("file:/hr/salaries.csv"), records)
        .await
        .unwrap();
    assert_eq!(filtered.len(), 2);
    assert!(filtered
        .iter()
        .all(|r| r.get("ssn") == Some(&serde_json::Value::Null)));

    let unknown = filter
        .filter(&Token::from("nope"), &ResourceId::new("file:/hr/salaries.csv"), Vec::new())
        .await;
    assert!(matches!(unknown, Err(StageError::InvalidRequest(_))));
}

#[test]
fn unknown_users_resolve_without_roles() {
    let directory = InMemoryUserDirectory::new();
    assert!(directory.is_empty());
    directory.add_user(User::new("harriet").with_role("hr"));
    assert_eq!(directory.len(), 1);

    assert!(directory.resolve(&UserId::from("harriet")).has_role("hr"));
    let stranger = directory.resolve(&UserId::from("stranger"));
    assert_eq!(stranger.user_id, UserId::from("stranger"));
    assert!(stranger.roles.is_empty());
}

#[test]
fn audit_events_carry_request_details() {
    let event = AuditErrorEvent::new(
        Token::from("tok-8"),
        "policy-stage",
        StageError::InvalidRequest("bad".into()),
    )
    .with_request(&request("alice", "file:/x"))
    .with_attribute("attempt", "1");

    assert_eq!(event.user_id, UserId::from("alice"));
    assert_eq!(event.resource_id.as_str(), "file:/x");
    assert_eq!(event.attributes.get("attempt").map(String::as_str), Some("1"));
    assert_eq!(event.error, "invalid request: bad");
    assert!(matches!(
        Envelope::message(event.token.clone(), event).frame,
        Frame::Message(_)
    ));
}
