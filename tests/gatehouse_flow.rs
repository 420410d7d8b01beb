use std::fs;
use std::time::Duration;

use gatehouse_cli::{AppConfig, AppError, Gatehouse, StoreProfile};
use gatehouse_core_types::{Context, ResourceId, User, UserId};
use gatehouse_event_bus::StreamMarker;
use gatehouse_rule_engine::Record;
use serial_test::serial;
use tempfile::TempDir;

const POLICIES: &str = r#"
policies:
  - resource_id: "file:/"
    resource_rules:
      rules:
        everyone: "pass_through"
  - resource_id: "file:/hr/"
    resource_rules:
      message: "hr staff"
      rules:
        staff: "require_role:hr"
    record_rules:
      message: "payroll only"
      rules:
        purpose: "require_purpose:payroll"
        bank: "redact_field:bank_account"
"#;

fn config(dir: &TempDir, profile: StoreProfile) -> AppConfig {
    let policies = dir.path().join("policies.yaml");
    fs::write(&policies, POLICIES).unwrap();
    let mut config = AppConfig::default();
    config.persistence.profile = profile;
    config.persistence.offset_ttl = Duration::from_secs(30);
    config.persistence.sqlite_url = format!("sqlite://{}", dir.path().join("gate.db").display());
    config.coordinator.worker_timeout = Some(Duration::from_secs(5));
    config.policies_path = Some(policies);
    config.users = vec![User::new("harriet").with_role("hr")];
    config
}

#[tokio::test]
#[serial]
async fn every_local_profile_serves_requests() {
    for profile in [StoreProfile::Durable, StoreProfile::Ttl, StoreProfile::Sqlite] {
        let dir = TempDir::new().unwrap();
        let gatehouse = Gatehouse::start(config(&dir, profile)).await.unwrap();

        let (token, granted) = gatehouse
            .pipeline
            .request(
                UserId::from("harriet"),
                ResourceId::new("file:/hr/salaries.csv"),
                Context::with_purpose("payroll"),
            )
            .await
            .unwrap();
        assert_eq!(granted.len(), 1, "profile {profile:?}");

        let records = gatehouse
            .pipeline
            .records()
            .filter(
                &token,
                &granted[0].resource.id,
                [Record::new()
                    .with_field("name", "Alice")
                    .with_field("bank_account", "GB00")],
            )
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].contains("bank_account"));

        gatehouse.shutdown().await;
    }
}

#[tokio::test]
#[serial]
async fn end_boundary_reads_the_whole_stream() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StoreProfile::Ttl);
    config.pipeline.boundary = StreamMarker::End;
    let gatehouse = Gatehouse::start(config).await.unwrap();

    let (_, granted) = gatehouse
        .pipeline
        .request(
            UserId::from("harriet"),
            ResourceId::new("file:/public/readme.md"),
            Context::default(),
        )
        .await
        .unwrap();
    assert_eq!(granted.len(), 1);
    gatehouse.shutdown().await;
}

#[tokio::test]
#[serial]
async fn broken_policies_fail_at_start_up() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir, StoreProfile::Durable);
    let broken = dir.path().join("broken.yaml");
    fs::write(
        &broken,
        "policies:\n  - resource_id: \"file:/\"\n    resource_rules:\n      rules:\n        r: \"require_role\"\n",
    )
    .unwrap();
    config.policies_path = Some(broken);

    assert!(matches!(
        Gatehouse::start(config).await,
        Err(AppError::Policy(_))
    ));
}

#[cfg(not(feature = "redis"))]
#[tokio::test]
async fn redis_profile_needs_the_feature() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, StoreProfile::Redis);
    assert!(matches!(
        Gatehouse::start(config).await,
        Err(AppError::Unsupported(_))
    ));
}

#[tokio::test]
async fn only_the_ttl_profile_runs_a_sweeper() {
    let mut settings = gatehouse_cli::config::PersistenceSettings::default();
    settings.profile = StoreProfile::Durable;
    let durable = gatehouse_cli::app::open_stores(&settings).await.unwrap();
    assert!(durable.sweeper.is_none());

    settings.profile = StoreProfile::Ttl;
    settings.offset_ttl = Duration::from_secs(1);
    let ttl = gatehouse_cli::app::open_stores(&settings).await.unwrap();
    let sweeper = ttl.sweeper.expect("ttl profile sweeps expired offsets");
    assert!(!sweeper.is_finished());
    sweeper.abort();
}
