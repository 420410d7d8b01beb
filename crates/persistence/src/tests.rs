use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core_types::{Context, ResourceId, Token, TokenOffset, User};
use gatehouse_rule_engine::RecordRules;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::Row;

use crate::entity::{AuthorisedRequest, Entity, Fields};
use crate::errors::PersistenceError;
use crate::layer::PersistenceHandle;
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use crate::ttl::TtlMemoryCache;

fn offset(token: &str, offset: i64) -> TokenOffset {
    TokenOffset::new(Token::from(token), offset)
}

fn authorised(token: &str) -> AuthorisedRequest {
    AuthorisedRequest {
        token: Token::from(token),
        resource_id: ResourceId::new("file:/data/people.csv"),
        user: User::new("alice").with_role("analyst"),
        context: Context::with_purpose("audit"),
        record_rules: Some(RecordRules::new().with_rule("ssn", "mask_field:ssn")),
    }
}

async fn sqlite_store() -> SqliteStore {
    let options = SqliteConnectOptions::from_str(":memory:")
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create test pool");
    SqliteStore::from_pool(pool).await.unwrap()
}

#[test]
fn flat_offset_is_a_decimal_string() {
    let fields = offset("abc-123", 42).to_fields().unwrap();
    assert_eq!(fields.get("token").map(String::as_str), Some("abc-123"));
    assert_eq!(fields.get("offset").map(String::as_str), Some("42"));
    assert_eq!(TokenOffset::from_fields(&fields).unwrap(), offset("abc-123", 42));
}

#[test]
fn malformed_flat_offset_is_a_codec_error() {
    let mut fields = Fields::new();
    fields.insert("token".into(), "abc-123".into());
    fields.insert("offset".into(), "forty-two".into());
    assert!(matches!(
        TokenOffset::from_fields(&fields),
        Err(PersistenceError::Codec(_))
    ));

    fields.remove("offset");
    assert!(matches!(
        TokenOffset::from_fields(&fields),
        Err(PersistenceError::Codec(_))
    ));
}

#[test]
fn authorised_request_key_joins_token_and_resource() {
    assert_eq!(
        authorised("t-1").storage_key(),
        "t-1:file:/data/people.csv"
    );
}

#[tokio::test]
async fn memory_store_keeps_records_until_deleted() {
    let store: PersistenceHandle<TokenOffset> = Arc::new(MemoryStore::new());
    assert_eq!(store.get("abc-123").await.unwrap(), None);

    store
        .put("abc-123", offset("abc-123", 42), Some(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.get("abc-123").await.unwrap(), Some(offset("abc-123", 42)));

    store.delete("abc-123").await.unwrap();
    assert_eq!(store.get("abc-123").await.unwrap(), None);
}

#[tokio::test]
async fn keyspaces_do_not_collide() {
    let backend = MemoryStore::new();
    let offsets: PersistenceHandle<TokenOffset> = Arc::new(backend.clone());
    let requests: PersistenceHandle<AuthorisedRequest> = Arc::new(backend.clone());

    offsets.put("k", offset("k", 1), None).await.unwrap();
    requests.put("k", authorised("k"), None).await.unwrap();

    assert_eq!(backend.len(), 2);
    assert_eq!(offsets.get("k").await.unwrap(), Some(offset("k", 1)));
    assert_eq!(requests.get("k").await.unwrap(), Some(authorised("k")));
}

#[tokio::test]
async fn ttl_cache_expires_after_write_ttl() {
    let store: PersistenceHandle<TokenOffset> =
        Arc::new(TtlMemoryCache::new(Duration::from_secs(60)));

    store
        .put("abc-123", offset("abc-123", 42), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(store.get("abc-123").await.unwrap(), Some(offset("abc-123", 42)));

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(store.get("abc-123").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn ttl_cache_caps_requested_ttl() {
    let cache = TtlMemoryCache::new(Duration::from_secs(5));
    assert_eq!(cache.effective_ttl(None), Duration::from_secs(5));
    assert_eq!(
        cache.effective_ttl(Some(Duration::from_secs(60))),
        Duration::from_secs(5)
    );
    assert_eq!(
        cache.effective_ttl(Some(Duration::from_secs(2))),
        Duration::from_secs(2)
    );

    let store: PersistenceHandle<TokenOffset> = Arc::new(cache.clone());
    store
        .put("long", offset("long", 7), Some(Duration::from_secs(60)))
        .await
        .unwrap();
    store.put("default", offset("default", 8), None).await.unwrap();

    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(store.get("long").await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.get("long").await.unwrap().is_none());
    assert_eq!(cache.purge_expired(), 1);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn ttl_cache_rewrite_restarts_the_clock() {
    let store: PersistenceHandle<TokenOffset> =
        Arc::new(TtlMemoryCache::new(Duration::from_secs(10)));

    store.put("t", offset("t", 1), None).await.unwrap();
    tokio::time::advance(Duration::from_secs(8)).await;
    store.put("t", offset("t", 2), None).await.unwrap();
    tokio::time::advance(Duration::from_secs(8)).await;

    assert_eq!(store.get("t").await.unwrap(), Some(offset("t", 2)));
}

#[tokio::test(start_paused = true)]
async fn ttl_sweeper_frees_entries_nobody_reads_again() {
    let cache = TtlMemoryCache::new(Duration::from_secs(1));
    let store: PersistenceHandle<TokenOffset> = Arc::new(cache.clone());
    for i in 0..1_000 {
        let token = format!("tok-{i}");
        store.put(&token, offset(&token, i), None).await.unwrap();
    }
    assert_eq!(cache.len(), 1_000);

    let sweeper = cache.spawn_sweeper(Duration::from_secs(1));
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(cache.len(), 0);

    drop(store);
    drop(cache);
    tokio::time::timeout(Duration::from_secs(5), sweeper)
        .await
        .expect("sweeper exits once the cache is gone")
        .unwrap();
}

#[tokio::test]
async fn ttl_cache_stores_authorised_requests_as_fields() {
    let store: PersistenceHandle<AuthorisedRequest> =
        Arc::new(TtlMemoryCache::new(Duration::from_secs(60)));
    let request = authorised("tok");
    store
        .put(&request.storage_key(), request.clone(), None)
        .await
        .unwrap();
    assert_eq!(
        store.get(&request.storage_key()).await.unwrap(),
        Some(request)
    );
}

#[tokio::test]
async fn sqlite_store_is_durable_and_structured() {
    let sqlite = sqlite_store().await;
    let store: PersistenceHandle<TokenOffset> = Arc::new(sqlite.clone());

    store
        .put("abc-123", offset("abc-123", 42), Some(Duration::from_millis(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.get("abc-123").await.unwrap(), Some(offset("abc-123", 42)));

    let row = sqlx::query("SELECT document FROM entities WHERE keyspace = ? AND key = ?")
        .bind(TokenOffset::KEYSPACE)
        .bind("abc-123")
        .fetch_one(sqlite.pool())
        .await
        .unwrap();
    let document: String = row.get("document");
    let value: serde_json::Value = serde_json::from_str(&document).unwrap();
    assert_eq!(value["offset"], serde_json::json!(42));

    store
        .put("abc-123", offset("abc-123", 43), None)
        .await
        .unwrap();
    assert_eq!(store.get("abc-123").await.unwrap(), Some(offset("abc-123", 43)));

    store.delete("abc-123").await.unwrap();
    assert_eq!(store.get("abc-123").await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_failure_is_an_error_not_absence() {
    let sqlite = sqlite_store().await;
    sqlite.pool().close().await;
    let store: PersistenceHandle<TokenOffset> = Arc::new(sqlite);
    assert!(store.get("abc-123").await.is_err());
}
