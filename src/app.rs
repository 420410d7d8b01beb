use std::sync::Arc;

use gatehouse_core_types::TokenOffset;
use gatehouse_persistence::{
    AuthorisedRequest, MemoryStore, PersistenceHandle, SqliteStore, TtlMemoryCache,
};
use gatehouse_pipeline::{InMemoryUserDirectory, Pipeline, PipelineDeps};
use gatehouse_rule_engine::{
    load_policies, InMemoryPolicyService, PolicyDocument, PolicyService, RuleCatalog,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{AppConfig, PersistenceSettings, StoreProfile};
use crate::errors::AppError;

/// The key spaces the pipeline persists into.
pub struct Stores {
    pub authorised: PersistenceHandle<AuthorisedRequest>,
    pub offsets: PersistenceHandle<TokenOffset>,
    /// Purges expired offsets for the ttl profile.
    pub sweeper: Option<JoinHandle<()>>,
}

pub async fn open_stores(settings: &PersistenceSettings) -> Result<Stores, AppError> {
    let stores = match settings.profile {
        StoreProfile::Durable => {
            let store = Arc::new(MemoryStore::new());
            Stores {
                authorised: store.clone(),
                offsets: store,
                sweeper: None,
            }
        }
        StoreProfile::Ttl => {
            let cache = TtlMemoryCache::new(settings.offset_ttl);
            let sweeper = cache.spawn_sweeper(settings.offset_ttl);
            Stores {
                authorised: Arc::new(MemoryStore::new()),
                offsets: Arc::new(cache),
                sweeper: Some(sweeper),
            }
        }
        StoreProfile::Sqlite => {
            let store = Arc::new(SqliteStore::connect(&settings.sqlite_url).await?);
            Stores {
                authorised: store.clone(),
                offsets: store,
                sweeper: None,
            }
        }
        StoreProfile::Redis => open_redis(settings).await?,
    };
    info!(profile = ?settings.profile, "persistence opened");
    Ok(stores)
}

#[cfg(feature = "redis")]
async fn open_redis(settings: &PersistenceSettings) -> Result<Stores, AppError> {
    let store = Arc::new(
        gatehouse_persistence::RedisStore::connect(&settings.redis_url, settings.offset_ttl)
            .await?,
    );
    Ok(Stores {
        authorised: store.clone(),
        offsets: store,
        sweeper: None,
    })
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_settings: &PersistenceSettings) -> Result<Stores, AppError> {
    Err(AppError::Unsupported(
        "the redis profile requires building with the `redis` feature".to_string(),
    ))
}

/// Compiles the configured policy document against the built-in rules.
pub fn load_policy_service(
    config: &AppConfig,
) -> Result<(Arc<RuleCatalog>, InMemoryPolicyService, PolicyDocument), AppError> {
    let catalog = Arc::new(RuleCatalog::with_builtins());
    let document = load_policies(config.policies_path.as_deref())?;
    let service = InMemoryPolicyService::prepopulate(Arc::clone(&catalog), &document)?;
    Ok((catalog, service, document))
}

/// A running in-process deployment.
pub struct Gatehouse {
    pub pipeline: Pipeline,
    pub policies: Arc<dyn PolicyService>,
    pub config: AppConfig,
    sweeper: Option<JoinHandle<()>>,
}

impl Gatehouse {
    pub async fn start(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        let (catalog, service, document) = load_policy_service(&config)?;
        let stores = open_stores(&config.persistence).await?;
        let policies: Arc<dyn PolicyService> = Arc::new(service);
        let users = InMemoryUserDirectory::from_users(config.users.iter().cloned());

        let deps = PipelineDeps {
            policies: Arc::clone(&policies),
            catalog,
            users: Arc::new(users),
            authorised: stores.authorised,
            offsets: stores.offsets,
        };
        let pipeline = Pipeline::start(deps, config.pipeline_config());
        info!(policies = document.len(), users = config.users.len(), "gatehouse started");
        Ok(Self {
            pipeline,
            policies,
            config,
            sweeper: stores.sweeper,
        })
    }

    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
        if let Some(sweeper) = &self.sweeper {
            sweeper.abort();
        }
    }
}
