//! Application configuration.
//!
//! Sources are layered in order: built-in defaults, an optional YAML file,
//! then `GATEHOUSE__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use gatehouse_core_types::User;
use gatehouse_event_bus::StreamMarker;
use gatehouse_offset_coordinator::CoordinatorConfig;
use gatehouse_pipeline::{PipelineConfig, DEFAULT_OFFSET_TTL};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;

pub const ENV_PREFIX: &str = "GATEHOUSE";
pub const ENV_SEPARATOR: &str = "__";
pub const DEFAULT_CONFIG_PATH: &str = "config/gatehouse.yaml";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreProfile {
    /// In-memory for everything; offsets never expire.
    Durable,
    /// In-memory, offsets expire after `offset_ttl`.
    #[default]
    Ttl,
    Sqlite,
    Redis,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub profile: StoreProfile,
    #[serde(with = "duration_format")]
    pub offset_ttl: Duration,
    pub sqlite_url: String,
    pub redis_url: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            profile: StoreProfile::default(),
            offset_ttl: DEFAULT_OFFSET_TTL,
            sqlite_url: "sqlite://gatehouse.db".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Falls back to the offset TTL when unset.
    #[serde(with = "optional_duration_format")]
    pub worker_timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub boundary: StreamMarker,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub persistence: PersistenceSettings,
    pub coordinator: CoordinatorSettings,
    pub pipeline: PipelineSettings,
    pub policies_path: Option<PathBuf>,
    pub users: Vec<User>,
}

impl AppConfig {
    pub fn worker_timeout(&self) -> Duration {
        self.coordinator
            .worker_timeout
            .unwrap_or(self.persistence.offset_ttl)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            boundary: self.pipeline.boundary,
            offset_ttl: self.persistence.offset_ttl,
            coordinator: CoordinatorConfig::with_worker_timeout(self.worker_timeout()),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.persistence.offset_ttl.is_zero() {
            return Err(AppError::invalid("persistence.offset_ttl must be positive"));
        }
        if self.worker_timeout().is_zero() {
            return Err(AppError::invalid("coordinator.worker_timeout must be positive"));
        }
        match self.persistence.profile {
            StoreProfile::Sqlite if self.persistence.sqlite_url.trim().is_empty() => {
                Err(AppError::invalid("persistence.sqlite_url is required for the sqlite profile"))
            }
            StoreProfile::Redis if self.persistence.redis_url.trim().is_empty() => {
                Err(AppError::invalid("persistence.redis_url is required for the redis profile"))
            }
            _ => Ok(()),
        }
    }
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// The file that was read, if any.
    pub path: Option<PathBuf>,
}

/// Loads the configuration from `path`, or from [`DEFAULT_CONFIG_PATH`] when it exists.
///
/// An explicitly given path must exist.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, AppError> {
    let chosen = match path {
        Some(path) if !path.exists() => {
            return Err(AppError::MissingConfig(path.to_path_buf()));
        }
        Some(path) => Some(path.to_path_buf()),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_PATH);
            if local.exists() {
                Some(local)
            } else {
                warn!("config file not found, using defaults: {}", DEFAULT_CONFIG_PATH);
                None
            }
        }
    };

    let mut builder = Config::builder();
    if let Some(path) = &chosen {
        builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Yaml));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    if let Some(path) = &chosen {
        info!("Loaded configuration from: {}", path.display());
    }
    Ok(LoadedConfig {
        config,
        path: chosen,
    })
}

mod duration_format {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

mod optional_duration_format {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::duration_format::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => humantime::parse_duration(raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
