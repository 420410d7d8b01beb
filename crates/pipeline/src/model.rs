use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gatehouse_core_types::{Context, GateError, ResourceId, Token, User, UserId};
use gatehouse_rule_engine::{RecordRules, Resource};
use serde::{Deserialize, Serialize};

/// What a client asked for, as carried on the request topic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataRequest {
    pub user_id: UserId,
    pub resource_id: ResourceId,
    pub context: Context,
}

/// A resource the policy stage let through, with the record rules a reader must apply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorisedResource {
    pub user: User,
    pub context: Context,
    pub resource: Resource,
    pub record_rules: Option<RecordRules>,
}

/// Failure report for one token, published to the error topic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditErrorEvent {
    pub token: Token,
    pub user_id: UserId,
    pub resource_id: ResourceId,
    pub context: Context,
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub server_hostname: String,
    pub attributes: BTreeMap<String, String>,
    pub error: String,
}

impl AuditErrorEvent {
    /// Starts an event for `token` with no request details attached.
    pub fn new(token: Token, service_name: impl Into<String>, error: impl Into<GateError>) -> Self {
        Self {
            token,
            user_id: UserId::default(),
            resource_id: ResourceId::new(""),
            context: Context::default(),
            service_name: service_name.into(),
            timestamp: Utc::now(),
            server_hostname: server_hostname(),
            attributes: BTreeMap::new(),
            error: error.into().to_string(),
        }
    }

    pub fn with_request(mut self, request: &DataRequest) -> Self {
        self.user_id = request.user_id.clone();
        self.resource_id = request.resource_id.clone();
        self.context = request.context.clone();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

fn server_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
