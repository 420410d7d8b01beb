use std::collections::HashMap;

use gatehouse_core_types::{Context, ResourceId, Token, TokenOffset, User};
use gatehouse_rule_engine::RecordRules;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::PersistenceError;

pub type Fields = HashMap<String, String>;

/// A record type that can live in a persistence backend.
///
/// Structured backends store the serde document, flat key/field backends
/// store `to_fields` with every value rendered as a string.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Namespace prefix keeping entity types apart inside one backend.
    const KEYSPACE: &'static str;

    fn to_fields(&self) -> Result<Fields, PersistenceError>;
    fn from_fields(fields: &Fields) -> Result<Self, PersistenceError>;
}

fn field<'a>(fields: &'a Fields, name: &str) -> Result<&'a str, PersistenceError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| PersistenceError::codec(format!("missing field `{name}`")))
}

fn json_field<T: DeserializeOwned>(fields: &Fields, name: &str) -> Result<T, PersistenceError> {
    serde_json::from_str(field(fields, name)?)
        .map_err(|err| PersistenceError::codec(format!("field `{name}`: {err}")))
}

fn json_string<T: Serialize>(value: &T) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|err| PersistenceError::codec(format!("{err}")))
}

impl Entity for TokenOffset {
    const KEYSPACE: &'static str = "TokenOffsetEntity";

    fn to_fields(&self) -> Result<Fields, PersistenceError> {
        let mut fields = Fields::new();
        fields.insert("token".into(), self.token.to_string());
        fields.insert("offset".into(), self.offset.to_string());
        Ok(fields)
    }

    fn from_fields(fields: &Fields) -> Result<Self, PersistenceError> {
        let token = Token::from(field(fields, "token")?);
        let raw = field(fields, "offset")?;
        let offset = raw
            .parse::<i64>()
            .map_err(|err| PersistenceError::codec(format!("offset `{raw}`: {err}")))?;
        Ok(TokenOffset::new(token, offset))
    }
}

/// The decision the policy stage reached for one resource of one request.
///
/// Kept so a data reader can fetch the record rules for `(token, resource)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorisedRequest {
    pub token: Token,
    pub resource_id: ResourceId,
    pub user: User,
    pub context: Context,
    pub record_rules: Option<RecordRules>,
}

impl AuthorisedRequest {
    pub fn key(token: &Token, resource_id: &ResourceId) -> String {
        format!("{token}:{resource_id}")
    }

    pub fn storage_key(&self) -> String {
        Self::key(&self.token, &self.resource_id)
    }
}

impl Entity for AuthorisedRequest {
    const KEYSPACE: &'static str = "AuthorisedRequestEntity";

    fn to_fields(&self) -> Result<Fields, PersistenceError> {
        let mut fields = Fields::new();
        fields.insert("token".into(), self.token.to_string());
        fields.insert("resource_id".into(), self.resource_id.to_string());
        fields.insert("user".into(), json_string(&self.user)?);
        fields.insert("context".into(), json_string(&self.context)?);
        fields.insert("record_rules".into(), json_string(&self.record_rules)?);
        Ok(fields)
    }

    fn from_fields(fields: &Fields) -> Result<Self, PersistenceError> {
        Ok(Self {
            token: Token::from(field(fields, "token")?),
            resource_id: ResourceId::new(field(fields, "resource_id")?),
            user: json_field(fields, "user")?,
            context: json_field(fields, "context")?,
            record_rules: json_field(fields, "record_rules")?,
        })
    }
}
