use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Shared error type that crosses crate boundaries inside the pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("{message}")]
    Message { message: String },
}

impl GateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Correlation token tying every message of one client request together.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Token(pub String);

impl Token {
    /// Mints a fresh token for a new client request.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a resource in the hierarchy, e.g. `file:/data/dir/file.csv`.
///
/// The optional `scheme:` prefix is kept on every ancestor; path segments are
/// separated by `/`.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the chain of ids from the hierarchy root down to (and including) this id.
    ///
    /// `file:/data/dir/file.csv` yields `file:/`, `file:/data/`, `file:/data/dir/`,
    /// `file:/data/dir/file.csv`. Directory ids carry a trailing `/`.
    ///
    /// The last element is always this exact id, so ids with repeated `/`
    /// (`file:///x`, `hdfs://nn/x`) still match rules stored under them.
    pub fn ancestors(&self) -> Vec<ResourceId> {
        let (scheme, path) = match self.0.split_once(':') {
            Some((scheme, rest)) if !scheme.contains('/') => (format!("{scheme}:"), rest),
            _ => (String::new(), self.0.as_str()),
        };
        let absolute = path.starts_with('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let mut chain = Vec::with_capacity(segments.len() + 1);
        let mut current = scheme.clone();
        if absolute {
            current.push('/');
            chain.push(ResourceId(current.clone()));
        }
        for (idx, segment) in segments.iter().enumerate() {
            current.push_str(segment);
            let is_leaf = idx + 1 == segments.len();
            if is_leaf && !path.ends_with('/') {
                chain.push(ResourceId(current.clone()));
            } else {
                current.push('/');
                chain.push(ResourceId(current.clone()));
            }
        }
        if chain.last() != Some(self) {
            chain.push(self.clone());
        }
        chain
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity of the requesting user. Passed through every rule unmodified.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct User {
    pub user_id: UserId,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub roles: BTreeSet<String>,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub auths: BTreeSet<String>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Request context supplied by the client, e.g. the declared purpose.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Context(pub BTreeMap<String, String>);

impl Context {
    pub const PURPOSE: &'static str = "purpose";

    pub fn with_purpose(purpose: impl Into<String>) -> Self {
        let mut contents = BTreeMap::new();
        contents.insert(Self::PURPOSE.to_string(), purpose.into());
        Self(contents)
    }

    pub fn purpose(&self) -> Option<&str> {
        self.get(Self::PURPOSE)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

/// Pairing of a token with the log offset at which its result stream is readable.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TokenOffset {
    pub token: Token,
    pub offset: i64,
}

impl TokenOffset {
    pub fn new(token: Token, offset: i64) -> Self {
        Self { token, offset }
    }
}

impl fmt::Display for TokenOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token={} offset={}", self.token, self.offset)
    }
}
