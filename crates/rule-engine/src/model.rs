use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use gatehouse_core_types::ResourceId;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Message carried by a rule set that declares nothing.
pub const NO_RULES_SET: &str = "no rules set";

/// Insertion-ordered mapping of rule id to rule name.
///
/// Re-inserting an existing id replaces its name but keeps its position, so
/// application order is always the order ids were first declared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleMap {
    entries: Vec<(String, String)>,
}

impl RuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule_id: impl Into<String>, rule_name: impl Into<String>) {
        let rule_id = rule_id.into();
        let rule_name = rule_name.into();
        match self.entries.iter_mut().find(|(id, _)| *id == rule_id) {
            Some(entry) => entry.1 = rule_name,
            None => self.entries.push((rule_id, rule_name)),
        }
    }

    pub fn extend(&mut self, other: &RuleMap) {
        for (rule_id, rule_name) in other.iter() {
            self.insert(rule_id, rule_name);
        }
    }

    pub fn get(&self, rule_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(id, _)| id == rule_id)
            .map(|(_, name)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(id, name)| (id.as_str(), name.as_str()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I, N> FromIterator<(I, N)> for RuleMap
where
    I: Into<String>,
    N: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (I, N)>>(iter: T) -> Self {
        let mut map = RuleMap::new();
        for (rule_id, rule_name) in iter {
            map.insert(rule_id, rule_name);
        }
        map
    }
}

impl Serialize for RuleMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (rule_id, rule_name) in &self.entries {
            map.serialize_entry(rule_id, rule_name)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuleMapVisitor;

        impl<'de> Visitor<'de> for RuleMapVisitor {
            type Value = RuleMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of rule id to rule name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RuleMap, A::Error> {
                let mut map = RuleMap::new();
                while let Some((rule_id, rule_name)) = access.next_entry::<String, String>()? {
                    map.insert(rule_id, rule_name);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(RuleMapVisitor)
    }
}

/// Distinguishes rule sets applied to resources from those applied to records.
pub trait RuleKind: Send + Sync + 'static {
    type Item: Send + Sync + 'static;
    const LABEL: &'static str;
}

#[derive(Clone, Copy, Debug)]
pub struct ResourceKind;

impl RuleKind for ResourceKind {
    type Item = Resource;
    const LABEL: &'static str = "resource";
}

#[derive(Clone, Copy, Debug)]
pub struct RecordKind;

impl RuleKind for RecordKind {
    type Item = Record;
    const LABEL: &'static str = "record";
}

/// Named, ordered set of rule references plus a message describing it.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RuleSet<K: RuleKind> {
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub rules: RuleMap,
    #[serde(skip)]
    kind: PhantomData<fn() -> K>,
}

pub type ResourceRules = RuleSet<ResourceKind>;
pub type RecordRules = RuleSet<RecordKind>;

fn default_message() -> String {
    NO_RULES_SET.to_string()
}

impl<K: RuleKind> RuleSet<K> {
    pub fn new() -> Self {
        Self {
            message: default_message(),
            rules: RuleMap::new(),
            kind: PhantomData,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>, rule_name: impl Into<String>) -> Self {
        self.rules.insert(rule_id, rule_name);
        self
    }

    pub fn add_rules(&mut self, rules: &RuleMap) -> &mut Self {
        self.rules.extend(rules);
        self
    }

    pub fn has_message(&self) -> bool {
        !self.message.is_empty() && self.message != NO_RULES_SET
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<K: RuleKind> Default for RuleSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RuleKind> Clone for RuleSet<K> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            rules: self.rules.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: RuleKind> PartialEq for RuleSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message && self.rules == other.rules
    }
}

impl<K: RuleKind> Eq for RuleSet<K> {}

impl<K: RuleKind> fmt::Debug for RuleSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("kind", &K::LABEL)
            .field("message", &self.message)
            .field("rules", &self.rules)
            .finish()
    }
}

/// A leaf resource (file, table, stream) a client asks to read.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub serialised_format: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(id),
            resource_type: String::new(),
            serialised_format: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.serialised_format = format.into();
        self
    }
}

/// A single data record read from a resource, as named fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl TryFrom<Value> for Record {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            other => Err(format!("expected a JSON object record, got {other}")),
        }
    }
}
