use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::builtin::{DenyAllRule, MaskField, PassThroughRule, RedactField, RequirePurpose, RequireRole};
use crate::errors::RuleError;
use crate::model::{Record, RecordKind, Resource, ResourceKind, RuleKind, RuleSet};
use crate::rule::Rule;

/// Builds a rule instance from the optional argument after `name:`.
pub type RuleFactory<T> =
    Arc<dyn Fn(Option<&str>) -> Result<Arc<dyn Rule<T>>, RuleError> + Send + Sync>;

/// Explicit mapping of rule names to constructors.
pub struct RuleRegistry<T> {
    factories: HashMap<String, RuleFactory<T>>,
}

impl<T> Default for RuleRegistry<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T> fmt::Debug for RuleRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RuleRegistry").field("names", &names).finish()
    }
}

impl<T: Send + Sync + 'static> RuleRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Option<&str>) -> Result<Arc<dyn Rule<T>>, RuleError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registers a rule that takes no argument and is shared across every use.
    pub fn register_instance<R>(&mut self, name: impl Into<String>, rule: R) -> &mut Self
    where
        R: Rule<T> + 'static,
    {
        let name = name.into();
        let shared: Arc<dyn Rule<T>> = Arc::new(rule);
        let label = name.clone();
        self.register(name, move |arg| match arg {
            None => Ok(Arc::clone(&shared)),
            Some(_) => Err(RuleError::InvalidRule(format!(
                "rule `{label}` takes no argument"
            ))),
        })
    }

    /// Registers a rule constructed from a mandatory `name:argument` value.
    pub fn register_with_arg<F>(&mut self, name: impl Into<String>, build: F) -> &mut Self
    where
        F: Fn(&str) -> Arc<dyn Rule<T>> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        self.register(name, move |arg| match arg {
            Some(value) if !value.is_empty() => Ok(build(value)),
            _ => Err(RuleError::InvalidRule(format!(
                "rule `{label}` requires an argument (`{label}:<value>`)"
            ))),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        let (base, _) = split_name(name);
        self.factories.contains_key(base)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Rule<T>>, RuleError> {
        let (base, arg) = split_name(name);
        let factory = self
            .factories
            .get(base)
            .ok_or_else(|| RuleError::UnknownRule(name.to_string()))?;
        factory(arg)
    }

    /// Resolves every rule name of `set` up front, preserving declaration order.
    pub fn compile<K>(&self, set: &RuleSet<K>) -> Result<CompiledRules<T>, RuleError>
    where
        K: RuleKind<Item = T>,
    {
        let mut rules = Vec::with_capacity(set.rules.len());
        for (rule_id, rule_name) in set.rules.iter() {
            let rule = self.resolve(rule_name).map_err(|err| match err {
                RuleError::UnknownRule(name) => {
                    RuleError::UnknownRule(format!("{name} (rule id `{rule_id}`)"))
                }
                other => other,
            })?;
            rules.push((rule_id.to_string(), rule));
        }
        Ok(CompiledRules {
            message: set.message.clone(),
            rules,
        })
    }
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once(':') {
        Some((base, arg)) => (base.trim(), Some(arg.trim())),
        None => (name.trim(), None),
    }
}

/// A rule set whose names have all been resolved to instances.
pub struct CompiledRules<T> {
    pub message: String,
    rules: Vec<(String, Arc<dyn Rule<T>>)>,
}

impl<T> CompiledRules<T> {
    pub fn empty() -> Self {
        Self {
            message: crate::model::NO_RULES_SET.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn from_rules(
        message: impl Into<String>,
        rules: Vec<(String, Arc<dyn Rule<T>>)>,
    ) -> Self {
        Self {
            message: message.into(),
            rules,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Rule<T>>)> {
        self.rules.iter().map(|(id, rule)| (id.as_str(), rule))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T> Clone for CompiledRules<T> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<T> fmt::Debug for CompiledRules<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRules")
            .field("message", &self.message)
            .field("rules", &self.ids())
            .finish()
    }
}

/// Registries for both rule kinds, built once at start-up and passed down.
#[derive(Debug, Default)]
pub struct RuleCatalog {
    pub resource: RuleRegistry<Resource>,
    pub record: RuleRegistry<Record>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        catalog
            .resource
            .register_instance("pass_through", PassThroughRule)
            .register_instance("deny_all", DenyAllRule)
            .register_with_arg("require_role", |role| Arc::new(RequireRole::new(role)))
            .register_with_arg("require_purpose", |purpose| {
                Arc::new(RequirePurpose::new(purpose))
            });

        catalog
            .record
            .register_instance("pass_through", PassThroughRule)
            .register_instance("deny_all", DenyAllRule)
            .register_with_arg("require_role", |role| Arc::new(RequireRole::new(role)))
            .register_with_arg("require_purpose", |purpose| {
                Arc::new(RequirePurpose::new(purpose))
            })
            .register_with_arg("mask_field", |field| Arc::new(MaskField::new(field)))
            .register_with_arg("redact_field", |field| Arc::new(RedactField::new(field)));

        catalog
    }

    pub fn compile_resource(
        &self,
        set: &RuleSet<ResourceKind>,
    ) -> Result<CompiledRules<Resource>, RuleError> {
        self.resource.compile(set)
    }

    pub fn compile_record(
        &self,
        set: &RuleSet<RecordKind>,
    ) -> Result<CompiledRules<Record>, RuleError> {
        self.record.compile(set)
    }
}
