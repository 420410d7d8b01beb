use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use gatehouse_core_types::ResourceId;
use tracing::{debug, info};

use crate::apply::merge_hierarchy;
use crate::errors::RuleError;
use crate::loader::PolicyDocument;
use crate::model::{Record, RecordRules, Resource, ResourceRules, RuleKind, RuleSet};
use crate::registry::{CompiledRules, RuleCatalog, RuleRegistry};

/// Lookup and mutation of the rules attached to the resource hierarchy.
///
/// Lookups fold every ancestor's rules root first; `None` means no node on
/// the path declares any rules of that kind.
pub trait PolicyService: Send + Sync {
    fn get_resource_rules(&self, resource_id: &ResourceId) -> Option<ResourceRules>;
    fn get_record_rules(&self, resource_id: &ResourceId) -> Option<RecordRules>;
    fn set_resource_rules(
        &self,
        resource_id: ResourceId,
        rules: ResourceRules,
    ) -> Result<(), RuleError>;
    fn set_record_rules(&self, resource_id: ResourceId, rules: RecordRules)
        -> Result<(), RuleError>;
    fn compiled_resource_rules(
        &self,
        resource_id: &ResourceId,
    ) -> Result<CompiledRules<Resource>, RuleError>;
    fn compiled_record_rules(
        &self,
        resource_id: &ResourceId,
    ) -> Result<CompiledRules<Record>, RuleError>;
}

#[derive(Clone, Debug, Default)]
struct PolicyTable {
    resource: HashMap<ResourceId, ResourceRules>,
    record: HashMap<ResourceId, RecordRules>,
}

pub struct InMemoryPolicyService {
    catalog: Arc<RuleCatalog>,
    table: ArcSwap<PolicyTable>,
}

impl InMemoryPolicyService {
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        Self {
            catalog,
            table: ArcSwap::from_pointee(PolicyTable::default()),
        }
    }

    /// Builds a service from a loaded document, compiling every rule first.
    ///
    /// A later entry for the same resource id replaces an earlier one.
    pub fn prepopulate(
        catalog: Arc<RuleCatalog>,
        document: &PolicyDocument,
    ) -> Result<Self, RuleError> {
        let mut table = PolicyTable::default();
        for entry in &document.policies {
            if let Some(rules) = &entry.resource_rules {
                catalog.compile_resource(rules)?;
                table
                    .resource
                    .insert(entry.resource_id.clone(), rules.clone());
            }
            if let Some(rules) = &entry.record_rules {
                catalog.compile_record(rules)?;
                table.record.insert(entry.resource_id.clone(), rules.clone());
            }
        }
        info!(
            resource_policies = table.resource.len(),
            record_policies = table.record.len(),
            "prepopulated policy service"
        );
        Ok(Self {
            catalog,
            table: ArcSwap::from_pointee(table),
        })
    }

    pub fn catalog(&self) -> &Arc<RuleCatalog> {
        &self.catalog
    }

    fn lookup<K, F>(&self, resource_id: &ResourceId, select: F) -> Option<RuleSet<K>>
    where
        K: RuleKind,
        F: Fn(&PolicyTable) -> &HashMap<ResourceId, RuleSet<K>>,
    {
        let table = self.table.load();
        let nodes = select(&**table);
        let chain: Vec<&RuleSet<K>> = resource_id
            .ancestors()
            .iter()
            .filter_map(|ancestor| nodes.get(ancestor))
            .collect();
        let merged = merge_hierarchy(chain);
        debug!(
            resource = %resource_id,
            kind = K::LABEL,
            found = merged.is_some(),
            "policy lookup"
        );
        merged
    }

    fn compiled<K>(
        &self,
        resource_id: &ResourceId,
        rules: Option<RuleSet<K>>,
        registry: &RuleRegistry<K::Item>,
    ) -> Result<CompiledRules<K::Item>, RuleError>
    where
        K: RuleKind,
    {
        match rules {
            Some(rules) => registry.compile(&rules),
            None => Err(RuleError::NoSuchPolicy(resource_id.to_string())),
        }
    }
}

impl PolicyService for InMemoryPolicyService {
    fn get_resource_rules(&self, resource_id: &ResourceId) -> Option<ResourceRules> {
        self.lookup(resource_id, |table| &table.resource)
    }

    fn get_record_rules(&self, resource_id: &ResourceId) -> Option<RecordRules> {
        self.lookup(resource_id, |table| &table.record)
    }

    fn set_resource_rules(
        &self,
        resource_id: ResourceId,
        rules: ResourceRules,
    ) -> Result<(), RuleError> {
        self.catalog.compile_resource(&rules)?;
        self.table.rcu(|current| {
            let mut next = PolicyTable::clone(current);
            next.resource.insert(resource_id.clone(), rules.clone());
            next
        });
        Ok(())
    }

    fn set_record_rules(
        &self,
        resource_id: ResourceId,
        rules: RecordRules,
    ) -> Result<(), RuleError> {
        self.catalog.compile_record(&rules)?;
        self.table.rcu(|current| {
            let mut next = PolicyTable::clone(current);
            next.record.insert(resource_id.clone(), rules.clone());
            next
        });
        Ok(())
    }

    fn compiled_resource_rules(
        &self,
        resource_id: &ResourceId,
    ) -> Result<CompiledRules<Resource>, RuleError> {
        let rules = self.get_resource_rules(resource_id);
        self.compiled(resource_id, rules, &self.catalog.resource)
    }

    fn compiled_record_rules(
        &self,
        resource_id: &ResourceId,
    ) -> Result<CompiledRules<Record>, RuleError> {
        let rules = self.get_record_rules(resource_id);
        self.compiled(resource_id, rules, &self.catalog.record)
    }
}

/// Declares no policy anywhere; every lookup is absent.
#[derive(Debug, Default)]
pub struct NullPolicyService;

impl PolicyService for NullPolicyService {
    fn get_resource_rules(&self, _resource_id: &ResourceId) -> Option<ResourceRules> {
        None
    }

    fn get_record_rules(&self, _resource_id: &ResourceId) -> Option<RecordRules> {
        None
    }

    fn set_resource_rules(
        &self,
        _resource_id: ResourceId,
        _rules: ResourceRules,
    ) -> Result<(), RuleError> {
        Ok(())
    }

    fn set_record_rules(
        &self,
        _resource_id: ResourceId,
        _rules: RecordRules,
    ) -> Result<(), RuleError> {
        Ok(())
    }

    fn compiled_resource_rules(
        &self,
        resource_id: &ResourceId,
    ) -> Result<CompiledRules<Resource>, RuleError> {
        Err(RuleError::NoSuchPolicy(resource_id.to_string()))
    }

    fn compiled_record_rules(
        &self,
        resource_id: &ResourceId,
    ) -> Result<CompiledRules<Record>, RuleError> {
        Err(RuleError::NoSuchPolicy(resource_id.to_string()))
    }
}
