pub mod apply;
pub mod builtin;
pub mod errors;
pub mod loader;
pub mod model;
pub mod registry;
pub mod rule;
pub mod service;

pub use apply::{apply_rules, merge_hierarchy, merge_rules};
pub use builtin::{DenyAllRule, MaskField, PassThroughRule, RedactField, RequirePurpose, RequireRole};
pub use errors::{RuleError, RuleFailure};
pub use loader::{load_policies, load_policies_with_options, LoadOptions, PolicyDocument, PolicyEntry};
pub use model::{
    Record, RecordKind, RecordRules, Resource, ResourceKind, ResourceRules, RuleKind, RuleMap,
    RuleSet, NO_RULES_SET,
};
pub use registry::{CompiledRules, RuleCatalog, RuleFactory, RuleRegistry};
pub use rule::{Rule, RuleFn, RulePredicate, WrappedRule};
pub use service::{InMemoryPolicyService, NullPolicyService, PolicyService};
