use std::sync::Arc;

use gatehouse_core_types::{Context, ResourceId, User};
use gatehouse_rule_engine::{
    apply_rules, InMemoryPolicyService, PolicyDocument, PolicyService, Record, Resource,
    RuleCatalog,
};
use serde_json::json;

const POLICIES: &str = r#"
policies:
  - resource_id: "file:/"
    resource_rules:
      message: "root"
      rules:
        everyone: "pass_through"
  - resource_id: "file:/hr/"
    resource_rules:
      message: "hr staff"
      rules:
        staff: "require_role:hr"
    record_rules:
      message: "hide ssn"
      rules:
        ssn: "mask_field:ssn"
  - resource_id: "file:/hr/salaries.csv"
    record_rules:
      message: "payroll purpose"
      rules:
        purpose: "require_purpose:payroll"
"#;

fn service() -> InMemoryPolicyService {
    let document = PolicyDocument::from_yaml_str(POLICIES).unwrap();
    InMemoryPolicyService::prepopulate(Arc::new(RuleCatalog::with_builtins()), &document).unwrap()
}

#[test]
fn leaf_inherits_every_ancestor() {
    let service = service();
    let leaf = ResourceId::new("file:/hr/salaries.csv");

    let resource_rules = service.get_resource_rules(&leaf).unwrap();
    assert_eq!(resource_rules.message, "root,hr staff");
    assert_eq!(resource_rules.rules.ids(), vec!["everyone", "staff"]);

    let record_rules = service.get_record_rules(&leaf).unwrap();
    assert_eq!(record_rules.message, "hide ssn,payroll purpose");
    assert_eq!(record_rules.rules.ids(), vec!["ssn", "purpose"]);
}

#[test]
fn compiled_rules_filter_resources_and_records() {
    let service = service();
    let leaf = ResourceId::new("file:/hr/salaries.csv");
    let hr = User::new("harriet").with_role("hr");
    let payroll = Context::with_purpose("payroll");

    let resource_rules = service.compiled_resource_rules(&leaf).unwrap();
    let resource = Resource::new(leaf.as_str()).with_type("employee").with_format("csv");
    assert!(apply_rules(resource.clone(), &hr, &payroll, Some(&resource_rules))
        .unwrap()
        .is_some());
    assert!(apply_rules(resource, &User::new("mallory"), &payroll, Some(&resource_rules))
        .unwrap()
        .is_none());

    let record_rules = service.compiled_record_rules(&leaf).unwrap();
    let record = Record::new()
        .with_field("name", "Alice")
        .with_field("ssn", "123-45-6789")
        .with_field("salary", 50_000);
    let filtered = apply_rules(record.clone(), &hr, &payroll, Some(&record_rules))
        .unwrap()
        .unwrap();
    assert_eq!(filtered.get("ssn"), Some(&json!(null)));
    assert_eq!(filtered.get("salary"), Some(&json!(50_000)));

    let dropped = apply_rules(record, &hr, &Context::default(), Some(&record_rules)).unwrap();
    assert!(dropped.is_none());
}

#[test]
fn resources_outside_any_policy_have_none() {
    let service = service();
    assert!(service
        .get_record_rules(&ResourceId::new("file:/public/readme.txt"))
        .is_none());
    assert!(service
        .get_resource_rules(&ResourceId::new("s3:/bucket/key"))
        .is_none());
}
