use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _, Result};
use clap::Args;
use gatehouse_core_types::{Context, ResourceId, UserId};
use gatehouse_offset_coordinator::metrics::register_metrics;
use gatehouse_pipeline::{AuditErrorEvent, AuthorisedResource};
use gatehouse_rule_engine::Record;
use prometheus::{Registry, TextEncoder};
use serde::Serialize;

use super::context::CliContext;
use super::output::emit_structured;
use crate::app::Gatehouse;

#[derive(Args, Clone, Debug)]
pub struct RequestArgs {
    /// Requesting user id
    #[arg(long)]
    pub user: String,

    /// Resource id, e.g. file:/data/report.csv
    #[arg(long)]
    pub resource: String,

    /// Purpose recorded in the request context
    #[arg(long)]
    pub purpose: Option<String>,

    /// Extra context entries as key=value
    #[arg(long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// JSON array of records to read through each granted resource's record rules
    #[arg(long, value_name = "FILE")]
    pub records: Option<PathBuf>,

    /// Print coordinator metrics after the request
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Serialize)]
struct RequestReport {
    token: String,
    resources: Vec<AuthorisedResource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    records: Vec<FilteredRecords>,
    errors: Vec<AuditErrorEvent>,
}

#[derive(Serialize)]
struct FilteredRecords {
    resource_id: ResourceId,
    records: Vec<Record>,
}

fn read_records(path: &Path) -> Result<Vec<Record>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read records from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of records", path.display()))
}

fn parse_context(args: &RequestArgs) -> Result<Context> {
    let mut context = match &args.purpose {
        Some(purpose) => Context::with_purpose(purpose.clone()),
        None => Context::default(),
    };
    for entry in &args.context {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("context entry `{entry}` is not KEY=VALUE"))?;
        context.insert(key.trim(), value.trim());
    }
    Ok(context)
}

pub async fn cmd_request(args: RequestArgs, ctx: &CliContext) -> Result<()> {
    let context = parse_context(&args)?;
    let input = args.records.as_deref().map(read_records).transpose()?;
    let registry = Registry::new();
    register_metrics(&registry);

    let gatehouse = Gatehouse::start(ctx.config().clone())
        .await
        .context("Failed to start pipeline")?;
    let outcome = gatehouse
        .pipeline
        .request(
            UserId::from(args.user.as_str()),
            ResourceId::new(args.resource.as_str()),
            context,
        )
        .await;
    let (token, resources) = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            gatehouse.shutdown().await;
            return Err(err).context("Request failed");
        }
    };

    let mut records = Vec::new();
    if let Some(input) = &input {
        for granted in &resources {
            let kept = gatehouse
                .pipeline
                .records()
                .filter(&token, &granted.resource.id, input.iter().cloned())
                .await;
            match kept {
                Ok(kept) => records.push(FilteredRecords {
                    resource_id: granted.resource.id.clone(),
                    records: kept,
                }),
                Err(err) => {
                    gatehouse.shutdown().await;
                    return Err(err).context("Record filtering failed");
                }
            }
        }
    }
    let errors = gatehouse.pipeline.errors_for(&token);
    gatehouse.shutdown().await;

    let report = RequestReport {
        token: token.to_string(),
        resources,
        records,
        errors,
    };
    if !emit_structured(ctx.output(), &report)? {
        print_human(&report);
    }

    if args.metrics {
        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .context("Failed to encode metrics")?;
        print!("{text}");
    }
    Ok(())
}

fn print_human(report: &RequestReport) {
    println!("Token: {}", report.token);
    if report.resources.is_empty() {
        println!("Authorised Resources: none");
    } else {
        println!("Authorised Resources:");
        for granted in &report.resources {
            let record_rules = granted
                .record_rules
                .as_ref()
                .map(|rules| rules.message.as_str())
                .unwrap_or("none");
            println!("  - {} (record rules: {})", granted.resource.id, record_rules);
        }
    }
    for filtered in &report.records {
        println!("Records for {}:", filtered.resource_id);
        for record in &filtered.records {
            println!("  {}", serde_json::Value::Object(record.0.clone()));
        }
    }
    if !report.errors.is_empty() {
        println!("Errors:");
        for event in &report.errors {
            println!("  - [{}] {}", event.service_name, event.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(context: &[&str]) -> RequestArgs {
        RequestArgs {
            user: "alice".into(),
            resource: "file:/a".into(),
            purpose: Some("payroll".into()),
            context: context.iter().map(|s| s.to_string()).collect(),
            records: None,
            metrics: false,
        }
    }

    #[test]
    fn context_entries_are_merged_with_purpose() {
        let context = parse_context(&args(&["team = finance"])).unwrap();
        assert_eq!(context.purpose(), Some("payroll"));
        assert_eq!(context.get("team"), Some("finance"));
    }

    #[test]
    fn malformed_context_entries_are_rejected() {
        assert!(parse_context(&args(&["team"])).is_err());
    }

    #[test]
    fn record_files_must_hold_an_array_of_objects() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        fs::write(&good, r#"[{"name": "a", "ssn": "1"}, {"name": "b"}]"#).unwrap();
        let records = read_records(&good).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("name"), Some(&serde_json::json!("b")));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "[1, 2]").unwrap();
        assert!(read_records(&bad).is_err());
        assert!(read_records(&dir.path().join("missing.json")).is_err());
    }
}
