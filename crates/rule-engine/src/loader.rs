use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use gatehouse_core_types::ResourceId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::RuleError;
use crate::model::{RecordRules, ResourceRules};

pub const ENV_POLICY_PATHS: &str = "GATEHOUSE_POLICY_PATHS";
pub const ENV_POLICY_JSON: &str = "GATEHOUSE_POLICY_JSON";

/// Rules declared for one node of the resource hierarchy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyEntry {
    pub resource_id: ResourceId,
    #[serde(default)]
    pub resource_rules: Option<ResourceRules>,
    #[serde(default)]
    pub record_rules: Option<RecordRules>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDocument {
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,
}

impl PolicyDocument {
    pub fn from_yaml_str(raw: &str) -> Result<Self, RuleError> {
        serde_yaml::from_str(raw).map_err(|err| RuleError::Invalid(format!("{}", err)))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RuleError> {
        serde_json::from_str(raw).map_err(|err| RuleError::Invalid(format!("{}", err)))
    }

    pub fn extend(&mut self, other: PolicyDocument) {
        self.policies.extend(other.policies);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

pub fn load_policies(path: Option<&Path>) -> Result<PolicyDocument, RuleError> {
    let mut options = LoadOptions {
        include_env: true,
        ..LoadOptions::default()
    };
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    load_policies_with_options(&options)
}

/// Reads every configured policy file in order, then the environment overlays.
///
/// An explicitly named file that does not exist is an error; paths taken from
/// the environment are skipped when missing.
pub fn load_policies_with_options(options: &LoadOptions) -> Result<PolicyDocument, RuleError> {
    let mut document = PolicyDocument::default();

    for path in &options.paths {
        if !path.exists() {
            return Err(RuleError::Io(format!(
                "policy file {} does not exist",
                path.display()
            )));
        }
        document.extend(policies_from_file(path)?);
    }

    if options.include_env {
        for path in paths_from_env() {
            if path.exists() {
                document.extend(policies_from_file(&path)?);
            } else {
                debug!(path = %path.display(), "skipping missing policy file from env");
            }
        }
        if let Ok(raw_json) = env::var(ENV_POLICY_JSON) {
            if !raw_json.trim().is_empty() {
                document.extend(PolicyDocument::from_json_str(&raw_json)?);
            }
        }
    }

    info!(entries = document.len(), "loaded policy document");
    Ok(document)
}

fn policies_from_file(path: &Path) -> Result<PolicyDocument, RuleError> {
    let content = fs::read_to_string(path)
        .map_err(|err| RuleError::Io(format!("{}: {}", path.display(), err)))?;
    PolicyDocument::from_yaml_str(&content)
}

fn paths_from_env() -> Vec<PathBuf> {
    match env::var(ENV_POLICY_PATHS) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(_) => Vec::new(),
    }
}
