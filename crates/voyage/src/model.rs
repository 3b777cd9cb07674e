//! Extraction data model.
//!
//! These are plain owned value types. A snapshot produced by an extractor is
//! treated as immutable for the rest of the run; anything that needs a modified
//! view (the override applicator, for one) clones and builds a new value.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A branch of a source project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub is_main: bool,
}

impl Branch {
    pub fn main(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_main: true,
        }
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_main: false,
        }
    }
}

/// Project metadata as discovered on the source server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

impl ProjectInfo {
    /// The project's main branch, if the invariant holds.
    pub fn main_branch(&self) -> Option<&Branch> {
        self.branches.iter().find(|b| b.is_main)
    }

    /// Non-main branches in extraction order.
    pub fn other_branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.iter().filter(|b| !b.is_main)
    }

    /// Check the branch invariants: exactly one main branch, unique names.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mains = self.branches.iter().filter(|b| b.is_main).count();
        if mains != 1 {
            return Err(ModelError::MainBranchCount {
                project: self.key.clone(),
                count: mains,
            });
        }

        let mut seen = HashSet::new();
        for branch in &self.branches {
            if !seen.insert(branch.name.as_str()) {
                return Err(ModelError::DuplicateBranch {
                    project: self.key.clone(),
                    branch: branch.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Link between a project and an external source-control host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// Platform tag, e.g. `github`, `gitlab`, `azure`, `bitbucket`.
    pub platform: String,
    /// Repository identifier on that platform, usually `owner/repo`.
    pub repository: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Binding {
    pub fn new(platform: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            repository: repository.into(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author: Option<String>,
    pub markdown: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A source issue with the metadata that has to be replayed on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub key: String,
    pub rule: String,
    pub component: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub message: String,
    pub status: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default, rename = "type")]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// A source security hotspot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub key: String,
    pub rule: String,
    pub component: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub message: String,
    pub status: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateCondition {
    pub metric: String,
    pub op: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGate {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_builtin: bool,
    #[serde(default)]
    pub conditions: Vec<GateCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_builtin: bool,
    /// Backup document as returned by the source server, restored verbatim.
    #[serde(default)]
    pub backup: Option<String>,
}

impl QualityProfile {
    /// Identity of a profile: (name, language).
    pub fn identity(&self) -> (String, String) {
        (self.name.clone(), self.language.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Server-wide permissions granted to one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalPermission {
    pub group: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePermission {
    pub permission_key: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_key_pattern: Option<String>,
    #[serde(default)]
    pub permissions: Vec<TemplatePermission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Member project keys.
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Server-wide inventory produced by a full extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionSnapshot {
    pub projects: Vec<ProjectInfo>,
    /// Binding per project key. Projects absent from the map are unbound.
    pub bindings: BTreeMap<String, Binding>,
    pub quality_gates: Vec<QualityGate>,
    pub quality_profiles: Vec<QualityProfile>,
    pub groups: Vec<Group>,
    pub global_permissions: Vec<GlobalPermission>,
    pub permission_templates: Vec<PermissionTemplate>,
    pub portfolios: Vec<Portfolio>,
}

impl ExtractionSnapshot {
    pub fn project(&self, key: &str) -> Option<&ProjectInfo> {
        self.projects.iter().find(|p| p.key == key)
    }

    /// Validate every project's branch invariants.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.projects.iter().try_for_each(ProjectInfo::validate)
    }
}

/// Size metrics of one extracted branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectMetrics {
    pub components: u64,
    pub sources: u64,
    pub lines_of_code: u64,
}

/// Everything extracted for one branch of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub project: ProjectInfo,
    pub branch: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
    #[serde(default)]
    pub metrics: ProjectMetrics,
}

impl ProjectSnapshot {
    pub fn is_main(&self) -> bool {
        self.project
            .branches
            .iter()
            .any(|b| b.is_main && b.name == self.branch)
    }
}

/// A destination tenant (organization) that projects can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub key: String,
    /// Prepended to every source project key created in this tenant.
    #[serde(default)]
    pub project_key_prefix: Option<String>,
}

impl TenantConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            project_key_prefix: None,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.project_key_prefix = Some(prefix.into());
        self
    }

    /// Destination key for a source project key.
    pub fn destination_key(&self, source_key: &str) -> String {
        match self.project_key_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}{source_key}"),
            _ => source_key.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("project {project} has {count} main branches, expected exactly one")]
    MainBranchCount { project: String, count: usize },

    #[error("project {project} has duplicate branch {branch}")]
    DuplicateBranch { project: String, branch: String },
}
