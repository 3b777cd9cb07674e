//! Extraction from a source export directory.
//!
//! The directory holds the server-wide inventory and one file per extracted
//! branch:
//!
//! ```text
//! <export_dir>/inventory.json
//! <export_dir>/projects/<project key>/<branch>.json
//! ```
//!
//! Project keys and branch names are percent-encoded into file names the same
//! way state files are (`feature/x` is `feature%2Fx.json`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::model::{ExtractionSnapshot, Hotspot, Issue, ProjectMetrics, ProjectSnapshot};
use crate::remote::{ExtractOptions, Extractor, RemoteError};
use crate::state::encode_file_stem;

pub const INVENTORY_FILE: &str = "inventory.json";
pub const PROJECTS_DIR: &str = "projects";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("project {project} not found on source")]
    ProjectNotFound { project: String },

    #[error("project {project} has no branch {branch}")]
    BranchNotFound { project: String, branch: String },

    #[error("project {project} has no main branch")]
    MissingMainBranch { project: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Per-branch export file contents.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BranchExport {
    issues: Vec<Issue>,
    hotspots: Vec<Hotspot>,
    metrics: ProjectMetrics,
}

/// Reads a previously exported source server from disk.
///
/// Everything is already local, so the [`ExtractOptions`] limits are only
/// logged here. An extractor talking to a live server bounds its source-file
/// downloads by `source_file_fetch` and its per-hotspot detail requests by
/// `hotspot_detail_fetch`.
#[derive(Debug)]
pub struct DirectoryExtractor {
    root: PathBuf,
    inventory: OnceCell<ExtractionSnapshot>,
}

impl DirectoryExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inventory: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn branch_path(&self, project_key: &str, branch: &str) -> PathBuf {
        self.root
            .join(PROJECTS_DIR)
            .join(encode_file_stem(project_key))
            .join(format!("{}.json", encode_file_stem(branch)))
    }

    async fn inventory(&self) -> Result<&ExtractionSnapshot, ExtractError> {
        self.inventory
            .get_or_try_init(|| read_json(self.root.join(INVENTORY_FILE)))
            .await
    }

    async fn read_branch(
        &self,
        base: &crate::model::ProjectInfo,
        branch: &str,
    ) -> Result<ProjectSnapshot, ExtractError> {
        let path = self.branch_path(&base.key, branch);
        let export: BranchExport = read_json(path).await?;
        tracing::debug!(
            project = %base.key,
            branch,
            issues = export.issues.len(),
            hotspots = export.hotspots.len(),
            "Extracted branch"
        );
        Ok(ProjectSnapshot {
            project: base.clone(),
            branch: branch.to_string(),
            issues: export.issues,
            hotspots: export.hotspots,
            metrics: export.metrics,
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: PathBuf) -> Result<T, ExtractError> {
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ExtractError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    serde_json::from_str(&text).map_err(|e| ExtractError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Extractor for DirectoryExtractor {
    async fn test_connection(&self) -> Result<(), ExtractError> {
        self.inventory().await.map(drop)
    }

    async fn extract_all(&self, options: &ExtractOptions) -> Result<ExtractionSnapshot, ExtractError> {
        tracing::debug!(
            root = %self.root.display(),
            source_file_fetch = options.source_file_fetch,
            hotspot_detail_fetch = options.hotspot_detail_fetch,
            "Reading source inventory"
        );
        self.inventory().await.cloned()
    }

    async fn extract_project(
        &self,
        project_key: &str,
        _options: &ExtractOptions,
    ) -> Result<ProjectSnapshot, ExtractError> {
        let inventory = self.inventory().await?;
        let project = inventory
            .project(project_key)
            .ok_or_else(|| ExtractError::ProjectNotFound {
                project: project_key.to_string(),
            })?;
        let main = project
            .main_branch()
            .ok_or_else(|| ExtractError::MissingMainBranch {
                project: project_key.to_string(),
            })?;
        self.read_branch(project, &main.name).await
    }

    async fn extract_branch(
        &self,
        branch: &str,
        base: &ProjectSnapshot,
        _options: &ExtractOptions,
    ) -> Result<ProjectSnapshot, ExtractError> {
        if !base.project.branches.iter().any(|b| b.name == branch) {
            return Err(ExtractError::BranchNotFound {
                project: base.project.key.clone(),
                branch: branch.to_string(),
            });
        }
        self.read_branch(&base.project, branch).await
    }
}
