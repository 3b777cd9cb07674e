use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::extract::ExtractError;
use crate::migrate::{DEFAULT_HOTSPOT_DETAIL_FETCH, DEFAULT_SOURCE_FILE_FETCH};
use crate::model::{
    ExtractionSnapshot, Group, Hotspot, Issue, PermissionTemplate, Portfolio, ProjectMetrics,
    ProjectSnapshot, QualityGate, QualityProfile, TenantConfig,
};

use super::errors::Result;
use super::pagination::Page;

/// Concurrency limits handed to the extractor for its own fan-out.
///
/// A live extractor sizes one semaphore per field; file-based extractors
/// ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Parallel source-file downloads.
    pub source_file_fetch: usize,
    /// Parallel hotspot detail lookups.
    pub hotspot_detail_fetch: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            source_file_fetch: DEFAULT_SOURCE_FILE_FETCH,
            hotspot_detail_fetch: DEFAULT_HOTSPOT_DETAIL_FETCH,
        }
    }
}

/// Source side of a migration.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Check that the source can be read.
    async fn test_connection(&self) -> std::result::Result<(), ExtractError>;

    /// Server-wide inventory: projects, bindings and organization-level resources.
    async fn extract_all(
        &self,
        options: &ExtractOptions,
    ) -> std::result::Result<ExtractionSnapshot, ExtractError>;

    /// Extract a project's main branch.
    async fn extract_project(
        &self,
        project_key: &str,
        options: &ExtractOptions,
    ) -> std::result::Result<ProjectSnapshot, ExtractError>;

    /// Extract one additional branch, reusing what the main extraction found.
    async fn extract_branch(
        &self,
        branch: &str,
        base: &ProjectSnapshot,
        options: &ExtractOptions,
    ) -> std::result::Result<ProjectSnapshot, ExtractError>;
}

/// Identifies one analysis upload on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub organization: String,
    pub project_key: String,
    pub project_name: String,
    pub branch: String,
    pub is_main: bool,
}

/// The report built from one branch snapshot, ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMessages {
    pub metadata: UploadMetadata,
    pub issues: Vec<Issue>,
    pub hotspots: Vec<Hotspot>,
    pub metrics: ProjectMetrics,
}

/// Handle of a submitted server-side analysis task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

/// Outcome of a finished analysis task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Turns branch snapshots into uploaded analyses.
#[async_trait]
pub trait ReportPipeline: Send + Sync {
    /// Build the report for one branch snapshot in a tenant.
    fn build_all(&self, snapshot: &ProjectSnapshot, tenant: &TenantConfig) -> Result<ReportMessages>;

    /// Encode a built report into the upload payload.
    fn encode_all(&self, messages: &ReportMessages) -> Result<Vec<u8>>;

    /// Submit a payload and return without waiting for processing.
    async fn upload(&self, payload: Vec<u8>, metadata: &UploadMetadata) -> Result<TaskHandle>;

    /// Submit a payload and wait until the server finished processing it.
    async fn upload_and_wait(
        &self,
        payload: Vec<u8>,
        metadata: &UploadMetadata,
    ) -> Result<AnalysisResult>;
}

/// An issue or hotspot as it exists on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFinding {
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
    /// Markdown of comments already present.
    #[serde(default)]
    pub comments: Vec<String>,
}

/// Destination multi-tenant cloud service.
///
/// Methods map one-to-one onto remote calls; callers wrap an implementation in
/// [`ResilientClient`](super::ResilientClient) to get throttling and retries.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    async fn test_connection(&self) -> Result<()>;

    async fn project_exists(&self, project_key: &str) -> Result<bool>;

    async fn create_project(
        &self,
        organization: &str,
        project_key: &str,
        name: &str,
        main_branch: &str,
    ) -> Result<()>;

    /// One page (1-based) of the issues of a project branch.
    async fn search_issues(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>>;

    async fn transition_issue(&self, issue_key: &str, transition: &str) -> Result<()>;

    async fn add_issue_comment(&self, issue_key: &str, text: &str) -> Result<()>;

    /// One page (1-based) of the hotspots of a project branch.
    async fn search_hotspots(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>>;

    async fn change_hotspot_status(
        &self,
        hotspot_key: &str,
        status: &str,
        resolution: Option<&str>,
    ) -> Result<()>;

    async fn add_hotspot_comment(&self, hotspot_key: &str, text: &str) -> Result<()>;

    async fn restore_profile(&self, organization: &str, profile: &QualityProfile) -> Result<()>;

    async fn create_quality_gate(&self, organization: &str, gate: &QualityGate) -> Result<()>;

    async fn create_group(&self, organization: &str, group: &Group) -> Result<()>;

    async fn add_group_permission(
        &self,
        organization: &str,
        group: &str,
        permission: &str,
    ) -> Result<()>;

    /// Create a template and return its destination id.
    async fn create_permission_template(
        &self,
        organization: &str,
        template: &PermissionTemplate,
    ) -> Result<String>;

    async fn add_template_group_permission(
        &self,
        template_id: &str,
        group: &str,
        permission: &str,
    ) -> Result<()>;

    async fn create_portfolio(&self, organization: &str, portfolio: &Portfolio) -> Result<()>;

    async fn add_portfolio_project(&self, portfolio_key: &str, project_key: &str) -> Result<()>;
}
