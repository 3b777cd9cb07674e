//! Analysis report pipeline against the destination cloud service.
//!
//! Reports are encoded as JSON and submitted to the compute engine endpoint.
//! Waiting means polling the returned task until it reaches a terminal state
//! or the analysis timeout elapses.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;

use crate::http::JSON_CONTENT_TYPE;
use crate::model::{ProjectSnapshot, TenantConfig};

use super::cloud::{CloudClient, decode};
use super::errors::{RemoteError, Result};
use super::policy::RemoteCallPolicy;
use super::types::{AnalysisResult, ReportMessages, ReportPipeline, TaskHandle, TaskStatus, UploadMetadata};

/// Default interval between task status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default upper bound on waiting for one analysis.
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(600);

const SUBMIT_PATH: &str = "/api/ce/submit";
const TASK_PATH: &str = "/api/ce/task";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    task: WireTask,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTask {
    id: String,
    status: TaskStatus,
    #[serde(default)]
    error_message: Option<String>,
}

/// Report pipeline that uploads through a [`CloudClient`].
#[derive(Clone)]
pub struct CloudReportPipeline {
    client: CloudClient,
    policy: RemoteCallPolicy,
    poll_interval: Duration,
    analysis_timeout: Duration,
}

impl CloudReportPipeline {
    pub fn new(client: CloudClient, policy: RemoteCallPolicy) -> Self {
        Self {
            client,
            policy,
            poll_interval: DEFAULT_POLL_INTERVAL,
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    async fn task_status(&self, task_id: &str) -> Result<AnalysisResult> {
        let query = [("id", task_id)];
        let response: TaskResponse = self
            .policy
            .read("task_status", || self.client.get(TASK_PATH, &query))
            .await?;
        Ok(AnalysisResult {
            task_id: response.task.id,
            status: response.task.status,
            error_message: response.task.error_message,
        })
    }

    /// Poll until the task is terminal. Non-success terminal states and
    /// timeouts are [`RemoteError::Analysis`].
    async fn wait_for_task(&self, task_id: &str) -> Result<AnalysisResult> {
        let deadline = Instant::now() + self.analysis_timeout;
        loop {
            let result = self.task_status(task_id).await?;
            match result.status {
                TaskStatus::Success => return Ok(result),
                TaskStatus::Failed | TaskStatus::Canceled => {
                    return Err(RemoteError::Analysis {
                        task_id: task_id.to_string(),
                        message: result
                            .error_message
                            .unwrap_or_else(|| format!("task ended as {:?}", result.status)),
                    });
                }
                TaskStatus::Pending | TaskStatus::InProgress => {}
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(RemoteError::Analysis {
                    task_id: task_id.to_string(),
                    message: format!(
                        "timed out after {}s waiting for analysis",
                        self.analysis_timeout.as_secs()
                    ),
                });
            }
            tracing::debug!(task_id, status = ?result.status, "Analysis still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ReportPipeline for CloudReportPipeline {
    fn build_all(&self, snapshot: &ProjectSnapshot, tenant: &TenantConfig) -> Result<ReportMessages> {
        Ok(ReportMessages {
            metadata: UploadMetadata {
                organization: tenant.key.clone(),
                project_key: tenant.destination_key(&snapshot.project.key),
                project_name: snapshot.project.name.clone(),
                branch: snapshot.branch.clone(),
                is_main: snapshot.is_main(),
            },
            issues: snapshot.issues.clone(),
            hotspots: snapshot.hotspots.clone(),
            metrics: snapshot.metrics,
        })
    }

    fn encode_all(&self, messages: &ReportMessages) -> Result<Vec<u8>> {
        serde_json::to_vec(messages).map_err(|e| RemoteError::decode(format!("encoding report: {e}")))
    }

    async fn upload(&self, payload: Vec<u8>, metadata: &UploadMetadata) -> Result<TaskHandle> {
        let mut query = vec![
            ("organization", metadata.organization.as_str()),
            ("projectKey", metadata.project_key.as_str()),
        ];
        if !metadata.is_main {
            query.push(("branch", metadata.branch.as_str()));
        }

        let response = self
            .policy
            .write("submit_report", || {
                self.client
                    .post_body(SUBMIT_PATH, &query, JSON_CONTENT_TYPE, payload.clone())
            })
            .await?;
        let submitted: SubmitResponse = decode(SUBMIT_PATH, &response)?;

        tracing::info!(
            project = %metadata.project_key,
            branch = %metadata.branch,
            task_id = %submitted.task_id,
            "Report submitted"
        );
        Ok(TaskHandle {
            task_id: submitted.task_id,
        })
    }

    async fn upload_and_wait(
        &self,
        payload: Vec<u8>,
        metadata: &UploadMetadata,
    ) -> Result<AnalysisResult> {
        let handle = self.upload(payload, metadata).await?;
        self.wait_for_task(&handle.task_id).await
    }
}
