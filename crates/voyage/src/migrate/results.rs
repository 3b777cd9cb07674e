use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// File name of the run report inside the output directory.
pub const REPORT_FILE: &str = "migration-report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Partial,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one named unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepResult {
    fn with_status(step_name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step_name: step_name.into(),
            status,
            detail: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn success(step_name: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            detail,
            ..Self::with_status(step_name, StepStatus::Success)
        }
    }

    pub fn partial(step_name: impl Into<String>, detail: String, error: String) -> Self {
        Self {
            detail: Some(detail),
            error: Some(error),
            ..Self::with_status(step_name, StepStatus::Partial)
        }
    }

    pub fn failed(step_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(step_name, StepStatus::Failed)
        }
    }

    pub fn skipped(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::with_status(step_name, StepStatus::Skipped)
        }
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Aggregate status of a list of steps.
///
/// Skipped steps are neutral unless every step was skipped. `fatal` forces
/// `Failed`.
pub fn derive_status(steps: &[StepResult], fatal: bool) -> StepStatus {
    if fatal {
        return StepStatus::Failed;
    }
    let count = |status| steps.iter().filter(|s| s.status == status).count();
    let failed = count(StepStatus::Failed);
    let partial = count(StepStatus::Partial);
    let success = count(StepStatus::Success);

    if !steps.is_empty() && count(StepStatus::Skipped) == steps.len() {
        StepStatus::Skipped
    } else if failed > 0 && success == 0 && partial == 0 {
        StepStatus::Failed
    } else if failed > 0 || partial > 0 {
        StepStatus::Partial
    } else {
        StepStatus::Success
    }
}

/// Outcome of transferring one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectResult {
    pub project_key: String,
    pub organization: String,
    pub steps: Vec<StepResult>,
    /// Branches whose upload succeeded, in transfer order.
    pub branches_transferred: Vec<String>,
    /// The project could not be transferred at all.
    pub fatal: bool,
    pub duration_ms: u64,
}

impl ProjectResult {
    pub fn new(project_key: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            organization: organization.into(),
            steps: Vec::new(),
            branches_transferred: Vec::new(),
            fatal: false,
            duration_ms: 0,
        }
    }

    pub fn push(&mut self, step: StepResult) {
        if step.status == StepStatus::Failed {
            tracing::warn!(
                project = %self.project_key,
                step = %step.step_name,
                error = step.error.as_deref().unwrap_or_default(),
                "Step failed"
            );
        }
        self.steps.push(step);
    }

    /// Record a failure that ends the project.
    pub fn fail(&mut self, step: StepResult) {
        self.fatal = true;
        self.push(step);
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    pub fn status(&self) -> StepStatus {
        derive_status(&self.steps, self.fatal)
    }
}

impl Serialize for ProjectResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ProjectResult", 6)?;
        s.serialize_field("projectKey", &self.project_key)?;
        s.serialize_field("organization", &self.organization)?;
        s.serialize_field("status", &self.status())?;
        s.serialize_field("branchesTransferred", &self.branches_transferred)?;
        s.serialize_field("steps", &self.steps)?;
        s.serialize_field("durationMs", &self.duration_ms)?;
        s.end()
    }
}

/// Organization-level steps of one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResult {
    pub organization: String,
    pub steps: Vec<StepResult>,
}

impl TenantResult {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            steps: Vec::new(),
        }
    }

    pub fn status(&self) -> StepStatus {
        derive_status(&self.steps, false)
    }
}

impl Serialize for TenantResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TenantResult", 3)?;
        s.serialize_field("organization", &self.organization)?;
        s.serialize_field("status", &self.status())?;
        s.serialize_field("steps", &self.steps)?;
        s.end()
    }
}

/// Project counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Everything one `migrate` run did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Server-wide steps (gates and profiles), scoped by organization.
    pub server: Vec<TenantResult>,
    pub organizations: Vec<TenantResult>,
    pub projects: Vec<ProjectResult>,
    /// Files written by a dry run.
    pub artifacts: Vec<PathBuf>,
    pub summary: ReportSummary,
}

impl MigrationReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            server: Vec::new(),
            organizations: Vec::new(),
            projects: Vec::new(),
            artifacts: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    pub fn project(&self, key: &str) -> Option<&ProjectResult> {
        self.projects.iter().find(|p| p.project_key == key)
    }

    /// Stamp the finish time and recompute the summary.
    pub fn finish(&mut self) {
        let mut summary = ReportSummary::default();
        for project in &self.projects {
            match project.status() {
                StepStatus::Success => summary.succeeded += 1,
                StepStatus::Partial => summary.partial += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
        }
        self.summary = summary;
        self.finished_at = Some(Utc::now());
    }

    /// Write the report as pretty JSON into `dir`.
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(REPORT_FILE);
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(name: &str) -> StepResult {
        StepResult::success(name, None)
    }

    #[test]
    fn status_all_success() {
        assert_eq!(derive_status(&[ok("a"), ok("b")], false), StepStatus::Success);
        assert_eq!(derive_status(&[], false), StepStatus::Success);
    }

    #[test]
    fn skipped_steps_are_neutral() {
        let steps = [ok("a"), StepResult::skipped("b", "already completed")];
        assert_eq!(derive_status(&steps, false), StepStatus::Success);

        let cancelled = [StepResult::skipped("transfer", "cancelled")];
        assert_eq!(derive_status(&cancelled, false), StepStatus::Skipped);
    }

    #[test]
    fn some_failures_make_partial() {
        let steps = [ok("a"), StepResult::failed("b", "boom")];
        assert_eq!(derive_status(&steps, false), StepStatus::Partial);

        let steps = [ok("a"), StepResult::partial("b", "3 of 4".into(), "x".into())];
        assert_eq!(derive_status(&steps, false), StepStatus::Partial);
    }

    #[test]
    fn every_step_failed_is_failed() {
        let steps = [
            StepResult::failed("a", "boom"),
            StepResult::skipped("b", "main branch failed"),
        ];
        assert_eq!(derive_status(&steps, false), StepStatus::Failed);
    }

    #[test]
    fn fatal_overrides_successes() {
        let mut result = ProjectResult::new("p", "acme");
        result.push(ok("resolve project"));
        result.fail(StepResult::failed("upload:main", "boom"));
        assert_eq!(result.status(), StepStatus::Failed);
    }

    #[test]
    fn project_serializes_derived_status() {
        let mut result = ProjectResult::new("webapp", "acme");
        result.push(ok("upload:main"));
        result.push(StepResult::failed("hotspot-sync:legacy", "boom"));
        result.branches_transferred = vec!["main".into(), "legacy".into()];

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["branchesTransferred"][1], "legacy");
        assert_eq!(json["steps"][1]["stepName"], "hotspot-sync:legacy");
        assert!(json["steps"][0].get("error").is_none());
    }

    #[test]
    fn finish_counts_projects() {
        let mut report = MigrationReport::new(false);
        let mut good = ProjectResult::new("a", "acme");
        good.push(ok("upload:main"));
        let mut bad = ProjectResult::new("b", "acme");
        bad.fail(StepResult::failed("create project", "denied"));
        report.projects = vec![good, bad];

        report.finish();

        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 1);
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = MigrationReport::new(true);
        report.finish();

        let path = report.write_to(dir.path()).await.unwrap();

        assert_eq!(path.file_name().unwrap(), REPORT_FILE);
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["dryRun"], true);
        assert_eq!(value["runId"], report.run_id.to_string());
    }
}
