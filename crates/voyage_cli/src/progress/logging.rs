use voyage::migrate::{MigrationProgress, StepStatus};

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: MigrationProgress) {
        match event {
            MigrationProgress::Extracting => {
                tracing::info!("Extracting source inventory");
            }

            MigrationProgress::Extracted { projects } => {
                tracing::info!(projects, "Inventory extracted");
            }

            MigrationProgress::Mapped {
                organizations,
                projects,
            } => {
                tracing::info!(organizations, projects, "Projects mapped to organizations");
            }

            MigrationProgress::OverridesApplied { tables, projects } => {
                if tables > 0 {
                    tracing::info!(tables, projects, "Applied edited mappings");
                }
            }

            MigrationProgress::DryRunArtifacts { files } => {
                for file in &files {
                    tracing::info!(file = %file.display(), "Wrote mapping table");
                }
            }

            MigrationProgress::PhaseStarted { phase } => {
                tracing::info!(phase = %phase, "Phase started");
            }

            MigrationProgress::StepFinished {
                scope,
                step,
                status,
            } => match status {
                StepStatus::Failed => {
                    tracing::warn!(scope = %scope, step = %step, "Step failed");
                }
                StepStatus::Partial => {
                    tracing::warn!(scope = %scope, step = %step, "Step partially succeeded");
                }
                _ => tracing::debug!(scope = %scope, step = %step, status = %status, "Step finished"),
            },

            MigrationProgress::ProjectStarted { project, branches } => {
                tracing::info!(project = %project, branches, "Transferring project");
            }

            MigrationProgress::BranchStarted { project, branch } => {
                tracing::debug!(project = %project, branch = %branch, "Transferring branch");
            }

            MigrationProgress::BranchSkipped {
                project,
                branch,
                reason,
            } => {
                tracing::info!(project = %project, branch = %branch, reason = %reason, "Branch skipped");
            }

            MigrationProgress::BranchFinished {
                project,
                branch,
                complete,
            } => {
                if complete {
                    tracing::info!(project = %project, branch = %branch, "Branch complete");
                } else {
                    tracing::warn!(project = %project, branch = %branch, "Branch incomplete");
                }
            }

            MigrationProgress::FindingsSynced {
                project,
                branch,
                kind,
                applied,
                failed,
            } => {
                tracing::debug!(project = %project, branch = %branch, kind, applied, failed, "Findings synced");
            }

            MigrationProgress::ProjectFinished { project, status } => {
                tracing::info!(project = %project, status = %status, "Project finished");
            }

            MigrationProgress::RateLimitBackoff {
                operation,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(
                    operation = %operation,
                    retry_after_ms,
                    attempt,
                    "Rate limited, backing off"
                );
            }

            MigrationProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            MigrationProgress::Cancelled => {
                tracing::warn!("Migration cancelled, remaining projects skipped");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
