use std::path::PathBuf;

use super::results::StepStatus;

/// Progress events emitted during extraction, mapping and transfer.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum MigrationProgress {
    /// Reading the server-wide inventory from the source.
    Extracting,

    /// Inventory extracted.
    Extracted {
        /// Number of projects found.
        projects: usize,
    },

    /// Projects were partitioned across organizations.
    Mapped {
        /// Number of destination organizations.
        organizations: usize,
        /// Number of projects assigned.
        projects: usize,
    },

    /// Edited override tables were applied.
    OverridesApplied {
        /// Number of recognized tables found in the mappings directory.
        tables: usize,
        /// Projects remaining after exclusion.
        projects: usize,
    },

    /// Dry run wrote its artifacts instead of touching the destination.
    DryRunArtifacts {
        /// Files written.
        files: Vec<PathBuf>,
    },

    /// A migration phase started.
    PhaseStarted {
        /// Phase name.
        phase: String,
    },

    /// A server-wide or organization-level step finished.
    StepFinished {
        /// Organization or `server`.
        scope: String,
        /// Step name.
        step: String,
        /// Outcome.
        status: StepStatus,
    },

    /// Starting the transfer of one project.
    ProjectStarted {
        /// Source project key.
        project: String,
        /// Branches known for the project.
        branches: usize,
    },

    /// Starting the transfer of one branch.
    BranchStarted {
        project: String,
        branch: String,
    },

    /// A branch was not transferred.
    BranchSkipped {
        project: String,
        branch: String,
        /// Why it was skipped.
        reason: String,
    },

    /// A branch finished, successfully or not.
    BranchFinished {
        project: String,
        branch: String,
        /// Whether every step of the branch succeeded.
        complete: bool,
    },

    /// Issue or hotspot metadata sync finished for a branch.
    FindingsSynced {
        project: String,
        branch: String,
        /// `issues` or `hotspots`.
        kind: &'static str,
        /// Findings updated on the destination.
        applied: usize,
        /// Findings whose update failed.
        failed: usize,
    },

    /// A project finished.
    ProjectFinished {
        project: String,
        /// Derived project status.
        status: StepStatus,
    },

    /// A write was rate limited and will be retried.
    RateLimitBackoff {
        /// Name of the remote operation.
        operation: String,
        /// Delay before the next attempt in milliseconds.
        retry_after_ms: u64,
        /// Attempt number that was rate limited.
        attempt: u32,
    },

    /// Non-fatal problem worth surfacing to the operator.
    Warning {
        message: String,
    },

    /// Shutdown was requested; remaining work is skipped.
    Cancelled,
}

/// Callback for progress updates.
pub type ProgressCallback = Box<dyn Fn(MigrationProgress) + Send + Sync>;

/// Helper to emit progress events.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: MigrationProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
