//! Transfer and migration orchestration.
//!
//! # Module Structure
//!
//! - [`context`] - `RunContext` and its builder, options, defaults
//! - [`progress`] - Progress reporting: `MigrationProgress`, `ProgressCallback`, `emit()`
//! - [`results`] - Step, project and run results; status derivation
//! - [`transfer`] - Resumable single-project transfer
//! - [`issues`] - Issue and hotspot review-state sync
//! - [`phases`] - Three-phase server migration
//!
//! # Example
//!
//! ```ignore
//! use voyage::migrate::{Collaborators, RunContext, TransferRequest, transfer_project};
//!
//! let ctx = RunContext::builder().state_dir(".voyage/state").build()?;
//! let clients = Collaborators::new(extractor, pipeline, destination);
//! let mut tracker = ctx.state_tracker("webapp");
//! let result = transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;
//! println!("{}: {}", result.project_key, result.status());
//! ```

pub mod context;
mod errors;
pub mod issues;
pub mod phases;
mod progress;
pub mod results;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

// Re-export context types and defaults
pub use context::{
    ConcurrencyConfig, ContextError, DEFAULT_BASE_DELAY_MS, DEFAULT_HOTSPOT_DETAIL_FETCH,
    DEFAULT_HOTSPOT_SYNC, DEFAULT_ISSUE_SYNC, DEFAULT_MAX_RETRIES,
    DEFAULT_MIN_REQUEST_INTERVAL_MS, DEFAULT_PROJECT_MIGRATION, DEFAULT_SOURCE_FILE_FETCH,
    RunContext, RunContextBuilder, TransferOptions,
};

pub use errors::{MigrateError, Result};

// Re-export progress types
pub use progress::{MigrationProgress, ProgressCallback, emit};

pub use results::{
    MigrationReport, ProjectResult, REPORT_FILE, ReportSummary, StepResult, StepStatus,
    TenantResult,
};

pub use issues::{sync_hotspots, sync_issues};
pub use phases::run_migration;
pub use transfer::{Collaborators, TransferRequest, transfer_project};
