//! Run context for transfers and migrations.
//!
//! Everything a run needs besides its collaborators travels in a
//! [`RunContext`]: options, concurrency limits, where state and reports live,
//! the progress callback and the shutdown flag.
//!
//! # Example
//!
//! ```ignore
//! use voyage::migrate::{RunContext, TransferOptions};
//!
//! let ctx = RunContext::builder()
//!     .options(TransferOptions { incremental: true, ..Default::default() })
//!     .state_dir(".voyage/state")
//!     .progress(callback)
//!     .shutdown_flag(flag)
//!     .build()?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::remote::ExtractOptions;
use crate::state::StateTracker;

use super::progress::{MigrationProgress, ProgressCallback, emit};

/// Minimum spacing between destination writes.
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 500;

/// Retries after a rate-limited call before giving up.
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// Delay before the first retry; doubles with every attempt.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default parallel source-file downloads during extraction.
pub const DEFAULT_SOURCE_FILE_FETCH: usize = 10;

/// Default parallel hotspot detail lookups during extraction.
pub const DEFAULT_HOTSPOT_DETAIL_FETCH: usize = 10;

/// Default parallel issue updates per branch.
pub const DEFAULT_ISSUE_SYNC: usize = 5;

/// Default parallel hotspot updates per branch.
pub const DEFAULT_HOTSPOT_SYNC: usize = 5;

/// Default projects transferred in parallel during a migration.
pub const DEFAULT_PROJECT_MIGRATION: usize = 2;

/// Error type for run context construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    /// Missing required field in builder.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// A concurrency limit was zero.
    #[error("concurrency limit {name} must be at least 1")]
    ZeroConcurrency { name: &'static str },
}

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Export override tables and a report; write nothing to the destination.
    pub dry_run: bool,
    /// Block on each uploaded analysis until the server finished it.
    pub wait_for_analysis: bool,
    /// Skip issues already synced in an earlier run.
    pub incremental: bool,
    /// Sync issue transitions and comments after upload.
    pub sync_issues: bool,
    /// Sync hotspot reviews and comments after upload.
    pub sync_hotspots: bool,
    /// Check both connections before transferring a project.
    pub test_connections: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            wait_for_analysis: true,
            incremental: true,
            sync_issues: true,
            sync_hotspots: true,
            test_connections: false,
        }
    }
}

/// Size of each worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    pub source_file_fetch: usize,
    pub hotspot_detail_fetch: usize,
    pub issue_sync: usize,
    pub hotspot_sync: usize,
    pub project_migration: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            source_file_fetch: DEFAULT_SOURCE_FILE_FETCH,
            hotspot_detail_fetch: DEFAULT_HOTSPOT_DETAIL_FETCH,
            issue_sync: DEFAULT_ISSUE_SYNC,
            hotspot_sync: DEFAULT_HOTSPOT_SYNC,
            project_migration: DEFAULT_PROJECT_MIGRATION,
        }
    }
}

impl ConcurrencyConfig {
    /// Reject zero-sized pools.
    pub fn validate(&self) -> Result<(), ContextError> {
        let limits = [
            ("source_file_fetch", self.source_file_fetch),
            ("hotspot_detail_fetch", self.hotspot_detail_fetch),
            ("issue_sync", self.issue_sync),
            ("hotspot_sync", self.hotspot_sync),
            ("project_migration", self.project_migration),
        ];
        match limits.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ContextError::ZeroConcurrency { name }),
            None => Ok(()),
        }
    }
}

/// Builder for creating a [`RunContext`].
#[derive(Default)]
pub struct RunContextBuilder {
    options: Option<TransferOptions>,
    concurrency: Option<ConcurrencyConfig>,
    state_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    mappings_dir: Option<PathBuf>,
    progress: Option<Arc<ProgressCallback>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl RunContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: TransferOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn concurrency(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Directory holding one state file per project.
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Directory receiving the run report and dry-run artifacts.
    /// Defaults to the state directory.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Directory of edited override tables to apply.
    pub fn mappings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mappings_dir = Some(dir.into());
        self
    }

    pub fn progress(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Set the shutdown flag for graceful shutdown.
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Build the run context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingField`] without a state directory and
    /// [`ContextError::ZeroConcurrency`] for an empty worker pool.
    pub fn build(self) -> Result<RunContext, ContextError> {
        let state_dir = self
            .state_dir
            .ok_or(ContextError::MissingField { field: "state_dir" })?;
        let concurrency = self.concurrency.unwrap_or_default();
        concurrency.validate()?;

        Ok(RunContext {
            options: self.options.unwrap_or_default(),
            concurrency,
            output_dir: self.output_dir.unwrap_or_else(|| state_dir.clone()),
            state_dir,
            mappings_dir: self.mappings_dir,
            progress: self.progress,
            shutdown_flag: self.shutdown_flag,
        })
    }
}

/// Shared, cheaply cloneable configuration of one run.
#[derive(Clone)]
pub struct RunContext {
    options: TransferOptions,
    concurrency: ConcurrencyConfig,
    state_dir: PathBuf,
    output_dir: PathBuf,
    mappings_dir: Option<PathBuf>,
    progress: Option<Arc<ProgressCallback>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl RunContext {
    pub fn builder() -> RunContextBuilder {
        RunContextBuilder::new()
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn concurrency(&self) -> &ConcurrencyConfig {
        &self.concurrency
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn mappings_dir(&self) -> Option<&Path> {
        self.mappings_dir.as_deref()
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    pub fn progress(&self) -> Option<&ProgressCallback> {
        self.progress.as_deref()
    }

    pub(crate) fn emit(&self, event: MigrationProgress) {
        emit(self.progress(), event);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Uninitialized tracker for a project's state file.
    pub fn state_tracker(&self, project_key: &str) -> StateTracker {
        StateTracker::for_project(&self.state_dir, project_key)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            source_file_fetch: self.concurrency.source_file_fetch,
            hotspot_detail_fetch: self.concurrency.hotspot_detail_fetch,
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("options", &self.options)
            .field("concurrency", &self.concurrency)
            .field("state_dir", &self.state_dir)
            .field("output_dir", &self.output_dir)
            .field("mappings_dir", &self.mappings_dir)
            .field("has_progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}
