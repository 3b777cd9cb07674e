//! Per-project incremental transfer state.
//!
//! A [`StateTracker`] owns one JSON file recording which branches have been
//! completely transferred, which source issues have had their metadata synced,
//! and a history of transfers. Re-running a transfer consults it to skip work
//! that already succeeded.
//!
//! Lifecycle: a tracker starts uninitialized; [`StateTracker::initialize`]
//! loads (or creates) the state, mutations change it in memory and
//! [`StateTracker::persist`] writes it back atomically.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state tracker used before initialize()")]
    Uninitialized,

    #[error("state file {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to serialize state: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Aggregated size of one project transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    pub issues_transferred: u64,
    pub components_transferred: u64,
    pub sources_transferred: u64,
    pub lines_of_code: u64,
}

impl TransferStats {
    pub fn add(&mut self, other: TransferStats) {
        self.issues_transferred += other.issues_transferred;
        self.components_transferred += other.components_transferred;
        self.sources_transferred += other.sources_transferred;
        self.lines_of_code += other.lines_of_code;
    }
}

/// One entry of the append-only transfer history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: TransferStats,
}

/// The persisted state document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncState {
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub processed_issue_ids: BTreeSet<String>,
    pub completed_branches: BTreeSet<String>,
    pub history: Vec<TransferRecord>,
}

/// Reversible file-system-safe stem for a project key or branch name.
///
/// Percent-encodes everything outside `[A-Za-z0-9-_.~]`, so distinct keys
/// always get distinct stems (`a:b` is `a%3Ab`, `a_b` stays `a_b`). Stems made
/// only of dots are encoded dot by dot; the empty key is `%`.
pub fn encode_file_stem(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }
    if raw.chars().all(|c| c == '.') {
        return "%2E".repeat(raw.len());
    }
    urlencoding::encode(raw).into_owned()
}

/// Path of a project's state file inside a state directory.
pub fn state_file_path(state_dir: &Path, project_key: &str) -> PathBuf {
    state_dir.join(format!("{}.json", encode_file_stem(project_key)))
}

fn io_error(path: &Path, e: std::io::Error) -> StateError {
    StateError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

#[derive(Debug)]
pub struct StateTracker {
    path: PathBuf,
    state: Option<SyncState>,
}

impl StateTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: None,
        }
    }

    /// Tracker for a project's file in `state_dir`.
    pub fn for_project(state_dir: &Path, project_key: &str) -> Self {
        Self::new(state_file_path(state_dir, project_key))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Load state from disk. Calling it again is a no-op.
    ///
    /// A missing file starts fresh. An unreadable or corrupt file is moved
    /// aside to `<file>.corrupt` with a warning, then state starts fresh.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }

        let state = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => match serde_json::from_str::<SyncState>(&text) {
                Ok(state) => state,
                Err(e) => {
                    self.quarantine(&e.to_string()).await;
                    SyncState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SyncState::default(),
            Err(e) => {
                self.quarantine(&e.to_string()).await;
                SyncState::default()
            }
        };

        tracing::debug!(
            path = %self.path.display(),
            completed_branches = state.completed_branches.len(),
            processed_issues = state.processed_issue_ids.len(),
            "State loaded"
        );
        self.state = Some(state);
        Ok(())
    }

    async fn quarantine(&self, reason: &str) {
        let aside = sibling_with_suffix(&self.path, ".corrupt");
        tracing::warn!(
            path = %self.path.display(),
            moved_to = %aside.display(),
            error = reason,
            "State file unreadable, starting fresh"
        );
        if let Err(e) = tokio::fs::rename(&self.path, &aside).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not move state file aside");
        }
    }

    /// Current state, if initialized.
    pub fn state(&self) -> Option<&SyncState> {
        self.state.as_ref()
    }

    fn state_mut(&mut self) -> Result<&mut SyncState> {
        self.state.as_mut().ok_or(StateError::Uninitialized)
    }

    pub fn is_branch_completed(&self, branch: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.completed_branches.contains(branch))
    }

    pub fn mark_branch_completed(&mut self, branch: &str) -> Result<()> {
        self.state_mut()?.completed_branches.insert(branch.to_string());
        Ok(())
    }

    pub fn is_issue_processed(&self, issue_key: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.processed_issue_ids.contains(issue_key))
    }

    pub fn mark_issues_processed<I, S>(&mut self, issue_keys: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = self.state_mut()?;
        state
            .processed_issue_ids
            .extend(issue_keys.into_iter().map(Into::into));
        Ok(())
    }

    /// Append a history record and advance `lastSyncTimestamp` to the same instant.
    pub fn record_transfer(&mut self, stats: TransferStats) -> Result<()> {
        let state = self.state_mut()?;
        let now = Utc::now();
        state.history.push(TransferRecord {
            timestamp: now,
            stats,
        });
        state.last_sync_timestamp = Some(now);
        Ok(())
    }

    /// Write state to disk through a temporary file and rename.
    pub async fn persist(&self) -> Result<()> {
        let state = self.state.as_ref().ok_or(StateError::Uninitialized)?;
        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let tmp = sibling_with_suffix(&self.path, ".tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        Ok(())
    }

    /// Clear every field and flush.
    pub async fn reset(&mut self) -> Result<()> {
        self.state = Some(SyncState::default());
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(issues: u64) -> TransferStats {
        TransferStats {
            issues_transferred: issues,
            components_transferred: 2,
            sources_transferred: 1,
            lines_of_code: 40,
        }
    }

    #[test]
    fn encode_file_stem_escapes_separators() {
        assert_eq!(encode_file_stem("org:webapp"), "org%3Awebapp");
        assert_eq!(encode_file_stem("feature/x"), "feature%2Fx");
        assert_eq!(encode_file_stem("a.b-c_d"), "a.b-c_d");
        assert_eq!(encode_file_stem("100%"), "100%25");
        assert_eq!(encode_file_stem(".."), "%2E%2E");
        assert_eq!(encode_file_stem(""), "%");
    }

    #[test]
    fn keys_differing_in_separator_get_distinct_files() {
        let dir = Path::new("state");
        let colon = state_file_path(dir, "com.acme:web");
        let underscore = state_file_path(dir, "com.acme_web");
        assert_ne!(colon, underscore);
        assert_eq!(underscore, dir.join("com.acme_web.json"));
    }

    #[tokio::test]
    async fn mutations_before_initialize_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = StateTracker::new(dir.path().join("p.json"));
        assert!(matches!(
            tracker.mark_branch_completed("main"),
            Err(StateError::Uninitialized)
        ));
        assert!(matches!(tracker.persist().await, Err(StateError::Uninitialized)));
        assert!(!tracker.is_branch_completed("main"));
    }

    #[tokio::test]
    async fn persisted_state_round_trips_and_initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("webapp.json");

        let mut tracker = StateTracker::new(&path);
        tracker.initialize().await.unwrap();
        tracker.mark_branch_completed("main").unwrap();
        tracker.mark_issues_processed(["I1", "I2"]).unwrap();
        tracker.record_transfer(stats(2)).unwrap();
        tracker.persist().await.unwrap();

        // A second initialize keeps in-memory state.
        tracker.mark_branch_completed("legacy").unwrap();
        tracker.initialize().await.unwrap();
        assert!(tracker.is_branch_completed("legacy"));

        let mut reloaded = StateTracker::new(&path);
        reloaded.initialize().await.unwrap();
        assert!(reloaded.is_branch_completed("main"));
        assert!(!reloaded.is_branch_completed("legacy"));
        assert!(reloaded.is_issue_processed("I2"));
        let state = reloaded.state().unwrap();
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.last_sync_timestamp, Some(state.history[0].timestamp));
        assert!(!sibling_with_suffix(&path, ".tmp").exists());
    }

    #[tokio::test]
    async fn json_layout_uses_camel_case_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut tracker = StateTracker::new(&path);
        tracker.initialize().await.unwrap();
        tracker.record_transfer(stats(5)).unwrap();
        tracker.persist().await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.get("lastSyncTimestamp").unwrap().is_string());
        assert!(value.get("processedIssueIds").unwrap().is_array());
        assert!(value.get("completedBranches").unwrap().is_array());
        let record = &value["history"][0];
        assert_eq!(record["issuesTransferred"], 5);
        assert_eq!(record["linesOfCode"], 40);
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut tracker = StateTracker::new(&path);
        tracker.initialize().await.unwrap();

        assert_eq!(tracker.state(), Some(&SyncState::default()));
        assert!(dir.path().join("p.json.corrupt").exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reset_clears_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut tracker = StateTracker::new(&path);
        tracker.initialize().await.unwrap();
        tracker.mark_branch_completed("main").unwrap();
        tracker.persist().await.unwrap();

        tracker.reset().await.unwrap();

        let mut reloaded = StateTracker::new(&path);
        reloaded.initialize().await.unwrap();
        assert_eq!(reloaded.state(), Some(&SyncState::default()));
    }
}
