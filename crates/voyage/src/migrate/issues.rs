//! Issue and hotspot metadata sync.
//!
//! Uploading an analysis recreates findings on the destination with fresh
//! keys and default states. This step matches each source finding to its
//! destination counterpart and replays the review work done on the source:
//! status transitions and comments.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::model::{Hotspot, Issue};
use crate::remote::{
    DEFAULT_PAGE_SIZE, DestinationClient, Paginator, RemoteError, RemoteFinding,
    short_error_message,
};
use crate::state::StateTracker;

use super::context::RunContext;
use super::progress::MigrationProgress;
use super::results::StepResult;

/// Hotspot status after a review.
pub const REVIEWED: &str = "REVIEWED";

/// Errors listed in a step before the rest are summarized.
const MAX_REPORTED_ERRORS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    Issue,
    Hotspot,
}

impl FindingKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Issue => "issues",
            Self::Hotspot => "hotspots",
        }
    }

    /// Step name for a branch, e.g. `issue-sync:main`.
    pub fn step_name(self, branch: &str) -> String {
        match self {
            Self::Issue => format!("issue-sync:{branch}"),
            Self::Hotspot => format!("hotspot-sync:{branch}"),
        }
    }

    fn concurrency(self, ctx: &RunContext) -> usize {
        match self {
            Self::Issue => ctx.concurrency().issue_sync,
            Self::Hotspot => ctx.concurrency().hotspot_sync,
        }
    }
}

/// Source issue or hotspot reduced to what matching and diffing need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFinding {
    pub key: String,
    pub rule: String,
    pub component: String,
    pub line: Option<u32>,
    pub message: String,
    pub status: String,
    pub resolution: Option<String>,
    pub comments: Vec<String>,
}

impl From<&Issue> for SourceFinding {
    fn from(issue: &Issue) -> Self {
        Self {
            key: issue.key.clone(),
            rule: issue.rule.clone(),
            component: issue.component.clone(),
            line: issue.line,
            message: issue.message.clone(),
            status: issue.status.clone(),
            resolution: issue.resolution.clone(),
            comments: issue.comments.iter().map(|c| c.markdown.clone()).collect(),
        }
    }
}

impl From<&Hotspot> for SourceFinding {
    fn from(hotspot: &Hotspot) -> Self {
        Self {
            key: hotspot.key.clone(),
            rule: hotspot.rule.clone(),
            component: hotspot.component.clone(),
            line: hotspot.line,
            message: hotspot.message.clone(),
            status: hotspot.status.clone(),
            resolution: hotspot.resolution.clone(),
            comments: hotspot.comments.iter().map(|c| c.markdown.clone()).collect(),
        }
    }
}

/// One change to replay on a destination finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingUpdate {
    /// Issue workflow transition.
    Transition(String),
    /// Hotspot status change.
    Review {
        status: String,
        resolution: Option<String>,
    },
    Comment(String),
}

/// Workflow transition that reproduces a source issue's state.
pub fn issue_transition(status: &str, resolution: Option<&str>) -> Option<&'static str> {
    match resolution.map(str::to_ascii_uppercase).as_deref() {
        Some("FALSE-POSITIVE") => return Some("falsepositive"),
        Some("WONTFIX") => return Some("wontfix"),
        _ => {}
    }
    match status.to_ascii_uppercase().as_str() {
        "ACCEPTED" => Some("accept"),
        "CONFIRMED" => Some("confirm"),
        _ => None,
    }
}

fn same_state(source: &SourceFinding, destination: &RemoteFinding) -> bool {
    source.status.eq_ignore_ascii_case(&destination.status)
        && source.resolution.as_deref().map(str::to_ascii_uppercase)
            == destination.resolution.as_deref().map(str::to_ascii_uppercase)
}

/// Updates that bring `destination` in line with `source`.
pub fn plan_updates(
    kind: FindingKind,
    source: &SourceFinding,
    destination: &RemoteFinding,
) -> Vec<FindingUpdate> {
    let mut updates = Vec::new();

    if !same_state(source, destination) {
        match kind {
            FindingKind::Issue => {
                if let Some(transition) =
                    issue_transition(&source.status, source.resolution.as_deref())
                {
                    updates.push(FindingUpdate::Transition(transition.to_string()));
                }
            }
            FindingKind::Hotspot => {
                if source.status.eq_ignore_ascii_case(REVIEWED) {
                    updates.push(FindingUpdate::Review {
                        status: REVIEWED.to_string(),
                        resolution: source.resolution.clone(),
                    });
                }
            }
        }
    }

    for comment in &source.comments {
        let present = destination
            .comments
            .iter()
            .any(|existing| existing.trim() == comment.trim());
        if !present && !comment.trim().is_empty() {
            updates.push(FindingUpdate::Comment(comment.clone()));
        }
    }

    updates
}

/// Pair source findings with destination findings.
///
/// First by `(rule, component, line)`, then the leftovers by
/// `(rule, component, message)`. Each destination finding is used at most
/// once. Returns `(source index, destination index)` pairs and the indices of
/// unmatched source findings.
pub fn match_findings(
    sources: &[SourceFinding],
    destinations: &[RemoteFinding],
) -> (Vec<(usize, usize)>, Vec<usize>) {
    let mut by_line: HashMap<(&str, &str, Option<u32>), Vec<usize>> = HashMap::new();
    let mut by_message: HashMap<(&str, &str, &str), Vec<usize>> = HashMap::new();
    for (idx, dest) in destinations.iter().enumerate() {
        by_line
            .entry((&dest.rule, &dest.component, dest.line))
            .or_default()
            .push(idx);
        by_message
            .entry((&dest.rule, &dest.component, &dest.message))
            .or_default()
            .push(idx);
    }

    let mut used = vec![false; destinations.len()];
    let mut take = |candidates: Option<&Vec<usize>>| -> Option<usize> {
        let idx = candidates?.iter().copied().find(|&i| !used[i])?;
        used[idx] = true;
        Some(idx)
    };

    let mut pairs = Vec::new();
    let mut leftover = Vec::new();
    for (idx, source) in sources.iter().enumerate() {
        match take(by_line.get(&(source.rule.as_str(), source.component.as_str(), source.line))) {
            Some(dest) => pairs.push((idx, dest)),
            None => leftover.push(idx),
        }
    }

    let mut unmatched = Vec::new();
    for idx in leftover {
        let source = &sources[idx];
        let key = (
            source.rule.as_str(),
            source.component.as_str(),
            source.message.as_str(),
        );
        match take(by_message.get(&key)) {
            Some(dest) => pairs.push((idx, dest)),
            None => unmatched.push(idx),
        }
    }

    pairs.sort_unstable();
    (pairs, unmatched)
}

async fn apply_updates<D: DestinationClient>(
    destination: &D,
    kind: FindingKind,
    key: &str,
    updates: &[FindingUpdate],
) -> Result<(), RemoteError> {
    for update in updates {
        match (kind, update) {
            (_, FindingUpdate::Transition(transition)) => {
                destination.transition_issue(key, transition).await?
            }
            (_, FindingUpdate::Review { status, resolution }) => {
                destination
                    .change_hotspot_status(key, status, resolution.as_deref())
                    .await?
            }
            (FindingKind::Issue, FindingUpdate::Comment(text)) => {
                destination.add_issue_comment(key, text).await?
            }
            (FindingKind::Hotspot, FindingUpdate::Comment(text)) => {
                destination.add_hotspot_comment(key, text).await?
            }
        }
    }
    Ok(())
}

/// Result of syncing one kind of finding on one branch.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub step: StepResult,
    /// Source keys now in sync on the destination.
    pub synced: Vec<String>,
}

fn summarize_errors(errors: &[String]) -> String {
    let mut message = errors
        .iter()
        .take(MAX_REPORTED_ERRORS)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if errors.len() > MAX_REPORTED_ERRORS {
        message.push_str(&format!(" (+{} more)", errors.len() - MAX_REPORTED_ERRORS));
    }
    message
}

/// Replay source review state onto the destination findings of one branch.
///
/// In incremental mode findings already recorded in `tracker` are skipped.
/// The tracker is only read; callers record [`SyncOutcome::synced`].
pub async fn sync_findings<D: DestinationClient + Clone + 'static>(
    ctx: &RunContext,
    destination: &D,
    kind: FindingKind,
    project_key: &str,
    branch: &str,
    sources: Vec<SourceFinding>,
    tracker: &StateTracker,
) -> SyncOutcome {
    let started = Instant::now();
    let step_name = kind.step_name(branch);

    let total = sources.len();
    let sources: Vec<SourceFinding> = if ctx.options().incremental {
        sources
            .into_iter()
            .filter(|s| !tracker.is_issue_processed(&s.key))
            .collect()
    } else {
        sources
    };
    let previously_synced = total - sources.len();

    if sources.is_empty() {
        return SyncOutcome {
            step: StepResult::success(
                step_name,
                Some(format!("nothing to sync ({previously_synced} previously synced)")),
            )
            .with_duration(started.elapsed()),
            synced: Vec::new(),
        };
    }

    let mut pages = Paginator::new(DEFAULT_PAGE_SIZE, |page, size| match kind {
        FindingKind::Issue => destination.search_issues(project_key, branch, page, size),
        FindingKind::Hotspot => destination.search_hotspots(project_key, branch, page, size),
    });
    let remote = match pages.collect_all().await {
        Ok(remote) => remote,
        Err(e) => {
            return SyncOutcome {
                step: StepResult::failed(
                    step_name,
                    format!(
                        "listing destination {} failed: {}",
                        kind.label(),
                        short_error_message(&e)
                    ),
                )
                .with_duration(started.elapsed()),
                synced: Vec::new(),
            };
        }
    };

    let (pairs, unmatched) = match_findings(&sources, &remote);

    let mut synced = Vec::new();
    let mut work = Vec::new();
    for (src, dst) in pairs {
        let updates = plan_updates(kind, &sources[src], &remote[dst]);
        if updates.is_empty() {
            synced.push(sources[src].key.clone());
        } else {
            work.push((sources[src].key.clone(), remote[dst].key.clone(), updates));
        }
    }
    let unchanged = synced.len();

    if !unmatched.is_empty() {
        tracing::debug!(
            project = project_key,
            branch,
            kind = kind.label(),
            unmatched = unmatched.len(),
            "Source findings without destination counterpart"
        );
    }

    let concurrency = kind.concurrency(ctx).clamp(1, work.len().max(1));
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(work.len());

    for (source_key, destination_key, updates) in work {
        let destination = destination.clone();
        let semaphore = Arc::clone(&semaphore);

        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        source_key,
                        Err(RemoteError::network("Semaphore closed unexpectedly")),
                    );
                }
            };
            let result = apply_updates(&destination, kind, &destination_key, &updates).await;
            (source_key, result)
        }));
    }

    let mut applied = 0;
    let mut errors = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((key, Ok(()))) => {
                applied += 1;
                synced.push(key);
            }
            Ok((key, Err(e))) => errors.push(format!("{key}: {}", short_error_message(&e))),
            Err(e) => errors.push(format!("Task panic: {e}")),
        }
    }

    ctx.emit(MigrationProgress::FindingsSynced {
        project: project_key.to_string(),
        branch: branch.to_string(),
        kind: kind.label(),
        applied,
        failed: errors.len(),
    });

    let detail = format!(
        "{applied} updated, {unchanged} unchanged, {} unmatched, {previously_synced} previously synced",
        unmatched.len()
    );
    let step = if errors.is_empty() {
        StepResult::success(step_name, Some(detail))
    } else if applied + unchanged == 0 {
        StepResult::failed(step_name, summarize_errors(&errors))
    } else {
        StepResult::partial(step_name, detail, summarize_errors(&errors))
    };

    SyncOutcome {
        step: step.with_duration(started.elapsed()),
        synced,
    }
}

/// Sync the issues of a branch snapshot.
pub async fn sync_issues<D: DestinationClient + Clone + 'static>(
    ctx: &RunContext,
    destination: &D,
    project_key: &str,
    branch: &str,
    issues: &[Issue],
    tracker: &StateTracker,
) -> SyncOutcome {
    let sources = issues.iter().map(SourceFinding::from).collect();
    sync_findings(ctx, destination, FindingKind::Issue, project_key, branch, sources, tracker).await
}

/// Sync the hotspots of a branch snapshot.
pub async fn sync_hotspots<D: DestinationClient + Clone + 'static>(
    ctx: &RunContext,
    destination: &D,
    project_key: &str,
    branch: &str,
    hotspots: &[Hotspot],
    tracker: &StateTracker,
) -> SyncOutcome {
    let sources = hotspots.iter().map(SourceFinding::from).collect();
    sync_findings(ctx, destination, FindingKind::Hotspot, project_key, branch, sources, tracker)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::results::StepStatus;
    use crate::migrate::testing::FakeDestination;
    use crate::migrate::{RunContext, TransferOptions};

    fn source(key: &str, line: Option<u32>, status: &str, resolution: Option<&str>) -> SourceFinding {
        SourceFinding {
            key: key.to_string(),
            rule: "java:S100".to_string(),
            component: "src/Main.java".to_string(),
            line,
            message: format!("message {key}"),
            status: status.to_string(),
            resolution: resolution.map(str::to_string),
            comments: Vec::new(),
        }
    }

    fn remote(key: &str, line: Option<u32>, message: &str) -> RemoteFinding {
        RemoteFinding {
            key: key.to_string(),
            rule: "java:S100".to_string(),
            component: "src/Main.java".to_string(),
            line,
            message: message.to_string(),
            status: "OPEN".to_string(),
            resolution: None,
            comments: Vec::new(),
        }
    }

    fn context(incremental: bool) -> RunContext {
        RunContext::builder()
            .state_dir("unused")
            .options(TransferOptions {
                incremental,
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    async fn tracker_with(processed: &[&str]) -> (tempfile::TempDir, StateTracker) {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = StateTracker::for_project(dir.path(), "p");
        tracker.initialize().await.unwrap();
        tracker.mark_issues_processed(processed.iter().copied()).unwrap();
        (dir, tracker)
    }

    #[test]
    fn transitions_follow_resolution_then_status() {
        assert_eq!(issue_transition("RESOLVED", Some("FALSE-POSITIVE")), Some("falsepositive"));
        assert_eq!(issue_transition("RESOLVED", Some("WONTFIX")), Some("wontfix"));
        assert_eq!(issue_transition("ACCEPTED", None), Some("accept"));
        assert_eq!(issue_transition("CONFIRMED", None), Some("confirm"));
        assert_eq!(issue_transition("OPEN", None), None);
        assert_eq!(issue_transition("RESOLVED", Some("FIXED")), None);
    }

    #[test]
    fn matching_prefers_line_then_message() {
        let sources = vec![
            source("a", Some(10), "OPEN", None),
            source("b", Some(99), "OPEN", None),
            source("c", Some(1), "OPEN", None),
        ];
        let destinations = vec![
            remote("d1", Some(42), "message b"),
            remote("d2", Some(10), "something else"),
        ];

        let (pairs, unmatched) = match_findings(&sources, &destinations);

        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
        assert_eq!(unmatched, vec![2]);
    }

    #[test]
    fn destination_findings_are_used_once() {
        let sources = vec![source("a", Some(5), "OPEN", None), source("b", Some(5), "OPEN", None)];
        let destinations = vec![remote("d1", Some(5), "x")];
        let (pairs, unmatched) = match_findings(&sources, &destinations);
        assert_eq!(pairs, vec![(0, 0)]);
        assert_eq!(unmatched, vec![1]);
    }

    #[test]
    fn plan_skips_state_already_matching() {
        let mut src = source("a", Some(1), "RESOLVED", Some("WONTFIX"));
        src.comments = vec!["kept".to_string(), "new".to_string()];
        let mut dst = remote("d", Some(1), "m");
        dst.status = "RESOLVED".to_string();
        dst.resolution = Some("WONTFIX".to_string());
        dst.comments = vec!["kept".to_string()];

        let updates = plan_updates(FindingKind::Issue, &src, &dst);

        assert_eq!(updates, vec![FindingUpdate::Comment("new".to_string())]);
    }

    #[test]
    fn plan_reviews_hotspots() {
        let src = source("h", Some(1), "REVIEWED", Some("SAFE"));
        let dst = remote("d", Some(1), "m");
        let updates = plan_updates(FindingKind::Hotspot, &src, &dst);
        assert_eq!(
            updates,
            vec![FindingUpdate::Review {
                status: "REVIEWED".to_string(),
                resolution: Some("SAFE".to_string()),
            }]
        );
        assert!(plan_updates(FindingKind::Hotspot, &source("h", None, "TO_REVIEW", None), &dst).is_empty());
    }

    #[tokio::test]
    async fn sync_applies_updates_and_reports_synced_keys() {
        let destination = FakeDestination::default();
        destination.set_issues(
            "main",
            vec![remote("d1", Some(1), "x"), remote("d2", Some(2), "y")],
        );
        let (_dir, tracker) = tracker_with(&[]).await;
        let sources = vec![
            source("a", Some(1), "RESOLVED", Some("FALSE-POSITIVE")),
            source("b", Some(2), "OPEN", None),
        ];

        let outcome = sync_findings(
            &context(true),
            &destination,
            FindingKind::Issue,
            "p",
            "main",
            sources,
            &tracker,
        )
        .await;

        assert_eq!(outcome.step.status, StepStatus::Success);
        assert_eq!(outcome.step.step_name, "issue-sync:main");
        let mut synced = outcome.synced.clone();
        synced.sort();
        assert_eq!(synced, vec!["a", "b"]);
        assert_eq!(destination.calls_to("transition_issue"), vec!["d1:falsepositive"]);
    }

    #[tokio::test]
    async fn incremental_mode_skips_processed_findings() {
        let destination = FakeDestination::default();
        let (_dir, tracker) = tracker_with(&["a"]).await;
        let sources = vec![source("a", Some(1), "RESOLVED", Some("WONTFIX"))];

        let outcome = sync_findings(
            &context(true),
            &destination,
            FindingKind::Issue,
            "p",
            "main",
            sources.clone(),
            &tracker,
        )
        .await;
        assert_eq!(outcome.step.status, StepStatus::Success);
        assert!(destination.calls_to("search_issues").is_empty());

        // Full mode looks again.
        let outcome = sync_findings(
            &context(false),
            &destination,
            FindingKind::Issue,
            "p",
            "main",
            sources,
            &tracker,
        )
        .await;
        assert_eq!(outcome.step.status, StepStatus::Success);
        assert_eq!(destination.calls_to("search_issues").len(), 1);
    }

    #[tokio::test]
    async fn listing_failure_fails_the_step() {
        let destination = FakeDestination::default();
        destination.fail_on("search_hotspots");
        let (_dir, tracker) = tracker_with(&[]).await;

        let outcome = sync_findings(
            &context(true),
            &destination,
            FindingKind::Hotspot,
            "p",
            "legacy",
            vec![source("h", Some(1), "REVIEWED", Some("SAFE"))],
            &tracker,
        )
        .await;

        assert_eq!(outcome.step.status, StepStatus::Failed);
        assert_eq!(outcome.step.step_name, "hotspot-sync:legacy");
        assert!(outcome.synced.is_empty());
    }

    #[tokio::test]
    async fn some_failed_updates_make_partial() {
        let destination = FakeDestination::default();
        destination.set_issues(
            "main",
            vec![remote("d1", Some(1), "x"), remote("d2", Some(2), "y")],
        );
        destination.fail_on("transition_issue:d2");
        let (_dir, tracker) = tracker_with(&[]).await;
        let sources = vec![
            source("a", Some(1), "CONFIRMED", None),
            source("b", Some(2), "CONFIRMED", None),
        ];

        let outcome = sync_findings(
            &context(true),
            &destination,
            FindingKind::Issue,
            "p",
            "main",
            sources,
            &tracker,
        )
        .await;

        assert_eq!(outcome.step.status, StepStatus::Partial);
        assert_eq!(outcome.synced, vec!["a"]);
        assert!(outcome.step.error.as_deref().unwrap().starts_with("b:"));
    }

    #[tokio::test]
    async fn unchanged_findings_keep_a_failed_update_partial() {
        let destination = FakeDestination::default();
        destination.set_issues(
            "main",
            vec![remote("d1", Some(1), "x"), remote("d2", Some(2), "y")],
        );
        destination.fail_on("transition_issue:d2");
        let (_dir, tracker) = tracker_with(&[]).await;
        // `a` already matches its counterpart; only `b` needs an update.
        let sources = vec![
            source("a", Some(1), "OPEN", None),
            source("b", Some(2), "CONFIRMED", None),
        ];

        let outcome = sync_findings(
            &context(true),
            &destination,
            FindingKind::Issue,
            "p",
            "main",
            sources,
            &tracker,
        )
        .await;

        assert_eq!(outcome.step.status, StepStatus::Partial);
        assert_eq!(outcome.synced, vec!["a"]);
        assert!(outcome.step.detail.as_deref().unwrap().starts_with("0 updated, 1 unchanged"));
    }

    #[tokio::test]
    async fn every_update_failing_fails_the_step() {
        let destination = FakeDestination::default();
        destination.set_hotspots("main", vec![remote("d1", Some(1), "x")]);
        destination.fail_on("change_hotspot_status");
        let (_dir, tracker) = tracker_with(&[]).await;

        let outcome = sync_findings(
            &context(true),
            &destination,
            FindingKind::Hotspot,
            "p",
            "main",
            vec![source("h", Some(1), "REVIEWED", Some("FIXED"))],
            &tracker,
        )
        .await;

        assert_eq!(outcome.step.status, StepStatus::Failed);
    }
}
