//! Integration tests for single-project transfers.
//!
//! Every test runs the real orchestrator against in-memory collaborators and
//! a temporary state directory.

mod common;

use std::time::Duration;

use voyage::migrate::{StepStatus, TransferOptions, TransferRequest, transfer_project};
use voyage::model::TenantConfig;
use voyage::state::StateTracker;

use common::*;

/// Upper bound for any single transfer; exceeding it indicates a hang.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(10);

fn options() -> TransferOptions {
    TransferOptions {
        wait_for_analysis: true,
        incremental: true,
        sync_issues: true,
        sync_hotspots: true,
        ..Default::default()
    }
}

async fn load_state(dir: &std::path::Path, key: &str) -> StateTracker {
    let mut tracker = StateTracker::for_project(dir, key);
    tracker.initialize().await.unwrap();
    tracker
}

#[tokio::test]
async fn failed_hotspot_sync_on_legacy_makes_project_partial() {
    let dir = tempfile::tempdir().unwrap();
    let (extractor, destination) = webapp_fixture();
    destination.failures.add("search_hotspots:webapp:legacy");
    let pipeline = FakePipeline::default();
    let ctx = context(dir.path(), options());
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme");
    let mut tracker = ctx.state_tracker("webapp");

    let result = tokio::time::timeout(
        TRANSFER_TIMEOUT,
        transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker),
    )
    .await
    .expect("transfer timed out");

    assert_eq!(result.status(), StepStatus::Partial);
    assert_eq!(result.branches_transferred, vec!["main", "legacy"]);
    assert_eq!(result.step("upload:legacy").unwrap().status, StepStatus::Success);
    assert_eq!(result.step("hotspot-sync:legacy").unwrap().status, StepStatus::Failed);
    assert_eq!(result.step("issue-sync:main").unwrap().status, StepStatus::Success);

    // Issue review state was replayed on main.
    let mut transitions = destination.calls_to("transition_issue");
    transitions.sort();
    assert_eq!(
        transitions,
        vec!["transition_issue:D-0:falsepositive", "transition_issue:D-1:confirm"]
    );
    assert_eq!(destination.calls_to("add_issue_comment").len(), 2);

    // Only the fully synced branch counts as completed.
    let saved = load_state(dir.path(), "webapp").await;
    let state = saved.state().unwrap();
    assert!(state.completed_branches.contains("main"));
    assert!(!state.completed_branches.contains("legacy"));
    assert!(state.processed_issue_ids.contains("AX-1"));
    assert!(state.processed_issue_ids.contains("AX-2"));
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].stats.issues_transferred, 2);
    assert_eq!(state.history[0].stats.lines_of_code, 240);
    assert_eq!(state.last_sync_timestamp, Some(state.history[0].timestamp));
}

#[tokio::test]
async fn resumed_transfer_does_not_reupload_completed_branches() {
    let dir = tempfile::tempdir().unwrap();
    let (extractor, destination) = webapp_fixture();
    destination.failures.add("search_hotspots:webapp:legacy");
    let pipeline = FakePipeline::default();
    let ctx = context(dir.path(), options());
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme");

    let mut tracker = ctx.state_tracker("webapp");
    transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;
    assert_eq!(pipeline.uploaded_branches(), vec!["main", "legacy"]);

    // The next run starts from the persisted state only.
    destination.failures.clear();
    let mut tracker = ctx.state_tracker("webapp");
    let result =
        transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;

    assert_eq!(result.status(), StepStatus::Success);
    assert_eq!(pipeline.uploaded_branches(), vec!["main", "legacy", "legacy"]);
    assert_eq!(result.step("upload:main").unwrap().status, StepStatus::Skipped);
    assert_eq!(result.branches_transferred, vec!["legacy"]);
    assert_eq!(
        destination.calls_to("change_hotspot_status"),
        vec!["change_hotspot_status:DH-1:REVIEWED:SAFE"]
    );

    let saved = load_state(dir.path(), "webapp").await;
    let state = saved.state().unwrap();
    assert!(state.completed_branches.contains("legacy"));
    assert_eq!(state.history.len(), 2);

    // A third run has nothing left to do.
    let mut tracker = ctx.state_tracker("webapp");
    let result =
        transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;
    assert_eq!(pipeline.uploads().len(), 3);
    assert!(result.branches_transferred.is_empty());
    assert_eq!(result.status(), StepStatus::Success);
}

#[tokio::test]
async fn main_upload_failure_skips_remaining_branches() {
    let dir = tempfile::tempdir().unwrap();
    let (extractor, destination) = webapp_fixture();
    let pipeline = FakePipeline::default();
    pipeline.failures.add("upload:webapp:main");
    let ctx = context(dir.path(), options());
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme");
    let mut tracker = ctx.state_tracker("webapp");

    let result =
        transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;

    assert_eq!(result.status(), StepStatus::Failed);
    assert!(result.fatal);
    assert!(result.branches_transferred.is_empty());
    let legacy = result.step("upload:legacy").unwrap();
    assert_eq!(legacy.status, StepStatus::Skipped);
    assert_eq!(legacy.detail.as_deref(), Some("main branch failed"));
    assert!(pipeline.uploads().is_empty());
    assert!(destination.calls_to("search_issues").is_empty());
}

#[tokio::test]
async fn unknown_project_fails_without_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let (extractor, destination) = webapp_fixture();
    let pipeline = FakePipeline::default();
    let ctx = context(dir.path(), options());
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme");
    let mut tracker = ctx.state_tracker("ghost");

    let result =
        transfer_project(&ctx, &clients, TransferRequest::new("ghost", &tenant), &mut tracker).await;

    assert_eq!(result.status(), StepStatus::Failed);
    assert_eq!(result.step("extract project").unwrap().status, StepStatus::Failed);
    assert!(pipeline.uploads().is_empty());
}

#[tokio::test]
async fn excluded_branches_are_skipped_but_main_is_always_transferred() {
    let dir = tempfile::tempdir().unwrap();
    let (extractor, destination) = webapp_fixture();
    let pipeline = FakePipeline::default();
    let ctx = context(dir.path(), options());
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme").with_prefix("acme_");
    // Neither branch is in the include-set.
    let includes = std::collections::BTreeSet::from(["feature".to_string()]);
    let mut tracker = ctx.state_tracker("webapp");

    let request = TransferRequest::new("webapp", &tenant).with_branches(Some(&includes));
    let result = transfer_project(&ctx, &clients, request, &mut tracker).await;

    assert_eq!(result.branches_transferred, vec!["main"]);
    assert_eq!(
        result.step("upload:legacy").unwrap().detail.as_deref(),
        Some("excluded by mappings")
    );
    assert_eq!(pipeline.uploads(), vec![("acme_webapp".to_string(), "main".to_string())]);
    assert!(
        destination
            .calls_to("search_issues")
            .iter()
            .all(|c| c.starts_with("search_issues:acme_webapp:"))
    );
}

#[tokio::test]
async fn full_mode_revisits_processed_issues() {
    let dir = tempfile::tempdir().unwrap();
    let (extractor, destination) = webapp_fixture();
    let pipeline = FakePipeline::default();
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme");

    let ctx = context(dir.path(), options());
    let mut tracker = ctx.state_tracker("webapp");
    transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;
    let listed = destination.calls_to("search_issues").len();

    // Forget completed branches but keep processed issue ids.
    let mut tracker = ctx.state_tracker("webapp");
    tracker.initialize().await.unwrap();
    let processed: Vec<String> = tracker.state().unwrap().processed_issue_ids.iter().cloned().collect();
    tracker.reset().await.unwrap();
    tracker.mark_issues_processed(processed).unwrap();
    tracker.persist().await.unwrap();

    // Incremental: nothing left to sync on main, no listing needed.
    let mut tracker = ctx.state_tracker("webapp");
    transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;
    assert_eq!(destination.calls_to("search_issues").len(), listed);

    // Full mode lists again.
    let full = context(
        dir.path(),
        TransferOptions {
            incremental: false,
            ..options()
        },
    );
    let mut tracker = full.state_tracker("webapp");
    tracker.initialize().await.unwrap();
    tracker.reset().await.unwrap();
    transfer_project(&full, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;
    assert!(destination.calls_to("search_issues").len() > listed);
}

#[tokio::test]
async fn fire_and_forget_uploads_without_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let (extractor, destination) = webapp_fixture();
    let pipeline = FakePipeline::default();
    let ctx = context(
        dir.path(),
        TransferOptions {
            wait_for_analysis: false,
            sync_issues: false,
            sync_hotspots: false,
            ..options()
        },
    );
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme");
    let mut tracker = ctx.state_tracker("webapp");

    let result =
        transfer_project(&ctx, &clients, TransferRequest::new("webapp", &tenant), &mut tracker).await;

    assert_eq!(result.status(), StepStatus::Success);
    let upload = result.step("upload:main").unwrap();
    assert!(upload.detail.as_deref().unwrap().starts_with("submitted task"));
    assert!(destination.calls().is_empty());
}

#[tokio::test]
async fn keys_differing_only_in_separator_keep_separate_state() {
    let dir = tempfile::tempdir().unwrap();
    let colon = project("com.acme:web", &["main"]);
    let underscore = project("com.acme_web", &["main"]);
    let extractor = FakeExtractor::new(vec![
        snapshot(&colon, "main", Vec::new(), Vec::new()),
        snapshot(&underscore, "main", Vec::new(), Vec::new()),
    ]);
    let destination = FakeDestination::default();
    let pipeline = FakePipeline::default();
    let ctx = context(dir.path(), options());
    let clients = clients(extractor, &pipeline, &destination);
    let tenant = TenantConfig::new("acme");

    let mut first = ctx.state_tracker("com.acme:web");
    let mut second = ctx.state_tracker("com.acme_web");
    assert_ne!(first.path(), second.path());

    let r1 = transfer_project(&ctx, &clients, TransferRequest::new("com.acme:web", &tenant), &mut first).await;
    let r2 =
        transfer_project(&ctx, &clients, TransferRequest::new("com.acme_web", &tenant), &mut second).await;

    assert_eq!(r1.branches_transferred, vec!["main"]);
    assert_eq!(r2.branches_transferred, vec!["main"]);
    assert_eq!(r2.step("upload:main").unwrap().status, StepStatus::Success);
    assert_eq!(
        pipeline.uploads(),
        vec![
            ("com.acme:web".to_string(), "main".to_string()),
            ("com.acme_web".to_string(), "main".to_string()),
        ]
    );
}
