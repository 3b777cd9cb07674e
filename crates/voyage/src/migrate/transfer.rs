use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use crate::model::{ProjectSnapshot, TenantConfig};
use crate::remote::{
    DestinationClient, Extractor, ReportPipeline, Result as RemoteResult, short_error_message,
};
use crate::state::{StateTracker, TransferStats};

use super::context::RunContext;
use super::issues::{SyncOutcome, sync_hotspots, sync_issues};
use super::progress::MigrationProgress;
use super::results::{ProjectResult, StepResult};

pub const STEP_RESOLVE: &str = "resolve project";
pub const STEP_TEST_CONNECTIONS: &str = "test connections";
pub const STEP_LOAD_STATE: &str = "load state";
pub const STEP_EXTRACT: &str = "extract project";
pub const STEP_PERSIST: &str = "persist state";

/// Step name of a branch upload, e.g. `upload:main`.
pub fn upload_step(branch: &str) -> String {
    format!("upload:{branch}")
}

/// Source, report pipeline and destination of a run.
pub struct Collaborators<D> {
    pub extractor: Arc<dyn Extractor>,
    pub pipeline: Arc<dyn ReportPipeline>,
    pub destination: D,
}

impl<D> Collaborators<D> {
    pub fn new(
        extractor: impl Extractor + 'static,
        pipeline: impl ReportPipeline + 'static,
        destination: D,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            pipeline: Arc::new(pipeline),
            destination,
        }
    }
}

impl<D: Clone> Clone for Collaborators<D> {
    fn clone(&self) -> Self {
        Self {
            extractor: Arc::clone(&self.extractor),
            pipeline: Arc::clone(&self.pipeline),
            destination: self.destination.clone(),
        }
    }
}

/// One project to transfer into one tenant.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub project_key: &'a str,
    pub tenant: &'a TenantConfig,
    /// Branches allowed besides the main branch; `None` allows all.
    pub branches: Option<&'a BTreeSet<String>>,
}

impl<'a> TransferRequest<'a> {
    pub fn new(project_key: &'a str, tenant: &'a TenantConfig) -> Self {
        Self {
            project_key,
            tenant,
            branches: None,
        }
    }

    pub fn with_branches(mut self, branches: Option<&'a BTreeSet<String>>) -> Self {
        self.branches = branches;
        self
    }

    fn includes(&self, branch: &str) -> bool {
        self.branches.is_none_or(|b| b.contains(branch))
    }
}

fn branch_stats(snapshot: &ProjectSnapshot) -> TransferStats {
    TransferStats {
        issues_transferred: snapshot.issues.len() as u64,
        components_transferred: snapshot.metrics.components,
        sources_transferred: snapshot.metrics.sources,
        lines_of_code: snapshot.metrics.lines_of_code,
    }
}

/// Build, encode and upload one branch snapshot.
async fn upload_snapshot(
    ctx: &RunContext,
    pipeline: &dyn ReportPipeline,
    snapshot: &ProjectSnapshot,
    tenant: &TenantConfig,
) -> RemoteResult<String> {
    let messages = pipeline.build_all(snapshot, tenant)?;
    let payload = pipeline.encode_all(&messages)?;
    if ctx.options().wait_for_analysis {
        let analysis = pipeline.upload_and_wait(payload, &messages.metadata).await?;
        Ok(format!("analysis {} succeeded", analysis.task_id))
    } else {
        let handle = pipeline.upload(payload, &messages.metadata).await?;
        Ok(format!("submitted task {}", handle.task_id))
    }
}

fn record_sync(tracker: &mut StateTracker, result: &mut ProjectResult, outcome: SyncOutcome) -> bool {
    if let Err(e) = tracker.mark_issues_processed(outcome.synced) {
        tracing::warn!(project = %result.project_key, error = %e, "Could not record synced findings");
    }
    let ok = outcome.step.is_success();
    result.push(outcome.step);
    ok
}

/// Upload one branch and replay its review state.
///
/// Returns whether the upload succeeded. The branch is marked completed only
/// when every step succeeded; state is persisted either way.
async fn transfer_branch<D: DestinationClient + Clone + 'static>(
    ctx: &RunContext,
    clients: &Collaborators<D>,
    request: &TransferRequest<'_>,
    snapshot: &ProjectSnapshot,
    tracker: &mut StateTracker,
    result: &mut ProjectResult,
    stats: &mut TransferStats,
) -> bool {
    let branch = snapshot.branch.as_str();
    let destination_key = request.tenant.destination_key(request.project_key);
    ctx.emit(MigrationProgress::BranchStarted {
        project: request.project_key.to_string(),
        branch: branch.to_string(),
    });

    let started = Instant::now();
    match upload_snapshot(ctx, clients.pipeline.as_ref(), snapshot, request.tenant).await {
        Ok(detail) => {
            result.push(
                StepResult::success(upload_step(branch), Some(detail))
                    .with_duration(started.elapsed()),
            );
        }
        Err(e) => {
            result.push(
                StepResult::failed(upload_step(branch), short_error_message(&e))
                    .with_duration(started.elapsed()),
            );
            ctx.emit(MigrationProgress::BranchFinished {
                project: request.project_key.to_string(),
                branch: branch.to_string(),
                complete: false,
            });
            return false;
        }
    }
    result.branches_transferred.push(branch.to_string());
    stats.add(branch_stats(snapshot));

    let mut complete = true;
    if ctx.options().sync_issues {
        let outcome = sync_issues(
            ctx,
            &clients.destination,
            &destination_key,
            branch,
            &snapshot.issues,
            tracker,
        )
        .await;
        complete &= record_sync(tracker, result, outcome);
    }
    if ctx.options().sync_hotspots {
        let outcome = sync_hotspots(
            ctx,
            &clients.destination,
            &destination_key,
            branch,
            &snapshot.hotspots,
            tracker,
        )
        .await;
        complete &= record_sync(tracker, result, outcome);
    }

    if complete && let Err(e) = tracker.mark_branch_completed(branch) {
        tracing::warn!(project = request.project_key, branch, error = %e, "Could not mark branch completed");
    }
    if let Err(e) = tracker.persist().await {
        result.push(StepResult::failed(STEP_PERSIST, e.to_string()));
    }

    ctx.emit(MigrationProgress::BranchFinished {
        project: request.project_key.to_string(),
        branch: branch.to_string(),
        complete,
    });
    true
}

fn skip_branch(ctx: &RunContext, result: &mut ProjectResult, branch: &str, reason: &str) {
    tracing::debug!(project = %result.project_key, branch, reason, "Skipping branch");
    result.push(StepResult::skipped(upload_step(branch), reason));
    ctx.emit(MigrationProgress::BranchSkipped {
        project: result.project_key.clone(),
        branch: branch.to_string(),
        reason: reason.to_string(),
    });
}

fn finish(ctx: &RunContext, mut result: ProjectResult, started: Instant) -> ProjectResult {
    result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = result.status();
    tracing::info!(
        project = %result.project_key,
        organization = %result.organization,
        status = %status,
        branches = result.branches_transferred.len(),
        "Project finished"
    );
    ctx.emit(MigrationProgress::ProjectFinished {
        project: result.project_key.clone(),
        status,
    });
    result
}

/// Transfer one project, main branch first, resuming from `tracker`.
///
/// Never returns an error: every failure is recorded as a step. A failure to
/// extract or upload the main branch is fatal and the remaining branches are
/// skipped. A failing additional branch does not stop the others.
#[tracing::instrument(skip_all, fields(project = request.project_key, organization = %request.tenant.key))]
pub async fn transfer_project<D: DestinationClient + Clone + 'static>(
    ctx: &RunContext,
    clients: &Collaborators<D>,
    request: TransferRequest<'_>,
    tracker: &mut StateTracker,
) -> ProjectResult {
    let started = Instant::now();
    let destination_key = request.tenant.destination_key(request.project_key);
    let mut result = ProjectResult::new(request.project_key, &request.tenant.key);
    result.push(StepResult::success(
        STEP_RESOLVE,
        Some(format!(
            "{} -> {}/{}",
            request.project_key, request.tenant.key, destination_key
        )),
    ));

    if ctx.options().test_connections {
        let step_started = Instant::now();
        let checked = match clients.extractor.test_connection().await {
            Err(e) => Err(format!("source: {e}")),
            Ok(()) => clients
                .destination
                .test_connection()
                .await
                .map_err(|e| format!("destination: {}", short_error_message(&e))),
        };
        match checked {
            Ok(()) => result.push(
                StepResult::success(STEP_TEST_CONNECTIONS, None).with_duration(step_started.elapsed()),
            ),
            Err(message) => {
                result.fail(StepResult::failed(STEP_TEST_CONNECTIONS, message));
                return finish(ctx, result, started);
            }
        }
    }

    if let Err(e) = tracker.initialize().await {
        result.fail(StepResult::failed(STEP_LOAD_STATE, e.to_string()));
        return finish(ctx, result, started);
    }

    let options = ctx.extract_options();
    let main = match clients
        .extractor
        .extract_project(request.project_key, &options)
        .await
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            result.fail(StepResult::failed(STEP_EXTRACT, e.to_string()));
            return finish(ctx, result, started);
        }
    };

    ctx.emit(MigrationProgress::ProjectStarted {
        project: request.project_key.to_string(),
        branches: main.project.branches.len(),
    });

    if !request.includes(&main.branch) {
        tracing::warn!(
            project = request.project_key,
            branch = %main.branch,
            "Main branch excluded by mappings, transferring it anyway"
        );
    }

    let mut stats = TransferStats::default();
    if tracker.is_branch_completed(&main.branch) {
        skip_branch(ctx, &mut result, &main.branch, "already completed");
    } else if !transfer_branch(
        ctx,
        clients,
        &request,
        &main,
        tracker,
        &mut result,
        &mut stats,
    )
    .await
    {
        result.fatal = true;
    }

    for branch in main.project.other_branches() {
        let name = branch.name.as_str();
        let skip_reason = if result.fatal {
            Some("main branch failed")
        } else if ctx.is_shutdown_requested() {
            Some("cancelled")
        } else if !request.includes(name) {
            Some("excluded by mappings")
        } else if tracker.is_branch_completed(name) {
            Some("already completed")
        } else {
            None
        };
        if let Some(reason) = skip_reason {
            skip_branch(ctx, &mut result, name, reason);
            continue;
        }

        let step_started = Instant::now();
        let snapshot = match clients.extractor.extract_branch(name, &main, &options).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                result.push(
                    StepResult::failed(upload_step(name), format!("extraction failed: {e}"))
                        .with_duration(step_started.elapsed()),
                );
                continue;
            }
        };

        transfer_branch(
            ctx,
            clients,
            &request,
            &snapshot,
            tracker,
            &mut result,
            &mut stats,
        )
        .await;
    }

    if !result.branches_transferred.is_empty() {
        let recorded = match tracker.record_transfer(stats) {
            Ok(()) => tracker.persist().await,
            Err(e) => Err(e),
        };
        if let Err(e) = recorded {
            result.push(StepResult::failed(STEP_PERSIST, e.to_string()));
        }
    }

    finish(ctx, result, started)
}
