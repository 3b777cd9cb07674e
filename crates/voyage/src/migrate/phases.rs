//! Full server migration in three phases.
//!
//! 1. Server-wide resources: quality gates and profiles, per organization.
//! 2. Organization resources: groups, global permissions, permission
//!    templates, projects, portfolios.
//! 3. Project data: branch uploads and review-state sync, several projects at
//!    a time.
//!
//! A failure is recorded against the smallest unit it affects and the run
//! goes on. Only errors before phase 1 (extraction, validation, mapping) or
//! writing the report abort a run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};

use crate::mapping::{MappingError, OrgAssignment, build_assignments};
use crate::model::{ExtractionSnapshot, TenantConfig};
use crate::overrides::{OverrideOutcome, apply_csv_overrides, write_artifacts};
use crate::remote::{DestinationClient, RemoteError, short_error_message};
use crate::tabular::load_directory;

use super::context::RunContext;
use super::errors::{MigrateError, Result};
use super::progress::MigrationProgress;
use super::results::{MigrationReport, ProjectResult, StepResult, StepStatus, TenantResult};
use super::transfer::{Collaborators, TransferRequest, transfer_project};

/// Subdirectory of the output directory receiving dry-run tables.
pub const MAPPINGS_SUBDIR: &str = "mappings";

/// Step name of a project creation.
pub fn create_project_step(project_key: &str) -> String {
    format!("create project:{project_key}")
}

fn outcome_step(
    name: String,
    started: Instant,
    result: std::result::Result<(), RemoteError>,
) -> StepResult {
    let step = match result {
        Ok(()) => StepResult::success(name, None),
        Err(e) if e.is_already_exists() => {
            StepResult::success(name, Some("already exists".to_string()))
        }
        Err(e) => StepResult::failed(name, short_error_message(&e)),
    };
    step.with_duration(started.elapsed())
}

fn finish_scope(ctx: &RunContext, scope: &mut TenantResult, step: StepResult) {
    if step.status == StepStatus::Failed {
        tracing::warn!(
            organization = %scope.organization,
            step = %step.step_name,
            error = step.error.as_deref().unwrap_or_default(),
            "Step failed"
        );
    }
    ctx.emit(MigrationProgress::StepFinished {
        scope: scope.organization.clone(),
        step: step.step_name.clone(),
        status: step.status,
    });
    scope.steps.push(step);
}

fn phase(ctx: &RunContext, name: &str) {
    tracing::info!(phase = name, "Starting phase");
    ctx.emit(MigrationProgress::PhaseStarted {
        phase: name.to_string(),
    });
}

/// Phase 1: gates and profiles of one organization. Built-ins are skipped.
async fn migrate_server_resources<D: DestinationClient>(
    ctx: &RunContext,
    destination: &D,
    snapshot: &ExtractionSnapshot,
    assignment: &OrgAssignment,
) -> TenantResult {
    let org = assignment.org.key.as_str();
    let mut scope = TenantResult::new(org);

    for gate in &snapshot.quality_gates {
        if !assignment.quality_gates.contains(&gate.name) {
            continue;
        }
        let name = format!("gate:{}", gate.name);
        if gate.is_builtin {
            finish_scope(ctx, &mut scope, StepResult::skipped(name, "built-in"));
            continue;
        }
        let started = Instant::now();
        let result = destination.create_quality_gate(org, gate).await;
        finish_scope(ctx, &mut scope, outcome_step(name, started, result));
    }

    for profile in &snapshot.quality_profiles {
        if !assignment.quality_profiles.contains(&profile.identity()) {
            continue;
        }
        let name = format!("profile:{}/{}", profile.language, profile.name);
        if profile.is_builtin {
            finish_scope(ctx, &mut scope, StepResult::skipped(name, "built-in"));
            continue;
        }
        let started = Instant::now();
        let result = destination.restore_profile(org, profile).await;
        finish_scope(ctx, &mut scope, outcome_step(name, started, result));
    }

    scope
}

/// Phase 2 for one organization.
///
/// Returns the organization's steps and the creation failures of its
/// projects, keyed by source project key.
async fn migrate_org_resources<D: DestinationClient>(
    ctx: &RunContext,
    destination: &D,
    snapshot: &ExtractionSnapshot,
    assignment: &OrgAssignment,
) -> (TenantResult, BTreeMap<String, StepResult>) {
    let tenant = &assignment.org;
    let org = tenant.key.as_str();
    let mut scope = TenantResult::new(org);

    for group in &snapshot.groups {
        let started = Instant::now();
        let result = destination.create_group(org, group).await;
        let name = format!("group:{}", group.name);
        finish_scope(ctx, &mut scope, outcome_step(name, started, result));
    }

    for grant in &snapshot.global_permissions {
        for permission in &grant.permissions {
            let started = Instant::now();
            let result = destination
                .add_group_permission(org, &grant.group, permission)
                .await;
            let name = format!("permission:{}/{}", grant.group, permission);
            finish_scope(ctx, &mut scope, outcome_step(name, started, result));
        }
    }

    for template in &snapshot.permission_templates {
        let started = Instant::now();
        let name = format!("template:{}", template.name);
        let template_id = match destination.create_permission_template(org, template).await {
            Ok(id) => id,
            Err(e) => {
                finish_scope(ctx, &mut scope, outcome_step(name, started, Err(e)));
                continue;
            }
        };

        let mut added = 0;
        let mut errors = Vec::new();
        for permission in &template.permissions {
            for group in &permission.groups {
                match destination
                    .add_template_group_permission(&template_id, group, &permission.permission_key)
                    .await
                {
                    Ok(()) => added += 1,
                    Err(e) => errors.push(format!(
                        "{}/{}: {}",
                        group,
                        permission.permission_key,
                        short_error_message(&e)
                    )),
                }
            }
        }
        let detail = format!("{added} group permissions");
        let step = if errors.is_empty() {
            StepResult::success(name, Some(detail))
        } else {
            StepResult::partial(name, detail, errors.join("; "))
        };
        finish_scope(ctx, &mut scope, step.with_duration(started.elapsed()));
    }

    let mut creation_failures = BTreeMap::new();
    for project_key in &assignment.projects {
        let Some(project) = snapshot.project(project_key) else {
            continue;
        };
        let destination_key = tenant.destination_key(project_key);
        let name = create_project_step(project_key);
        let started = Instant::now();

        let result = match destination.project_exists(&destination_key).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                let main = project.main_branch().map_or("main", |b| b.name.as_str());
                destination
                    .create_project(org, &destination_key, &project.name, main)
                    .await
            }
            Err(e) => Err(e),
        };
        let step = outcome_step(name, started, result);
        if step.status == StepStatus::Failed {
            creation_failures.insert(project_key.clone(), step.clone());
        }
        finish_scope(ctx, &mut scope, step);
    }

    for portfolio in &snapshot.portfolios {
        if !assignment.portfolios.contains(&portfolio.key) {
            continue;
        }
        let started = Instant::now();
        let name = format!("portfolio:{}", portfolio.key);
        if let Err(e) = destination.create_portfolio(org, portfolio).await
            && !e.is_already_exists()
        {
            finish_scope(ctx, &mut scope, outcome_step(name, started, Err(e)));
            continue;
        }

        let mut errors = Vec::new();
        let members = portfolio.projects.iter().filter(|p| {
            assignment.has_project(p.as_str()) && !creation_failures.contains_key(p.as_str())
        });
        for member in members {
            let member_key = tenant.destination_key(member);
            if let Err(e) = destination.add_portfolio_project(&portfolio.key, &member_key).await {
                errors.push(format!("{member}: {}", short_error_message(&e)));
            }
        }
        let step = if errors.is_empty() {
            StepResult::success(name, None)
        } else {
            StepResult::partial(name, "some projects not added".to_string(), errors.join("; "))
        };
        finish_scope(ctx, &mut scope, step.with_duration(started.elapsed()));
    }

    (scope, creation_failures)
}

struct ProjectJob {
    order: usize,
    project_key: String,
    tenant: TenantConfig,
    branches: Option<BTreeSet<String>>,
}

/// Phase 3: transfer projects with at most `project_migration` in flight.
async fn transfer_projects<D: DestinationClient + Clone + 'static>(
    ctx: &RunContext,
    clients: &Collaborators<D>,
    jobs: Vec<ProjectJob>,
) -> Vec<(usize, ProjectResult)> {
    let semaphore = Arc::new(Semaphore::new(ctx.concurrency().project_migration));
    let mut set = JoinSet::new();
    let mut spawned: HashMap<task::Id, (usize, String, String)> = HashMap::new();

    for job in jobs {
        let ctx = ctx.clone();
        let clients = clients.clone();
        let semaphore = Arc::clone(&semaphore);
        let entry = (job.order, job.project_key.clone(), job.tenant.key.clone());

        let handle = set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let mut result = if ctx.is_shutdown_requested() {
                let mut cancelled = ProjectResult::new(&job.project_key, &job.tenant.key);
                cancelled.push(StepResult::skipped("transfer", "cancelled"));
                cancelled
            } else {
                let mut tracker = ctx.state_tracker(&job.project_key);
                let request = TransferRequest::new(&job.project_key, &job.tenant)
                    .with_branches(job.branches.as_ref());
                transfer_project(&ctx, &clients, request, &mut tracker).await
            };
            result.organization = job.tenant.key.clone();
            (job.order, result)
        });
        spawned.insert(handle.id(), entry);
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((_, entry)) => results.push(entry),
            Err(e) => {
                // A task that died still gets a row in the report.
                let Some((order, project_key, organization)) = spawned.remove(&e.id()) else {
                    tracing::error!(error = %e, "Unknown project task failed");
                    continue;
                };
                tracing::error!(project = %project_key, error = %e, "Project task panicked");
                let mut failed = ProjectResult::new(&project_key, &organization);
                failed.fail(StepResult::failed("transfer", format!("task aborted: {e}")));
                results.push((order, failed));
            }
        }
    }
    results
}

fn load_overrides(
    ctx: &RunContext,
    snapshot: &ExtractionSnapshot,
    assignments: &[OrgAssignment],
) -> OverrideOutcome {
    let tables = ctx.mappings_dir().map(load_directory).unwrap_or_default();
    let outcome = apply_csv_overrides(&tables, snapshot, assignments);
    ctx.emit(MigrationProgress::OverridesApplied {
        tables: tables.len(),
        projects: outcome.snapshot.projects.len(),
    });
    outcome
}

async fn write_report(ctx: &RunContext, report: &mut MigrationReport) -> Result<()> {
    report.finish();
    let path = report
        .write_to(ctx.output_dir())
        .await
        .map_err(|e| MigrateError::Io {
            path: ctx.output_dir().display().to_string(),
            message: e.to_string(),
        })?;
    tracing::info!(
        report = %path.display(),
        succeeded = report.summary.succeeded,
        partial = report.summary.partial,
        failed = report.summary.failed,
        "Migration report written"
    );
    Ok(())
}

/// Migrate a whole source server into `tenants`.
///
/// # Errors
///
/// An empty `tenants` list fails before any remote call. Extraction,
/// validation and mapping errors abort before anything is written. Everything after that is recorded in the returned report, which
/// is also written to the output directory.
#[tracing::instrument(skip_all, fields(organizations = tenants.len(), dry_run = ctx.is_dry_run()))]
pub async fn run_migration<D: DestinationClient + Clone + 'static>(
    ctx: &RunContext,
    clients: &Collaborators<D>,
    tenants: &[TenantConfig],
) -> Result<MigrationReport> {
    // Configuration errors abort before the source is contacted.
    if tenants.is_empty() {
        return Err(MappingError::NoTenants.into());
    }
    let mut report = MigrationReport::new(ctx.is_dry_run());

    ctx.emit(MigrationProgress::Extracting);
    let snapshot = clients
        .extractor
        .extract_all(&ctx.extract_options())
        .await?;
    snapshot.validate()?;
    ctx.emit(MigrationProgress::Extracted {
        projects: snapshot.projects.len(),
    });

    let assignments = build_assignments(&snapshot, tenants)?;
    ctx.emit(MigrationProgress::Mapped {
        organizations: assignments.len(),
        projects: snapshot.projects.len(),
    });

    let OverrideOutcome {
        snapshot,
        assignments,
        branch_includes,
    } = load_overrides(ctx, &snapshot, &assignments);

    if ctx.is_dry_run() {
        let dir = ctx.output_dir().join(MAPPINGS_SUBDIR);
        report.artifacts = write_artifacts(&dir, &snapshot, &assignments)?;
        ctx.emit(MigrationProgress::DryRunArtifacts {
            files: report.artifacts.clone(),
        });
        write_report(ctx, &mut report).await?;
        return Ok(report);
    }

    phase(ctx, "server resources");
    for assignment in &assignments {
        let scope =
            migrate_server_resources(ctx, &clients.destination, &snapshot, assignment).await;
        report.server.push(scope);
    }

    phase(ctx, "organization resources");
    let mut creation_failures = BTreeMap::new();
    for assignment in &assignments {
        let (scope, failures) =
            migrate_org_resources(ctx, &clients.destination, &snapshot, assignment).await;
        report.organizations.push(scope);
        creation_failures.extend(failures);
    }

    phase(ctx, "projects");
    let mut jobs = Vec::new();
    let mut finished: Vec<(usize, ProjectResult)> = Vec::new();
    let ordered = assignments
        .iter()
        .flat_map(|a| a.projects.iter().map(move |p| (a, p)));
    for (order, (assignment, project_key)) in ordered.enumerate() {
        if let Some(step) = creation_failures.remove(project_key) {
            let mut failed = ProjectResult::new(project_key, &assignment.org.key);
            failed.fail(step);
            finished.push((order, failed));
            continue;
        }
        jobs.push(ProjectJob {
            order,
            project_key: project_key.clone(),
            tenant: assignment.org.clone(),
            branches: branch_includes.get(project_key).cloned(),
        });
    }
    finished.extend(transfer_projects(ctx, clients, jobs).await);
    finished.sort_by_key(|(order, _)| *order);
    report.projects = finished.into_iter().map(|(_, result)| result).collect();

    if ctx.is_shutdown_requested() {
        ctx.emit(MigrationProgress::Cancelled);
    }

    write_report(ctx, &mut report).await?;
    Ok(report)
}
