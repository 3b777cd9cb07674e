//! Plain summary tables printed after a command finishes.

use console::style;
use tabled::{Table, Tabled, settings::Style};

use voyage::migrate::{MigrationReport, ProjectResult, StepResult, StepStatus, TenantResult};

#[derive(Debug, Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
    #[tabled(rename = "Time")]
    time: String,
}

impl From<&StepResult> for StepRow {
    fn from(step: &StepResult) -> Self {
        let detail = match (&step.detail, &step.error) {
            (Some(detail), Some(error)) => format!("{detail}: {error}"),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        };
        Self {
            step: step.step_name.clone(),
            status: step.status.to_string(),
            detail,
            time: format_duration_ms(step.duration_ms),
        }
    }
}

#[derive(Debug, Tabled)]
struct ProjectRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Organization")]
    organization: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Branches")]
    branches: String,
    #[tabled(rename = "Failed steps")]
    failed: String,
    #[tabled(rename = "Time")]
    time: String,
}

impl From<&ProjectResult> for ProjectRow {
    fn from(result: &ProjectResult) -> Self {
        let failed: Vec<&str> = result
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| s.step_name.as_str())
            .collect();
        Self {
            project: result.project_key.clone(),
            organization: result.organization.clone(),
            status: result.status().to_string(),
            branches: result.branches_transferred.join(", "),
            failed: failed.join(", "),
            time: format_duration_ms(result.duration_ms),
        }
    }
}

pub(crate) fn format_duration_ms(ms: u64) -> String {
    match ms {
        0..1_000 => format!("{ms}ms"),
        1_000..60_000 => format!("{:.1}s", ms as f64 / 1000.0),
        _ => format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000),
    }
}

fn status_mark(status: StepStatus) -> String {
    match status {
        StepStatus::Success => style("✓").green().bold().to_string(),
        StepStatus::Partial => style("!").yellow().bold().to_string(),
        StepStatus::Failed => style("✗").red().bold().to_string(),
        StepStatus::Skipped => style("-").dim().to_string(),
    }
}

fn print_table<R: Tabled>(rows: impl IntoIterator<Item = R>) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

/// Steps of one project transfer.
pub(crate) fn print_project(result: &ProjectResult) {
    println!(
        "{} {} -> {} ({})",
        status_mark(result.status()),
        style(&result.project_key).cyan(),
        result.organization,
        result.status()
    );
    print_table(result.steps.iter().map(StepRow::from));
}

/// Resource steps that did not succeed, per scope.
fn print_resource_problems(label: &str, scopes: &[TenantResult]) {
    for scope in scopes {
        let problems: Vec<StepRow> = scope
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Partial))
            .map(StepRow::from)
            .collect();
        if problems.is_empty() {
            continue;
        }
        println!(
            "{} {label} steps with problems in {}",
            status_mark(scope.status()),
            style(&scope.organization).cyan()
        );
        print_table(problems);
    }
}

/// Whole-run summary: problem steps, one row per project, totals.
pub(crate) fn print_report(report: &MigrationReport) {
    if report.dry_run {
        println!("{} Dry run, nothing was written to the destination", style("ℹ").blue());
        for file in &report.artifacts {
            println!("  {}", file.display());
        }
        println!("Edit the tables and pass their directory with --mappings to apply them.");
        return;
    }

    print_resource_problems("Server", &report.server);
    print_resource_problems("Organization", &report.organizations);

    if !report.projects.is_empty() {
        print_table(report.projects.iter().map(ProjectRow::from));
    }

    let s = report.summary;
    println!(
        "{} succeeded, {} partial, {} failed, {} skipped",
        style(s.succeeded).green(),
        style(s.partial).yellow(),
        style(s.failed).red(),
        style(s.skipped).dim()
    );
}
