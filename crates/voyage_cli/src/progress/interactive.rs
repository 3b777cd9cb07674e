use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use voyage::migrate::{MigrationProgress, StepStatus};

/// Bars and counters, under one lock.
#[derive(Default)]
struct ProgressState {
    /// Spinner for extraction, mapping and the resource phases.
    run_bar: Option<ProgressBar>,
    /// Counts finished projects once the project count is known.
    projects_bar: Option<ProgressBar>,
    /// One spinner per project in flight.
    project_bars: HashMap<String, ProgressBar>,
    project_total: usize,
    steps_failed: usize,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn run_bar(&self, state: &mut ProgressState) -> ProgressBar {
        state
            .run_bar
            .get_or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::spinner_style());
                bar.set_prefix(format!("{:12}", "voyage"));
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            })
            .clone()
    }

    fn projects_bar(&self, state: &mut ProgressState) -> ProgressBar {
        let total = state.project_total as u64;
        state
            .projects_bar
            .get_or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(total));
                bar.set_style(Self::bar_style());
                bar.set_prefix(format!("{:12}", "projects"));
                bar
            })
            .clone()
    }

    pub fn handle(&self, event: MigrationProgress) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        match event {
            MigrationProgress::Extracting => {
                self.run_bar(&mut state).set_message("Extracting source inventory...");
            }

            MigrationProgress::Extracted { projects } => {
                self.run_bar(&mut state)
                    .set_message(format!("Extracted {projects} projects"));
            }

            MigrationProgress::Mapped {
                organizations,
                projects,
            } => {
                state.project_total = projects;
                self.run_bar(&mut state).set_message(format!(
                    "Mapped {projects} projects to {organizations} organizations"
                ));
            }

            MigrationProgress::OverridesApplied { tables, projects } => {
                state.project_total = projects;
                if tables > 0 {
                    self.run_bar(&mut state).set_message(format!(
                        "Applied {tables} edited tables, {projects} projects remain"
                    ));
                }
            }

            MigrationProgress::DryRunArtifacts { files } => {
                let bar = self.run_bar(&mut state);
                bar.finish_with_message(format!(
                    "{} Wrote {} mapping tables",
                    style("✓").green(),
                    files.len()
                ));
            }

            MigrationProgress::PhaseStarted { phase } => {
                if phase == "projects" {
                    if let Some(bar) = state.run_bar.take() {
                        let failed = state.steps_failed;
                        bar.finish_with_message(if failed == 0 {
                            format!("{} Resources migrated", style("✓").green())
                        } else {
                            format!("{} Resources migrated, {failed} steps failed", style("!").yellow())
                        });
                    }
                    self.projects_bar(&mut state);
                } else {
                    self.run_bar(&mut state)
                        .set_message(format!("Migrating {phase}..."));
                }
            }

            MigrationProgress::StepFinished { step, status, .. } => {
                if status == StepStatus::Failed {
                    state.steps_failed += 1;
                }
                if let Some(bar) = &state.run_bar {
                    bar.set_message(format!("{step} ({status})"));
                }
            }

            MigrationProgress::ProjectStarted { project, branches } => {
                let bar = ProgressBar::new(branches as u64);
                let bar = match &state.projects_bar {
                    Some(projects) => self.multi.insert_after(projects, bar),
                    None => self.multi.add(bar),
                };
                bar.set_style(Self::bar_style());
                bar.set_prefix(format!("{:12}", truncate(&project, 12)));
                bar.set_message("starting...");
                state.project_bars.insert(project, bar);
            }

            MigrationProgress::BranchStarted { project, branch } => {
                if let Some(bar) = state.project_bars.get(&project) {
                    bar.set_message(format!("uploading {branch}..."));
                }
            }

            MigrationProgress::BranchSkipped { project, .. } => {
                if let Some(bar) = state.project_bars.get(&project) {
                    bar.inc(1);
                }
            }

            MigrationProgress::FindingsSynced {
                project,
                branch,
                kind,
                applied,
                ..
            } => {
                if let Some(bar) = state.project_bars.get(&project) {
                    bar.set_message(format!("{branch}: {applied} {kind} synced"));
                }
            }

            MigrationProgress::BranchFinished { project, .. } => {
                if let Some(bar) = state.project_bars.get(&project) {
                    bar.inc(1);
                }
            }

            MigrationProgress::ProjectFinished { project, status } => {
                if let Some(bar) = state.project_bars.remove(&project) {
                    let mark = match status {
                        StepStatus::Success => style("✓").green(),
                        StepStatus::Partial => style("!").yellow(),
                        StepStatus::Failed => style("✗").red(),
                        StepStatus::Skipped => style("-").dim(),
                    };
                    bar.finish_with_message(format!("{mark} {status}"));
                }
                if let Some(bar) = &state.projects_bar {
                    bar.inc(1);
                }
            }

            MigrationProgress::RateLimitBackoff {
                operation,
                retry_after_ms,
                ..
            } => {
                let _ = self.multi.println(format!(
                    "{} {operation} rate limited, retrying in {:.1}s",
                    style("⏳").yellow(),
                    retry_after_ms as f64 / 1000.0
                ));
            }

            MigrationProgress::Warning { message } => {
                let _ = self
                    .multi
                    .println(format!("{} {message}", style("Warning:").yellow().bold()));
            }

            MigrationProgress::Cancelled => {
                let _ = self
                    .multi
                    .println(format!("{} Cancelled, remaining projects skipped", style("✗").red()));
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(bar) = state.run_bar.take() {
            bar.finish_and_clear();
        }
        if let Some(bar) = state.projects_bar.take() {
            bar.finish();
        }
        for (_, bar) in state.project_bars.drain() {
            bar.abandon();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_names() {
        assert_eq!(truncate("webapp", 12), "webapp");
    }

    #[test]
    fn truncate_shortens_long_names() {
        assert_eq!(truncate("a-very-long-project-key", 8), "a-very-…");
    }

    #[test]
    fn project_lifecycle_updates_bars() {
        let reporter = InteractiveReporter::new();
        reporter.handle(MigrationProgress::Mapped {
            organizations: 1,
            projects: 1,
        });
        reporter.handle(MigrationProgress::PhaseStarted {
            phase: "projects".to_string(),
        });
        reporter.handle(MigrationProgress::ProjectStarted {
            project: "webapp".to_string(),
            branches: 2,
        });
        reporter.handle(MigrationProgress::BranchFinished {
            project: "webapp".to_string(),
            branch: "main".to_string(),
            complete: true,
        });
        {
            let state = reporter.state.lock().unwrap();
            assert_eq!(state.project_bars["webapp"].position(), 1);
        }
        reporter.handle(MigrationProgress::ProjectFinished {
            project: "webapp".to_string(),
            status: StepStatus::Success,
        });
        let state = reporter.state.lock().unwrap();
        assert!(state.project_bars.is_empty());
        assert_eq!(state.projects_bar.as_ref().unwrap().position(), 1);
    }
}
