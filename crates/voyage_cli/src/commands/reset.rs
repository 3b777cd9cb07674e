//! `voyage reset`: forget what was transferred for a project.

use std::io::{self, Write};

use console::style;
use voyage::state::StateTracker;

use crate::config::Config;

pub(crate) async fn handle_reset(
    project: &str,
    skip_confirm: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tracker = StateTracker::for_project(&config.state_dir(), project);
    if !tracker.path().exists() {
        println!("No transfer recorded for '{}', nothing to reset", style(project).cyan());
        return Ok(());
    }
    tracker.initialize().await?;

    if !skip_confirm {
        let (branches, findings) = tracker.state().map_or((0, 0), |s| {
            (s.completed_branches.len(), s.processed_issue_ids.len())
        });
        println!(
            "{} About to reset '{}' ({} completed branches, {} processed findings)",
            style("⚠").yellow().bold(),
            style(project).cyan(),
            branches,
            findings
        );
        println!(
            "  {} the next transfer re-uploads every branch",
            style("Warning:").yellow().bold()
        );

        print!("Continue? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    tracker.reset().await?;
    println!(
        "{} Reset state for '{}'",
        style("✓").green().bold(),
        style(project).cyan()
    );
    Ok(())
}
