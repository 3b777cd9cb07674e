//! `voyage status`: what the state file says about a project.

use console::style;
use tabled::{Table, Tabled, settings::Style};

use voyage::state::{StateTracker, SyncState};

use crate::commands::OutputFormat;
use crate::config::Config;

#[derive(Debug, Tabled)]
struct HistoryRow {
    #[tabled(rename = "Transferred at")]
    timestamp: String,
    #[tabled(rename = "Issues")]
    issues: u64,
    #[tabled(rename = "Components")]
    components: u64,
    #[tabled(rename = "Sources")]
    sources: u64,
    #[tabled(rename = "Lines of code")]
    lines_of_code: u64,
}

fn history_rows(state: &SyncState) -> Vec<HistoryRow> {
    state
        .history
        .iter()
        .map(|record| HistoryRow {
            timestamp: record.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            issues: record.stats.issues_transferred,
            components: record.stats.components_transferred,
            sources: record.stats.sources_transferred,
            lines_of_code: record.stats.lines_of_code,
        })
        .collect()
}

pub(crate) async fn handle_status(
    project: &str,
    output: OutputFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tracker = StateTracker::for_project(&config.state_dir(), project);
    let exists = tracker.path().exists();
    tracker.initialize().await?;
    let state = tracker.state().cloned().unwrap_or_default();

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        OutputFormat::Table => {
            if !exists {
                println!("No transfer recorded for '{}'", style(project).cyan());
                return Ok(());
            }
            println!("{} {}", style("Project").bold(), style(project).cyan());
            println!("  State file:         {}", tracker.path().display());
            match state.last_sync_timestamp {
                Some(ts) => println!("  Last sync:          {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("  Last sync:          never"),
            }
            let branches: Vec<&str> = state.completed_branches.iter().map(String::as_str).collect();
            println!("  Completed branches: {}", branches.join(", "));
            println!("  Processed findings: {}", state.processed_issue_ids.len());

            let rows = history_rows(&state);
            if !rows.is_empty() {
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
        }
    }
    Ok(())
}
