//! `voyage migrate`: the whole server into every configured organization.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use console::style;
use voyage::migrate::{REPORT_FILE, run_migration};

use crate::TransferArgs;
use crate::commands::shared::{RunDirs, build_clients, build_context};
use crate::commands::summary::print_report;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Options of one migration run.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct MigrateArgs {
    /// Write the mapping tables and a report without touching the destination
    #[arg(short = 'n', long)]
    pub(crate) dry_run: bool,

    /// Directory with edited mapping tables from a previous dry run
    #[arg(short, long, value_name = "DIR")]
    pub(crate) mappings: Option<PathBuf>,

    /// Directory receiving the report and dry-run tables
    #[arg(short, long, value_name = "DIR")]
    pub(crate) output: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) transfer: TransferArgs,
}

pub(crate) async fn handle_migrate(
    args: MigrateArgs,
    config: &Config,
    shutdown: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate_with_source()?;
    let tenants = config.tenants();

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let clients = build_clients(config, Some(Arc::clone(&callback)))?;

    let mut options = args.transfer.apply(config.transfer_options());
    options.dry_run = args.dry_run;
    let ctx = build_context(
        config,
        options,
        RunDirs {
            mappings: args.mappings,
            output: args.output,
        },
        Some(callback),
        shutdown,
    )?;

    let report = run_migration(&ctx, &clients, &tenants).await;
    reporter.finish();
    let report = report?;

    print_report(&report);
    println!(
        "Report written to {}",
        style(ctx.output_dir().join(REPORT_FILE).display()).cyan()
    );

    if report.summary.failed > 0 {
        return Err(format!("{} projects failed", report.summary.failed).into());
    }
    Ok(())
}
