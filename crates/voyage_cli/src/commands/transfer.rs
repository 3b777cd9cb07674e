//! `voyage transfer`: one project into one organization.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use voyage::migrate::{StepStatus, TransferRequest, transfer_project};

use crate::TransferArgs;
use crate::commands::shared::{RunDirs, build_clients, build_context};
use crate::commands::summary::print_project;
use crate::config::Config;
use crate::progress::ProgressReporter;

pub(crate) async fn handle_transfer(
    project: &str,
    organization: Option<&str>,
    args: &TransferArgs,
    config: &Config,
    shutdown: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate_with_source()?;
    let tenant = config.tenant(organization)?;

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let clients = build_clients(config, Some(Arc::clone(&callback)))?;
    let ctx = build_context(
        config,
        args.apply(config.transfer_options()),
        RunDirs::default(),
        Some(callback),
        shutdown,
    )?;

    tracing::info!(
        project,
        organization = %tenant.key,
        destination_key = %tenant.destination_key(project),
        "Starting transfer"
    );
    let mut tracker = ctx.state_tracker(project);
    let result =
        transfer_project(&ctx, &clients, TransferRequest::new(project, &tenant), &mut tracker)
            .await;
    reporter.finish();

    print_project(&result);
    if result.status() == StepStatus::Failed {
        return Err(format!("transfer of '{project}' failed").into());
    }
    Ok(())
}
