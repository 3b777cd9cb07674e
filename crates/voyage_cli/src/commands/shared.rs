use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use voyage::DirectoryExtractor;
use voyage::http::reqwest_transport::ReqwestTransport;
use voyage::migrate::{Collaborators, ProgressCallback, RunContext, TransferOptions};
use voyage::remote::{CloudClient, CloudReportPipeline, ResilientClient};

use crate::config::{Config, ConfigError};

/// The destination every command talks to: the cloud client behind the
/// write throttle and rate-limit retries.
pub(crate) type Destination = ResilientClient<CloudClient>;

/// Build the source extractor, report pipeline and destination client.
///
/// The pipeline and the destination share one policy, so uploads and API
/// writes are paced together.
pub(crate) fn build_clients(
    config: &Config,
    progress: Option<Arc<ProgressCallback>>,
) -> Result<Collaborators<Destination>, Box<dyn std::error::Error>> {
    let url = config
        .destination
        .url
        .as_deref()
        .ok_or(ConfigError::MissingUrl)?;
    let token = config
        .destination
        .token
        .as_deref()
        .ok_or(ConfigError::MissingToken)?;

    let transport = ReqwestTransport::with_timeout(config.request_timeout())?;
    let cloud = CloudClient::new(Arc::new(transport), url, token);
    let policy = config.remote_policy(progress);

    let pipeline = CloudReportPipeline::new(cloud.clone(), policy.clone())
        .with_poll_interval(config.poll_interval())
        .with_analysis_timeout(config.analysis_timeout());
    let destination = ResilientClient::new(cloud, policy);

    tracing::debug!(
        export_dir = %config.source.export_dir.display(),
        destination = %url,
        "Clients ready"
    );
    Ok(Collaborators::new(
        DirectoryExtractor::new(&config.source.export_dir),
        pipeline,
        destination,
    ))
}

/// Per-invocation directory overrides from the command line.
#[derive(Debug, Default)]
pub(crate) struct RunDirs {
    pub(crate) mappings: Option<PathBuf>,
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn build_context(
    config: &Config,
    options: TransferOptions,
    dirs: RunDirs,
    progress: Option<Arc<ProgressCallback>>,
    shutdown: Arc<AtomicBool>,
) -> Result<RunContext, ConfigError> {
    let mut builder = RunContext::builder()
        .options(options)
        .concurrency(config.concurrency_config())
        .state_dir(config.state_dir())
        .shutdown_flag(shutdown);

    if let Some(dir) = dirs.mappings.or_else(|| config.migration.mappings_dir.clone()) {
        builder = builder.mappings_dir(dir);
    }
    if let Some(dir) = dirs.output.or_else(|| config.migration.output_dir.clone()) {
        builder = builder.output_dir(dir);
    }
    if let Some(progress) = progress {
        builder = builder.progress(progress);
    }

    Ok(builder.build()?)
}
