//! Configuration file support for voyage.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`VOYAGE_` prefix, `__` between section and key,
//!    e.g. `VOYAGE_DESTINATION__TOKEN`)
//! 3. Local config file (`./voyage.toml`)
//! 4. XDG config file (`~/.config/voyage/config.toml`)
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [source]
//! export_dir = "export"
//!
//! [destination]
//! url = "https://cloud.example.com"
//! token = "..."  # or use VOYAGE_DESTINATION__TOKEN
//!
//! [[organizations]]
//! key = "acme"
//!
//! [[organizations]]
//! key = "beta"
//! project_key_prefix = "beta_"
//!
//! [rate_limit]
//! min_request_interval_ms = 500
//! max_retries = 5
//! base_delay_ms = 1000
//!
//! [concurrency]
//! project_migration = 2
//!
//! [transfer]
//! wait_for_analysis = true
//! incremental = true
//!
//! [migration]
//! output_dir = "voyage-output"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use voyage::TenantConfig;
use voyage::migrate::{
    ConcurrencyConfig, ContextError, DEFAULT_BASE_DELAY_MS, DEFAULT_HOTSPOT_DETAIL_FETCH,
    DEFAULT_HOTSPOT_SYNC, DEFAULT_ISSUE_SYNC, DEFAULT_MAX_RETRIES,
    DEFAULT_MIN_REQUEST_INTERVAL_MS, DEFAULT_PROJECT_MIGRATION, DEFAULT_SOURCE_FILE_FETCH,
    ProgressCallback, TransferOptions,
};
use voyage::remote::{RemoteCallPolicy, RetryConfig};

/// Problems found while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("destination token is not configured (set [destination].token or VOYAGE_DESTINATION__TOKEN)")]
    MissingToken,

    #[error("destination url is not configured (set [destination].url)")]
    MissingUrl,

    #[error("no destination organizations configured (add an [[organizations]] entry)")]
    NoOrganizations,

    #[error("organization '{0}' is not configured")]
    UnknownOrganization(String),

    #[error("source export directory {} does not exist", .0.display())]
    MissingExportDir(PathBuf),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub organizations: Vec<OrganizationConfig>,
    pub rate_limit: RateLimitConfig,
    pub concurrency: ConcurrencySection,
    pub transfer: TransferSection,
    pub state: StateConfig,
    pub migration: MigrationConfig,
}

/// Where the source server export lives.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding `inventory.json` and `projects/`.
    pub export_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("export"),
        }
    }
}

/// Destination cloud service.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub url: Option<String>,
    /// Can also be set via VOYAGE_DESTINATION__TOKEN.
    pub token: Option<String>,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            request_timeout_secs: 60,
        }
    }
}

/// One destination organization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrganizationConfig {
    pub key: String,
    pub project_key_prefix: Option<String>,
}

impl From<&OrganizationConfig> for TenantConfig {
    fn from(org: &OrganizationConfig) -> Self {
        match &org.project_key_prefix {
            Some(prefix) if !prefix.is_empty() => TenantConfig::new(&org.key).with_prefix(prefix),
            _ => TenantConfig::new(&org.key),
        }
    }
}

/// Write pacing and retry settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_request_interval_ms: u64,
    pub max_retries: usize,
    pub base_delay_ms: u64,
    /// Optional cap on read calls; unset means reads are not paced.
    pub read_requests_per_second: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: DEFAULT_MIN_REQUEST_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            read_requests_per_second: None,
        }
    }
}

/// Concurrency limits per operation class.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConcurrencySection {
    pub source_file_fetch: usize,
    pub hotspot_detail_fetch: usize,
    pub issue_sync: usize,
    pub hotspot_sync: usize,
    pub project_migration: usize,
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            source_file_fetch: DEFAULT_SOURCE_FILE_FETCH,
            hotspot_detail_fetch: DEFAULT_HOTSPOT_DETAIL_FETCH,
            issue_sync: DEFAULT_ISSUE_SYNC,
            hotspot_sync: DEFAULT_HOTSPOT_SYNC,
            project_migration: DEFAULT_PROJECT_MIGRATION,
        }
    }
}

/// Default transfer behaviour.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TransferSection {
    pub wait_for_analysis: bool,
    pub incremental: bool,
    pub sync_issues: bool,
    pub sync_hotspots: bool,
    pub test_connections: bool,
    pub analysis_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for TransferSection {
    fn default() -> Self {
        let defaults = TransferOptions::default();
        Self {
            wait_for_analysis: defaults.wait_for_analysis,
            incremental: defaults.incremental,
            sync_issues: defaults.sync_issues,
            sync_hotspots: defaults.sync_hotspots,
            test_connections: defaults.test_connections,
            analysis_timeout_secs: 600,
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Defaults to the XDG state directory.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Edited override tables to apply.
    pub mappings_dir: Option<PathBuf>,
    /// Report and dry-run artifacts; defaults to the state directory.
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the config files and `VOYAGE_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a file is malformed or a value has
    /// the wrong type. Missing files are not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("voyage.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./voyage.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // VOYAGE_RATE_LIMIT__MAX_RETRIES -> rate_limit.max_retries
        builder = builder.add_source(
            Environment::with_prefix("VOYAGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize::<Config>()?)
    }

    /// Check everything a command talking to the destination needs.
    ///
    /// # Errors
    ///
    /// The first problem found, in the order token, url, organizations,
    /// concurrency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination.token.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingToken);
        }
        if self.destination.url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingUrl);
        }
        if self.organizations.iter().all(|o| o.key.is_empty()) {
            return Err(ConfigError::NoOrganizations);
        }
        self.concurrency_config().validate()?;
        Ok(())
    }

    /// Like [`validate`](Self::validate), and the export directory must exist.
    pub fn validate_with_source(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if !self.source.export_dir.is_dir() {
            return Err(ConfigError::MissingExportDir(self.source.export_dir.clone()));
        }
        Ok(())
    }

    pub fn tenants(&self) -> Vec<TenantConfig> {
        self.organizations
            .iter()
            .filter(|o| !o.key.is_empty())
            .map(TenantConfig::from)
            .collect()
    }

    /// The tenant named `key`, or the first configured one.
    pub fn tenant(&self, key: Option<&str>) -> Result<TenantConfig, ConfigError> {
        let tenants = self.tenants();
        match key {
            Some(key) => tenants
                .into_iter()
                .find(|t| t.key == key)
                .ok_or_else(|| ConfigError::UnknownOrganization(key.to_string())),
            None => tenants.into_iter().next().ok_or(ConfigError::NoOrganizations),
        }
    }

    pub fn concurrency_config(&self) -> ConcurrencyConfig {
        let c = &self.concurrency;
        ConcurrencyConfig {
            source_file_fetch: c.source_file_fetch,
            hotspot_detail_fetch: c.hotspot_detail_fetch,
            issue_sync: c.issue_sync,
            hotspot_sync: c.hotspot_sync,
            project_migration: c.project_migration,
        }
    }

    pub fn transfer_options(&self) -> TransferOptions {
        let t = &self.transfer;
        TransferOptions {
            dry_run: false,
            wait_for_analysis: t.wait_for_analysis,
            incremental: t.incremental,
            sync_issues: t.sync_issues,
            sync_hotspots: t.sync_hotspots,
            test_connections: t.test_connections,
        }
    }

    /// One policy per run; clones share its throttle.
    pub fn remote_policy(&self, progress: Option<Arc<ProgressCallback>>) -> RemoteCallPolicy {
        let r = &self.rate_limit;
        let mut policy = RemoteCallPolicy::new(
            Duration::from_millis(r.min_request_interval_ms),
            RetryConfig::new(Duration::from_millis(r.base_delay_ms), r.max_retries),
        );
        if let Some(rps) = r.read_requests_per_second.filter(|rps| *rps > 0) {
            policy = policy.with_read_limit(rps);
        }
        if let Some(progress) = progress {
            policy = policy.with_progress(progress);
        }
        policy
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.analysis_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.transfer.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.destination.request_timeout_secs.max(1))
    }

    /// Configured state directory, else `<XDG state>/state`, else `.voyage/state`.
    pub fn state_dir(&self) -> PathBuf {
        self.state
            .dir
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("state")))
            .unwrap_or_else(|| PathBuf::from(".voyage/state"))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "voyage").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// On Linux, `$XDG_STATE_HOME/voyage` or `~/.local/state/voyage`.
    /// Elsewhere the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "voyage").map(|dirs| {
            // state_dir() returns None on macOS/Windows
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
