//! Voyage - a resumable migration engine for code-quality data.
//!
//! This library moves projects, branch analyses, issue and hotspot review
//! state, and organization-level resources from a self-hosted code-quality
//! server into a multi-tenant cloud service.
//!
//! # Features
//!
//! - `http` (default) - Enables the reqwest-backed `http::reqwest_transport::ReqwestTransport`.
//!   Without it only the [`http::HttpTransport`] trait is available.
//!
//! # Example
//!
//! ```ignore
//! use voyage::migrate::{Collaborators, RunContext, run_migration};
//! use voyage::remote::{CloudClient, CloudReportPipeline, RemoteCallPolicy, ResilientClient};
//! use voyage::{DirectoryExtractor, TenantConfig};
//!
//! let policy = RemoteCallPolicy::default();
//! let cloud = CloudClient::new(transport, "https://cloud.example.com", token);
//! let clients = Collaborators::new(
//!     DirectoryExtractor::new("export"),
//!     CloudReportPipeline::new(cloud.clone(), policy.clone()),
//!     ResilientClient::new(cloud, policy),
//! );
//! let ctx = RunContext::builder().state_dir(".voyage/state").build()?;
//! let report = run_migration(&ctx, &clients, &[TenantConfig::new("acme")]).await?;
//! println!("{} projects migrated", report.summary.succeeded);
//! ```

pub mod extract;
pub mod http;
pub mod mapping;
pub mod migrate;
pub mod model;
pub mod overrides;
pub mod remote;
pub mod state;
pub mod tabular;

pub use extract::{DirectoryExtractor, ExtractError};
pub use mapping::{MappingError, OrgAssignment, build_assignments};
pub use model::{ExtractionSnapshot, ProjectInfo, ProjectSnapshot, TenantConfig};
pub use remote::{RemoteError, short_error_message};
pub use state::{StateError, StateTracker, SyncState, TransferStats};
pub use tabular::{Table, TableError};
