//! Remote collaborators and the policy every call to them goes through.
//!
//! The traits in this module ([`Extractor`], [`ReportPipeline`],
//! [`DestinationClient`]) are the seams the orchestrator is written against.
//! [`ResilientClient`] decorates any destination client with write throttling
//! and rate-limit retries.
//!
//! # Example
//!
//! ```ignore
//! use voyage::remote::{DestinationClient, RemoteCallPolicy, ResilientClient};
//!
//! async fn create_all<C: DestinationClient>(client: &C, org: &str, groups: &[Group]) -> Result<(), RemoteError> {
//!     for group in groups {
//!         client.create_group(org, group).await?;
//!     }
//!     Ok(())
//! }
//! ```

mod errors;
mod pagination;
mod policy;
mod resilient;
mod throttle;
mod types;

pub mod cloud;
pub mod report;

pub use cloud::CloudClient;
pub use errors::{RemoteError, Result, short_error_message};
pub use pagination::{DEFAULT_PAGE_SIZE, Page, Paginator};
pub use policy::{RemoteCallPolicy, RetryConfig};
pub use report::CloudReportPipeline;
pub use resilient::ResilientClient;
pub use throttle::{ApiRateLimiter, WriteThrottle};
pub use types::{
    AnalysisResult, DestinationClient, ExtractOptions, Extractor, RemoteFinding, ReportMessages,
    ReportPipeline, TaskHandle, TaskStatus, UploadMetadata,
};
