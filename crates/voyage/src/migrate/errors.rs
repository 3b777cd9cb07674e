use thiserror::Error;

use crate::extract::ExtractError;
use crate::mapping::MappingError;
use crate::model::ModelError;
use crate::state::StateError;
use crate::tabular::TableError;

use super::context::ContextError;

/// Errors that stop a run before or after its per-project work.
///
/// Failures inside a phase are recorded as steps in the report instead.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("configuration error: {0}")]
    Mapping(#[from] MappingError),

    #[error("invalid source data: {0}")]
    Model(#[from] ModelError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("failed to write {path}: {message}")]
    Io { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, MigrateError>;
