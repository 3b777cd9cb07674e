use clap::ValueEnum;

pub(crate) mod migrate;
pub(crate) mod reset;
pub(crate) mod shared;
pub(crate) mod status;
pub(crate) mod summary;
pub(crate) mod transfer;
pub(crate) mod verify;

/// Output format for state display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}
