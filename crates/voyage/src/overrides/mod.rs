//! Operator overrides: dry-run export and re-application of edited tables.

mod apply;
mod export;

pub use apply::{OverrideOutcome, apply_csv_overrides};
pub use export::{build_tables, write_artifacts};

/// Column names shared by the exporter and the applicator.
pub mod columns {
    pub const PROJECT_KEY: &str = "Project Key";
    pub const PROJECT_NAME: &str = "Project Name";
    pub const BRANCH: &str = "Branch";
    pub const MAIN_BRANCH: &str = "Main Branch";
    pub const ORGANIZATION: &str = "Organization";
    pub const GATE_NAME: &str = "Gate Name";
    pub const PROFILE_NAME: &str = "Profile Name";
    pub const LANGUAGE: &str = "Language";
    pub const GROUP_NAME: &str = "Group Name";
    pub const DESCRIPTION: &str = "Description";
    pub const PERMISSION: &str = "Permission";
    pub const TEMPLATE_NAME: &str = "Template Name";
    pub const PROJECT_KEY_PATTERN: &str = "Project Key Pattern";
    pub const GROUP: &str = "Group";
    pub const PORTFOLIO_KEY: &str = "Portfolio Key";
    pub const PORTFOLIO_NAME: &str = "Portfolio Name";
}
