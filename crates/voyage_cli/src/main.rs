//! Voyage CLI - command-line interface for the migration engine.

mod commands;
mod config;
mod progress;
mod shutdown;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use voyage::migrate::TransferOptions;

use crate::commands::OutputFormat;
use crate::commands::migrate::MigrateArgs;

#[derive(Parser)]
#[command(name = "voyage")]
#[command(version)]
#[command(about = "Migrate a code-quality server into a cloud organization")]
#[command(
    long_about = "Voyage moves projects, branch analyses, issue and hotspot review state, \
quality gates, profiles, groups, permission templates and portfolios from a self-hosted \
code-quality server into one or more cloud organizations. Runs can be interrupted and \
resumed: finished branches are recorded in a per-project state file and skipped next time."
)]
#[command(after_long_help = r#"EXAMPLES
    Check that both sides are reachable:
        $ voyage verify

    Transfer one project into the first configured organization:
        $ voyage transfer webapp

    Write the mapping tables for review without touching the destination:
        $ voyage migrate --dry-run --output review

    Apply the edited tables and migrate everything:
        $ voyage migrate --mappings review/mappings

    Start a project over:
        $ voyage reset webapp

CONFIGURATION
    Voyage reads configuration from:
      1. ~/.config/voyage/config.toml (or $XDG_CONFIG_HOME/voyage/config.toml)
      2. ./voyage.toml
      3. Environment variables (VOYAGE_ prefix, __ between section and key)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    VOYAGE_DESTINATION__URL      Cloud service base URL
    VOYAGE_DESTINATION__TOKEN    Cloud service token
    VOYAGE_SOURCE__EXPORT_DIR    Source export directory (default: ./export)
    VOYAGE_STATE__DIR            State directory (default: ~/.local/state/voyage/state)
    RUST_LOG                     Log filter in non-interactive mode (default: voyage=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer a single project, resuming where the last run stopped
    Transfer {
        /// Source project key
        project: String,

        /// Destination organization (default: the first configured)
        #[arg(short = 'O', long)]
        organization: Option<String>,

        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// Migrate the whole server into every configured organization
    Migrate(MigrateArgs),
    /// Show the recorded transfer state of a project
    Status {
        /// Source project key
        project: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Forget the recorded transfer state of a project
    Reset {
        /// Source project key
        project: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Test the source and destination connections
    Verify,
}

/// Transfer options shared by `transfer` and `migrate`.
///
/// Flags only switch behaviour off (or on for connection tests); everything
/// else comes from the `[transfer]` config section.
#[derive(Debug, Clone, clap::Args)]
struct TransferArgs {
    /// Re-sync every finding, not only those not yet processed
    #[arg(long)]
    full: bool,

    /// Submit analyses without waiting for them to be processed
    #[arg(long)]
    no_wait: bool,

    /// Don't replay issue review state
    #[arg(long)]
    skip_issues: bool,

    /// Don't replay hotspot review state
    #[arg(long)]
    skip_hotspots: bool,

    /// Test both connections before transferring
    #[arg(long)]
    test_connections: bool,
}

impl TransferArgs {
    fn apply(&self, mut options: TransferOptions) -> TransferOptions {
        if self.full {
            options.incremental = false;
        }
        if self.no_wait {
            options.wait_for_analysis = false;
        }
        if self.skip_issues {
            options.sync_issues = false;
        }
        if self.skip_hotspots {
            options.sync_hotspots = false;
        }
        if self.test_connections {
            options.test_connections = true;
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Graceful stop on the first Ctrl+C, exit on the second
    let shutdown = shutdown::setup_shutdown_handler();

    // Structured logging only when not attached to a terminal
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("voyage=info,voyage_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    // Configuration errors abort before any network call
    let config = config::Config::load()?;

    match cli.command {
        Commands::Transfer {
            project,
            organization,
            transfer,
        } => {
            commands::transfer::handle_transfer(
                &project,
                organization.as_deref(),
                &transfer,
                &config,
                shutdown,
            )
            .await?;
        }
        Commands::Migrate(args) => {
            commands::migrate::handle_migrate(args, &config, shutdown).await?;
        }
        Commands::Status { project, output } => {
            commands::status::handle_status(&project, output, &config).await?;
        }
        Commands::Reset { project, yes } => {
            commands::reset::handle_reset(&project, yes, &config).await?;
        }
        Commands::Verify => {
            commands::verify::handle_verify(&config).await?;
        }
    }

    Ok(())
}
