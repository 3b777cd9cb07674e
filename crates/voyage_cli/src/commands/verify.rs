//! `voyage verify`: connection tests against the source and destination.

use console::style;
use tabled::{Table, Tabled, settings::Style};

use voyage::remote::{DestinationClient, short_error_message};

use crate::commands::shared::build_clients;
use crate::config::Config;

#[derive(Debug, Tabled)]
struct CheckRow {
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn row<E: std::error::Error>(check: &str, target: String, outcome: &Result<(), E>) -> CheckRow {
    CheckRow {
        check: check.to_string(),
        target,
        result: match outcome {
            Ok(()) => style("ok").green().to_string(),
            Err(e) => style(short_error_message(e)).red().to_string(),
        },
    }
}

pub(crate) async fn handle_verify(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let clients = build_clients(config, None)?;

    let source = clients.extractor.test_connection().await;
    let destination = clients.destination.test_connection().await;

    let rows = vec![
        row("source", config.source.export_dir.display().to_string(), &source),
        row(
            "destination",
            config.destination.url.clone().unwrap_or_default(),
            &destination,
        ),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for tenant in config.tenants() {
        println!("  organization {}", style(&tenant.key).cyan());
    }

    if source.is_err() || destination.is_err() {
        return Err("connection test failed".into());
    }
    Ok(())
}
