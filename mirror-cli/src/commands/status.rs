//! `odoo-mirror status`: what the next sync starts from, per mapped model.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use mirror_sync::{
    status::{self, format_datetime_age, TypeStatus},
    FileNodeStore,
};

use super::PathArgs;

/// Arguments for `odoo-mirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let config = self.paths.load_config()?;
        let store_path = self.paths.store_path()?;
        let store = FileNodeStore::open(&store_path)
            .with_context(|| format!("failed to open node store {}", store_path.display()))?;

        let types = status::collect(&config, &store).context("failed to read node store")?;
        let report = StatusReport {
            store: store_path.display().to_string(),
            synced_at: store.synced_at().map(|at| at.to_rfc3339()),
            last_sync_age: store
                .synced_at()
                .map(format_datetime_age)
                .unwrap_or_else(|| "never".to_string()),
            total_nodes: store.nodes().len(),
            types,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(report);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReport {
    store: String,
    synced_at: Option<String>,
    last_sync_age: String,
    total_nodes: usize,
    types: Vec<TypeStatus>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "nodes")]
    nodes: usize,
    #[tabled(rename = "locales")]
    locales: String,
    #[tabled(rename = "watermark")]
    watermark: String,
    #[tabled(rename = "ties")]
    ties: usize,
}

fn print_table(report: StatusReport) {
    println!(
        "odoo-mirror v{} | {} nodes | last sync {}",
        env!("CARGO_PKG_VERSION"),
        report.total_nodes,
        report.last_sync_age,
    );
    println!("{}", report.store.bright_black());

    if report.types.is_empty() {
        println!("No models configured.");
        return;
    }

    let mut connections: Vec<String> = report.types.iter().map(|t| t.connection.clone()).collect();
    connections.dedup();
    for connection in connections {
        println!("{}", connection.bold());
        let rows: Vec<StatusTableRow> = report
            .types
            .iter()
            .filter(|t| t.connection == connection)
            .map(table_row)
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if report.synced_at.is_none() {
        println!("Run 'odoo-mirror sync' to bootstrap the store.");
    }
}

fn table_row(status: &TypeStatus) -> StatusTableRow {
    let mut remote = status.remote.to_string();
    if status.garbage {
        remote.push_str(" (garbage)");
    }
    StatusTableRow {
        remote,
        local: status.local.to_string(),
        nodes: status.nodes,
        locales: if status.locales.is_empty() {
            "-".to_string()
        } else {
            status.locales.iter().cloned().collect::<Vec<_>>().join(", ")
        },
        watermark: match status.watermark {
            Some(mark) => mark.to_string(),
            None => "never".yellow().to_string(),
        },
        ties: status.ties,
    }
}
