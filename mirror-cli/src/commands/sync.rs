//! `odoo-mirror sync`: run the incremental and forced passes once.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_sync::{pipeline, FileNodeStore, ModelStats, SyncReport};

use super::PathArgs;
use crate::transport::JsonRpcConnector;

/// Arguments for `odoo-mirror sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Fetch and report without writing the node store.
    #[arg(long)]
    pub dry_run: bool,

    /// HTTP timeout per remote call, in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = self.paths.load_config()?;
        let store_path = self.paths.store_path()?;
        let mut store = FileNodeStore::open(&store_path)
            .with_context(|| format!("failed to open node store {}", store_path.display()))?;

        let connector = JsonRpcConnector::new(Duration::from_secs(self.timeout));
        let report = pipeline::run(&config, &connector, &store).context("sync aborted")?;
        print_report(&report, self.dry_run);

        if self.dry_run {
            println!("[dry-run] node store not written: {}", store_path.display());
        } else {
            if report.is_clean() {
                let swept = store.sweep();
                if !swept.is_empty() {
                    println!("  {} {} stale node(s) removed", "✗".yellow(), swept.len());
                }
            }
            store
                .save()
                .with_context(|| format!("failed to save node store {}", store_path.display()))?;
        }

        if !report.is_clean() {
            bail!(
                "{} model(s) failed; stale nodes were kept",
                report.failures.len()
            );
        }
        Ok(())
    }
}

fn print_report(report: &SyncReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let totals = report.totals();
    if totals.fetched == 0 && report.is_clean() {
        println!("{prefix}✓ nothing changed upstream");
        return;
    }

    println!("{prefix}{} synced ({})", "✓".green(), describe(&totals));
    for result in &report.models {
        if result.stats.fetched == 0 && result.stats.deleted == 0 {
            continue;
        }
        println!(
            "  ·  {} → {} [{}] {}",
            result.model,
            result.local,
            result.phase,
            describe(&result.stats)
        );
    }
    for forced in &report.forced {
        println!(
            "  ~  {} forced {} related record(s) ({})",
            forced.model,
            forced.ids.len(),
            forced.connection
        );
    }
    for failure in &report.failures {
        println!(
            "  {}  {} [{}] {}",
            "✗".red().bold(),
            failure.model,
            failure.phase,
            failure.error.to_string().red()
        );
    }
}

fn describe(stats: &ModelStats) -> String {
    format!(
        "{} fetched, {} created, {} updated, {} unchanged, {} deleted",
        stats.fetched, stats.created, stats.updated, stats.unchanged, stats.deleted
    )
}
