//! `odoo-mirror check`: validate the config, optionally against the remote.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_core::Config;
use mirror_sync::{pipeline, plan::ModelPlan};

use super::PathArgs;
use crate::transport::JsonRpcConnector;

/// Arguments for `odoo-mirror check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Also log in, read field metadata, and resolve every relation.
    #[arg(long)]
    pub remote: bool,

    /// HTTP timeout per remote call, in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let config = self.paths.load_config()?;
        print_summary(&config);

        if self.remote {
            check_remote(&config, Duration::from_secs(self.timeout))?;
        }
        println!("{} configuration is valid", "✓".green());
        Ok(())
    }
}

fn print_summary(config: &Config) {
    if config.connections.is_empty() {
        println!("No connections configured.");
        return;
    }
    for conn in &config.connections {
        println!("{}", conn.label().bold());
        for mapping in conn.all_models() {
            let marker = if conn.is_garbage(mapping) { " (garbage)" } else { "" };
            println!(
                "  ·  {} → {}{} ({} field(s))",
                mapping.remote,
                mapping.local,
                marker,
                mapping.fields.len()
            );
        }
    }
}

fn check_remote(config: &Config, timeout: Duration) -> Result<()> {
    let connector = JsonRpcConnector::new(timeout);
    let connections =
        pipeline::connect_all(config, &connector).context("remote check failed")?;
    for conn in &connections {
        for mapping in conn.config.all_models() {
            let plan = ModelPlan::build(conn, mapping)
                .with_context(|| format!("{}: cannot plan {}", conn.label(), mapping.remote))?;
            let relations = plan.fields.iter().filter(|f| f.target.is_some()).count();
            println!(
                "  {}  {} ({} relation(s) resolved)",
                "✓".green(),
                mapping.remote,
                relations
            );
        }
        println!(
            "  {}  {}: locales {}",
            "✓".green(),
            conn.label(),
            conn.locales().join(", ")
        );
    }
    Ok(())
}
