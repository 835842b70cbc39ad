//! odoo-mirror: mirror Odoo records into a local node store.
//!
//! # Usage
//!
//! ```text
//! odoo-mirror sync [--config <path>] [--store <path>] [--dry-run]
//! odoo-mirror status [--config <path>] [--store <path>] [--json]
//! odoo-mirror check [--config <path>] [--remote]
//! odoo-mirror daemon [--interval <secs>] [--json-logs]
//! ```
//!
//! Engine logs go to stderr under `RUST_LOG` (default `warn`).

mod commands;
mod transport;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, daemon::DaemonArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "odoo-mirror",
    version,
    about = "Incrementally mirror Odoo models into a local node graph",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch changed records and update the node store.
    Sync(SyncArgs),

    /// Show per-model node counts and watermarks from the local store.
    Status(StatusArgs),

    /// Validate the configuration, optionally against the remote schema.
    Check(CheckArgs),

    /// Keep the node store fresh: resync on an interval and on config edits.
    Daemon(DaemonArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    // The daemon installs its own tracing subscriber.
    if !matches!(cli.command, Commands::Daemon(_)) {
        init_logging();
    }
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Daemon(args) => args.run(),
    }
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}
