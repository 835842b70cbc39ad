//! `odoo-mirror daemon`: foreground refresh loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use mirror_daemon::{start_blocking, DaemonOptions};

use super::PathArgs;
use crate::transport::JsonRpcConnector;

/// Arguments for `odoo-mirror daemon`.
#[derive(Args, Debug)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Seconds between scheduled syncs.
    #[arg(long, default_value_t = 300)]
    pub interval: u64,

    /// HTTP timeout per remote call, in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Log JSON lines instead of text.
    #[arg(long)]
    pub json_logs: bool,
}

impl DaemonArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let defaults = DaemonOptions::at(&home);
        let options = DaemonOptions {
            config_path: self.paths.config.unwrap_or(defaults.config_path),
            store_path: self.paths.store.unwrap_or(defaults.store_path),
            interval: Duration::from_secs(self.interval.max(1)),
            json_logs: self.json_logs,
        };

        let connector = Arc::new(JsonRpcConnector::new(Duration::from_secs(self.timeout)));
        start_blocking(options, connector).context("daemon exited with error")
    }
}
