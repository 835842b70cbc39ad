pub mod check;
pub mod daemon;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use mirror_core::config;

/// `--config` / `--store` overrides shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    /// Config file (default: ~/.odoo-mirror/config.yaml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Node store file (default: ~/.odoo-mirror/nodes.json).
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,
}

impl PathArgs {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::config_path().context("could not locate the default config file"),
        }
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store {
            Some(path) => Ok(path.clone()),
            None => config::node_store_path().context("could not locate the default node store"),
        }
    }

    pub fn load_config(&self) -> Result<mirror_core::Config> {
        let path = self.config_path()?;
        config::load_from(&path).with_context(|| format!("failed to load {}", path.display()))
    }
}
