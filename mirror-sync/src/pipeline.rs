//! Shared sync pipeline entrypoint used by CLI and daemon.

use mirror_core::{config, Config};

use crate::connection::Connection;
use crate::engine::{self, SyncReport};
use crate::error::SyncError;
use crate::rpc::RpcConnector;
use crate::store::NodeStore;

/// Validate `config`, then log in to every configured connection.
///
/// An invalid config fails before any remote call. Otherwise fails on the
/// first connection that cannot log in or describe its models; a run never
/// starts with partial metadata.
pub fn connect_all(
    cfg: &Config,
    connector: &dyn RpcConnector,
) -> Result<Vec<Connection>, SyncError> {
    config::validate(cfg)?;
    cfg.connections
        .iter()
        .map(|conn| Connection::connect(conn.clone(), connector))
        .collect()
}

/// Connect, then run both sync passes into `store`.
///
/// This is the canonical sync entrypoint for both `odoo-mirror sync` and the
/// daemon's refresh loop.
pub fn run(
    config: &Config,
    connector: &dyn RpcConnector,
    store: &dyn NodeStore,
) -> Result<SyncReport, SyncError> {
    let connections = connect_all(config, connector)?;
    engine::sync(&connections, store)
}
