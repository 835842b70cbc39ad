//! A logged-in remote endpoint.
//!
//! `Connection` bundles everything one remote database contributes to a run:
//! its config, the authenticated client, the active locales, and the field
//! metadata cache. It is built once and passed explicitly to every step.

use serde_json::{json, Value};

use mirror_core::ConnectionConfig;

use crate::error::{RpcError, SyncError};
use crate::metadata::MetadataCache;
use crate::rpc::{parse_records, Credentials, RpcClient, RpcConnector};

pub struct Connection {
    pub config: ConnectionConfig,
    client: Box<dyn RpcClient>,
    locales: Vec<String>,
    metadata: MetadataCache,
}

impl Connection {
    /// Log in, discover active locales, and describe every model.
    pub fn connect(
        config: ConnectionConfig,
        connector: &dyn RpcConnector,
    ) -> Result<Self, SyncError> {
        let credentials = Credentials::from_config(&config)?;
        let client = connector
            .login(&credentials)
            .map_err(|source| remote_error(&config, "res.users", "login", source))?;

        let locales = active_locales(client.as_ref())
            .map_err(|source| remote_error(&config, "res.lang", "search_read", source))?;
        tracing::info!(
            "{}: logged in, active locales: {}",
            config.label(),
            locales.join(", ")
        );

        let metadata = MetadataCache::load(client.as_ref(), &config)?;
        Ok(Self::from_parts(config, client, locales, metadata))
    }

    /// Assemble a connection from already-fetched pieces.
    pub fn from_parts(
        config: ConnectionConfig,
        client: Box<dyn RpcClient>,
        locales: Vec<String>,
        metadata: MetadataCache,
    ) -> Self {
        Self {
            config,
            client,
            locales,
            metadata,
        }
    }

    pub fn label(&self) -> String {
        self.config.label()
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Call the remote, attaching connection/model/operation context to
    /// failures.
    pub fn call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, SyncError> {
        self.client
            .call(model, method, args, kwargs)
            .map_err(|source| SyncError::Remote {
                connection: self.label(),
                model: model.to_owned(),
                operation: method.to_owned(),
                source,
            })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config.label())
            .field("locales", &self.locales)
            .finish_non_exhaustive()
    }
}

fn active_locales(client: &dyn RpcClient) -> Result<Vec<String>, RpcError> {
    let raw = client.call(
        "res.lang",
        "search_read",
        json!([[["active", "=", true]], ["id", "code"]]),
        json!({}),
    )?;
    parse_records(raw)?
        .into_iter()
        .map(|record| match record.get("code") {
            Some(Value::String(code)) => Ok(code.clone()),
            other => Err(RpcError::BadResponse(format!(
                "res.lang record without a code: {other:?}"
            ))),
        })
        .collect()
}

fn remote_error(
    config: &ConnectionConfig,
    model: &str,
    operation: &str,
    source: RpcError,
) -> SyncError {
    SyncError::Remote {
        connection: config.label(),
        model: model.to_owned(),
        operation: operation.to_owned(),
        source,
    }
}
