//! The remote RPC seam.
//!
//! The engine never speaks HTTP itself: it calls `model.method(*args, **kwargs)`
//! through [`RpcClient`], obtained from an [`RpcConnector`] at login. The
//! `odoo-mirror` binary plugs in a JSON-RPC transport; tests plug in fakes.

use serde_json::Value;

use mirror_core::ConnectionConfig;

use crate::error::{RpcError, SyncError};

/// Everything a connector needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Resolve credentials from a connection config (reads `password_env`).
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, SyncError> {
        Ok(Self {
            url: config.url.clone(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password()?,
        })
    }
}

/// An authenticated session against one remote database.
pub trait RpcClient: Send + Sync {
    /// Invoke `method` on `model` with positional and keyword arguments.
    fn call(&self, model: &str, method: &str, args: Value, kwargs: Value)
        -> Result<Value, RpcError>;
}

/// Opens sessions; one login per connection per process.
pub trait RpcConnector: Send + Sync {
    fn login(&self, credentials: &Credentials) -> Result<Box<dyn RpcClient>, RpcError>;
}

/// Decode a `search` response: a flat array of integer ids.
pub fn parse_ids(value: Value) -> Result<Vec<i64>, RpcError> {
    let Value::Array(items) = value else {
        return Err(RpcError::BadResponse(format!(
            "expected an id array, got {value}"
        )));
    };
    items
        .into_iter()
        .map(|item| {
            item.as_i64()
                .ok_or_else(|| RpcError::BadResponse(format!("non-integer id {item}")))
        })
        .collect()
}

/// Decode a `search_read` response: an array of JSON objects.
pub fn parse_records(value: Value) -> Result<Vec<serde_json::Map<String, Value>>, RpcError> {
    let Value::Array(items) = value else {
        return Err(RpcError::BadResponse(format!(
            "expected a record array, got {value}"
        )));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(RpcError::BadResponse(format!("non-object record {other}"))),
        })
        .collect()
}
