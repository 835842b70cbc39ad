//! YAML configuration: location, loading, validation.
//!
//! # Storage layout
//!
//! ```text
//! ~/.odoo-mirror/
//!   config.yaml    (connections and model mappings)
//!   nodes.json     (default node store, written by mirror-sync)
//! ```
//!
//! # API pattern
//!
//! Every loader has two forms:
//! - `fn_at(home: &Path, …)`; explicit home; used in tests with `TempDir`
//! - `fn(…)`; derives home from `dirs::home_dir()`, delegates to `_at`

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::{Config, ConnectionConfig, ModelMapping, RESERVED_FIELDS};

pub const CONFIG_FILE: &str = "config.yaml";
pub const NODE_STORE_FILE: &str = "nodes.json";

/// Fields every garbage-model record must carry.
pub const GARBAGE_FIELDS: [&str; 2] = ["model_id", "model_name"];

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.odoo-mirror/`
pub fn mirror_root(home: &Path) -> PathBuf {
    home.join(".odoo-mirror")
}

/// `<home>/.odoo-mirror/config.yaml`; pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    mirror_root(home).join(CONFIG_FILE)
}

/// `<home>/.odoo-mirror/nodes.json`; pure, no I/O.
pub fn node_store_path_at(home: &Path) -> PathBuf {
    mirror_root(home).join(NODE_STORE_FILE)
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

/// `node_store_path_at` convenience wrapper.
pub fn node_store_path() -> Result<PathBuf, ConfigError> {
    Ok(node_store_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse`
/// (with path + line context) if malformed YAML, or the first validation error.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, path)
}

/// Load `<home>/.odoo-mirror/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Parse and validate YAML text; `path` is only used for error context.
pub fn parse(contents: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

/// Reject configurations the engine cannot run safely.
///
/// Checks, in order: duplicate connections, per-connection model rules,
/// local type names shared across connections.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut endpoints = HashSet::new();
    let mut local_types = HashSet::new();

    for conn in &config.connections {
        let key = (conn.url.as_str(), conn.database.as_str(), conn.username.as_str());
        if !endpoints.insert(key) {
            return Err(ConfigError::DuplicateConnection {
                connection: conn.label(),
            });
        }
        validate_connection(conn)?;

        for model in conn.all_models() {
            if !local_types.insert(model.local.0.as_str()) {
                return Err(ConfigError::DuplicateLocalType {
                    name: model.local.0.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Validate one connection in isolation.
pub fn validate_connection(conn: &ConnectionConfig) -> Result<(), ConfigError> {
    if conn.password.is_none() && conn.password_env.is_none() {
        return Err(ConfigError::MissingPassword {
            connection: conn.label(),
        });
    }

    let mut remote_names = HashSet::new();
    let mut local_names = HashSet::new();
    for model in conn.all_models() {
        if !remote_names.insert(model.remote.0.as_str()) {
            return Err(ConfigError::DuplicateModel {
                kind: "remote",
                name: model.remote.0.clone(),
                connection: conn.label(),
            });
        }
        if !local_names.insert(model.local.0.as_str()) {
            return Err(ConfigError::DuplicateModel {
                kind: "local",
                name: model.local.0.clone(),
                connection: conn.label(),
            });
        }
        validate_model(model)?;
    }

    if let Some(garbage) = &conn.garbage_model {
        for field in GARBAGE_FIELDS {
            if !garbage.fields.contains_key(field) {
                return Err(ConfigError::MissingGarbageField {
                    model: garbage.remote.0.clone(),
                    field,
                });
            }
        }
    }
    Ok(())
}

fn validate_model(model: &ModelMapping) -> Result<(), ConfigError> {
    if let Some(field) = model
        .fields
        .keys()
        .find(|f| RESERVED_FIELDS.contains(&f.as_str()))
    {
        return Err(ConfigError::ReservedField {
            model: model.remote.0.clone(),
            field: field.clone(),
        });
    }
    model
        .domain
        .validate()
        .map_err(|source| ConfigError::MalformedDomain {
            model: model.remote.0.clone(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
