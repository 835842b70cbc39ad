//! Error types for mirror-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::DomainError;

/// Errors raised while loading or validating the mirror configuration.
///
/// Every variant is fatal at startup; none of them is retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.odoo-mirror/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A field resolved to a remote type the normalizer cannot handle.
    #[error("unsupported field type '{field_type}' for {model}.{field}")]
    UnsupportedFieldType {
        model: String,
        field: String,
        field_type: String,
    },

    /// A declared field is not known to the remote model.
    #[error("field '{field}' is not known to remote model {model}")]
    UnknownField { model: String, field: String },

    #[error("malformed domain filter on {model}: {source}")]
    MalformedDomain {
        model: String,
        #[source]
        source: DomainError,
    },

    /// Remote or local model names must be unique within a connection.
    #[error("duplicate {kind} model name '{name}' in connection {connection}")]
    DuplicateModel {
        kind: &'static str,
        name: String,
        connection: String,
    },

    #[error("local type '{name}' is declared by more than one connection")]
    DuplicateLocalType { name: String },

    #[error("connection {connection} is declared more than once")]
    DuplicateConnection { connection: String },

    #[error("field '{field}' on {model} uses a reserved name")]
    ReservedField { model: String, field: String },

    #[error("garbage model {model} must declare field '{field}'")]
    MissingGarbageField { model: String, field: &'static str },

    #[error("connection {connection} has no password; set `password` or `password_env`")]
    MissingPassword { connection: String },

    #[error("environment variable {var} for connection {connection} is not set")]
    MissingPasswordEnv { var: String, connection: String },
}
