//! odoo-mirror core library: configuration model, domain filters, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes, field specs, model and connection mappings
//! - [`domain`]: the remote search filter as an explicit expression tree
//! - [`config`]: load / validate the YAML configuration
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod domain;
pub mod error;
pub mod types;

pub use domain::{Condition, Domain, DomainError, Operator};
pub use error::ConfigError;
pub use types::{
    Config, ConnectionConfig, FieldKind, FieldSpec, FieldType, LocalType, ModelMapping,
    RemoteModel, Transform, TransformRule,
};
