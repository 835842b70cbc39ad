//! Field metadata cache.
//!
//! One `fields_get` per model at connect time, read-only afterwards. Both sync
//! passes read the same cache; nothing here is ever re-fetched.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Value};

use mirror_core::{ConfigError, ConnectionConfig, ModelMapping, RemoteModel};

use crate::error::{RpcError, SyncError};
use crate::rpc::RpcClient;
use crate::watermark::WRITE_DATE;

/// The subset of `fields_get` attributes the engine uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldMetadata {
    #[serde(rename = "type")]
    pub field_type: String,
    /// Target remote model of a relation field.
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Human-readable label.
    #[serde(default)]
    pub string: Option<String>,
}

/// Field name → metadata for one model.
pub type ModelMetadata = BTreeMap<String, FieldMetadata>;

/// `id`, `write_date`, then every declared field.
pub fn requested_fields(mapping: &ModelMapping) -> Vec<String> {
    let mut fields = vec!["id".to_owned(), WRITE_DATE.to_owned()];
    fields.extend(mapping.fields.keys().cloned());
    fields
}

/// Per-connection metadata, keyed by remote model.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    models: BTreeMap<RemoteModel, ModelMetadata>,
}

impl MetadataCache {
    /// Describe every model of `config`, garbage model included.
    ///
    /// Any failure is fatal: there is no partial-metadata mode.
    pub fn load(client: &dyn RpcClient, config: &ConnectionConfig) -> Result<Self, SyncError> {
        let mut cache = Self::default();
        for mapping in config.all_models() {
            let metadata = describe(client, mapping).map_err(|source| SyncError::Remote {
                connection: config.label(),
                model: mapping.remote.0.clone(),
                operation: "fields_get".into(),
                source,
            })?;
            check_declared(mapping, &metadata)?;
            tracing::debug!(
                "{}: cached metadata for {} field(s) of {}",
                config.label(),
                metadata.len(),
                mapping.remote
            );
            cache.insert(mapping.remote.clone(), metadata);
        }
        Ok(cache)
    }

    pub fn get(&self, model: &RemoteModel) -> Option<&ModelMetadata> {
        self.models.get(model)
    }

    pub fn insert(&mut self, model: RemoteModel, metadata: ModelMetadata) {
        self.models.insert(model, metadata);
    }
}

fn describe(client: &dyn RpcClient, mapping: &ModelMapping) -> Result<ModelMetadata, RpcError> {
    let raw = client.call(
        &mapping.remote.0,
        "fields_get",
        json!([requested_fields(mapping)]),
        json!({ "attributes": [] }),
    )?;
    parse_metadata(raw)
}

fn parse_metadata(raw: Value) -> Result<ModelMetadata, RpcError> {
    serde_json::from_value(raw)
        .map_err(|e| RpcError::BadResponse(format!("malformed fields_get result: {e}")))
}

fn check_declared(mapping: &ModelMapping, metadata: &ModelMetadata) -> Result<(), ConfigError> {
    match mapping.fields.keys().find(|f| !metadata.contains_key(*f)) {
        Some(field) => Err(ConfigError::UnknownField {
            model: mapping.remote.0.clone(),
            field: field.clone(),
        }),
        None => Ok(()),
    }
}
