//! Per-model fetch plan: each declared field paired with its effective type
//! and, for relations, the mapping it points at.

use mirror_core::{ConfigError, FieldSpec, FieldType, ModelMapping};

use crate::connection::Connection;
use crate::error::SyncError;
use crate::metadata::requested_fields;

#[derive(Debug, Clone)]
pub struct PlannedField<'a> {
    pub name: &'a str,
    pub spec: &'a FieldSpec,
    pub field_type: FieldType,
    /// Target mapping; set exactly when `field_type` is a relation.
    pub target: Option<&'a ModelMapping>,
}

#[derive(Debug, Clone)]
pub struct ModelPlan<'a> {
    pub mapping: &'a ModelMapping,
    pub fields: Vec<PlannedField<'a>>,
    /// Fields passed to `search_read`.
    pub read_fields: Vec<String>,
    pub is_garbage: bool,
}

impl<'a> ModelPlan<'a> {
    /// Resolve every declared field of `mapping` against the connection's
    /// metadata cache.
    ///
    /// Fails with a configuration error for unknown fields or unsupported
    /// types, and with [`SyncError::Resolution`] for relations to unmapped
    /// models.
    pub fn build(conn: &'a Connection, mapping: &'a ModelMapping) -> Result<Self, SyncError> {
        let metadata = conn.metadata().get(&mapping.remote);
        let mut fields = Vec::with_capacity(mapping.fields.len());

        for (name, spec) in &mapping.fields {
            let Some(meta) = metadata.and_then(|m| m.get(name)) else {
                return Err(ConfigError::UnknownField {
                    model: mapping.remote.0.clone(),
                    field: name.clone(),
                }
                .into());
            };
            let field_type = match spec.field_type {
                Some(declared) => declared,
                None => FieldType::from_remote(&meta.field_type).ok_or_else(|| {
                    ConfigError::UnsupportedFieldType {
                        model: mapping.remote.0.clone(),
                        field: name.clone(),
                        field_type: meta.field_type.clone(),
                    }
                })?,
            };

            let target = if field_type.is_relation() {
                let relation = meta.relation.as_deref().unwrap_or_default();
                let target =
                    conn.config
                        .find_model(relation)
                        .ok_or_else(|| SyncError::Resolution {
                            model: mapping.remote.0.clone(),
                            field: name.clone(),
                            relation: relation.to_owned(),
                        })?;
                Some(target)
            } else {
                None
            };

            fields.push(PlannedField {
                name,
                spec,
                field_type,
                target,
            });
        }

        Ok(Self {
            mapping,
            fields,
            read_fields: requested_fields(mapping),
            is_garbage: conn.config.is_garbage(mapping),
        })
    }
}
