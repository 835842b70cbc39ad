//! Value normalizer: raw remote value → typed local value.
//!
//! The pipeline is fixed: normalize by type, substitute the default when the
//! result is falsy, then apply the transform.

use serde_json::Value;

use mirror_core::{FieldKind, FieldSpec, FieldType};

/// Coerce `value` to the shape `field_type` promises.
///
/// The remote side sends `false` for empty fields of every type; those
/// become `null` (or `[]` for multi-relations).
pub fn normalize(value: Value, field_type: FieldType) -> Value {
    match field_type.kind() {
        FieldKind::Text | FieldKind::Date => match value {
            Value::String(_) => value,
            _ => Value::Null,
        },
        FieldKind::Numeric => match value {
            Value::Number(_) => value,
            _ => Value::Null,
        },
        FieldKind::ManyRelation => match value {
            Value::Array(_) => value,
            _ => Value::Array(Vec::new()),
        },
        FieldKind::OneRelation => match &value {
            Value::Array(pair) if pair.len() == 2 => value,
            _ => Value::Null,
        },
    }
}

/// `null`, `false`, zero, and the empty string.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Default, then transform.
pub fn apply_spec(value: Value, spec: &FieldSpec) -> Value {
    let value = match &spec.default {
        Some(default) if is_falsy(&value) => default.clone(),
        _ => value,
    };
    match &spec.transform {
        Some(transform) => transform.apply(value),
        None => value,
    }
}

pub fn normalize_field(value: Value, field_type: FieldType, spec: &FieldSpec) -> Value {
    apply_spec(normalize(value, field_type), spec)
}
