//! Garbage collector.
//!
//! Records of the garbage model announce deletions elsewhere: each one names
//! a victim by `(model_name, model_id)`.

use serde_json::Value;

use mirror_core::ConnectionConfig;

use crate::node::{node_id, NodeId, Record};

/// Node id of the victim named by a garbage record in `locale`, if the
/// victim's model is mapped.
pub fn collect_victim(config: &ConnectionConfig, record: &Record, locale: &str) -> Option<NodeId> {
    let model_name = record.get("model_name").and_then(Value::as_str)?;
    let model_id = record.get("model_id").and_then(victim_id)?;
    match config.find_model(model_name) {
        Some(victim) => Some(node_id(&victim.local, model_id, locale)),
        None => {
            tracing::debug!(
                "{}: garbage record names unmapped model {model_name}, skipping",
                config.label()
            );
            None
        }
    }
}

/// `model_id` as a plain integer, or the id of an `[id, label]` pair.
fn victim_id(value: &Value) -> Option<i64> {
    match value {
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        other => other.as_i64(),
    }
}
