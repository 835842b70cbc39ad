//! Relation resolver.
//!
//! Rewrites relation fields into links to the target model's nodes and
//! records every referenced remote id so the forced pass can materialize it.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use mirror_core::{FieldKind, RemoteModel};

use crate::node::{node_id, Link, Links, Record};
use crate::plan::ModelPlan;

/// Remote ids referenced during the incremental pass, per target model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedIds(BTreeMap<RemoteModel, BTreeSet<i64>>);

impl RelatedIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, model: &RemoteModel, ids: impl IntoIterator<Item = i64>) {
        let entry = self.0.entry(model.clone()).or_default();
        entry.extend(ids);
        if entry.is_empty() {
            self.0.remove(model);
        }
    }

    pub fn get(&self, model: &RemoteModel) -> Option<&BTreeSet<i64>> {
        self.0.get(model)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RemoteModel, &BTreeSet<i64>)> {
        self.0.iter()
    }
}

/// Move every relation field of `record` into the returned links.
///
/// Pass `related` only when the model had local nodes before this run; a
/// model's first full sync does not need its relations backfilled.
pub fn resolve_links(
    plan: &ModelPlan<'_>,
    record: &mut Record,
    locale: &str,
    mut related: Option<&mut RelatedIds>,
) -> Links {
    let mut links = Links::new();
    for field in &plan.fields {
        let Some(target) = field.target else {
            continue;
        };
        let raw = record.remove(field.name).unwrap_or(Value::Null);
        let link = match field.field_type.kind() {
            FieldKind::ManyRelation => {
                let ids = many_ids(&raw);
                if let Some(related) = related.as_deref_mut() {
                    related.add(&target.remote, ids.iter().copied());
                }
                Link::Many(
                    ids.into_iter()
                        .map(|id| node_id(&target.local, id, locale))
                        .collect(),
                )
            }
            _ => {
                let id = one_id(&raw);
                if let (Some(related), Some(id)) = (related.as_deref_mut(), id) {
                    related.add(&target.remote, [id]);
                }
                Link::One(id.map(|id| node_id(&target.local, id, locale)))
            }
        };
        links.insert(field.name.to_owned(), link);
    }
    links
}

fn many_ids(raw: &Value) -> Vec<i64> {
    raw.as_array()
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

/// First element of an `[id, label]` pair.
fn one_id(raw: &Value) -> Option<i64> {
    match raw.as_array()?.as_slice() {
        [id, _] => id.as_i64(),
        _ => None,
    }
}
