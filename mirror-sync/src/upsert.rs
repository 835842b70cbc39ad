//! Node upsert engine.

use chrono::NaiveDateTime;
use serde::Serialize;

use mirror_core::LocalType;

use crate::error::SyncError;
use crate::node::{fingerprint, locale_tag, node_id, Links, Node, NodeId, Record};
use crate::store::{NodeStore, UpsertOutcome};

/// A fetched record after normalization and link resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub remote_id: i64,
    pub write_date: Option<NaiveDateTime>,
    pub fields: Record,
    pub links: Links,
}

/// Digest input: everything that makes up a node's content.
#[derive(Serialize)]
struct DigestInput<'a> {
    id: i64,
    write_date: Option<NaiveDateTime>,
    fields: &'a Record,
    links: &'a Links,
}

/// Content fingerprint of a resolved record.
pub fn content_digest(record: &ResolvedRecord) -> Result<String, SyncError> {
    fingerprint(&DigestInput {
        id: record.remote_id,
        write_date: record.write_date,
        fields: &record.fields,
        links: &record.links,
    })
}

/// Create or replace the node for `record` in `locale`.
///
/// Under a forced refresh an existing node keeps its stored digest, so the
/// store sees identical content and leaves the node as it is.
/// Forced refreshes never replace content; they only create missing nodes.
pub fn upsert_record(
    store: &dyn NodeStore,
    node_type: &LocalType,
    locale: &str,
    record: ResolvedRecord,
    forced: bool,
) -> Result<(NodeId, UpsertOutcome), SyncError> {
    let id = node_id(node_type, record.remote_id, locale);
    let existing_digest = if forced {
        store.get(&id)?.map(|node| node.content_digest)
    } else {
        None
    };
    let content_digest = match existing_digest {
        Some(digest) => digest,
        None => content_digest(&record)?,
    };

    let node = Node {
        id: id.clone(),
        node_type: node_type.clone(),
        remote_id: record.remote_id,
        lang: locale_tag(locale),
        write_date: record.write_date,
        fields: record.fields,
        links: record.links,
        content_digest,
    };
    let outcome = store.create_or_replace(node)?;
    match outcome {
        UpsertOutcome::Created => {
            tracing::debug!("created {} {} ({})", node_type, record.remote_id, locale)
        }
        UpsertOutcome::Updated => {
            tracing::debug!("updated {} {} ({})", node_type, record.remote_id, locale)
        }
        UpsertOutcome::Unchanged => {}
    }
    Ok((id, outcome))
}
