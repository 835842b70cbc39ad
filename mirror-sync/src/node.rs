//! Local nodes and their identity.
//!
//! A node's id is a pure function of `(local type, remote id, locale)`, so a
//! record always lands on the same node no matter which pass or run fetched
//! it. The content digest is a SHA-256 over the canonical JSON of the record.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use mirror_core::LocalType;

use crate::error::SyncError;

/// One remote record as returned by `search_read`.
pub type Record = Map<String, Value>;

/// Stable identifier of a local node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Derive the node id for `(node_type, remote_id, locale)`.
///
/// `locale` is the raw remote language code (`en_US`), not the node's tag.
pub fn node_id(node_type: &LocalType, remote_id: i64, locale: &str) -> NodeId {
    let name = format!("{}-{}-{}", node_type.0, remote_id, locale);
    NodeId(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string())
}

/// Lowercase-with-dashes locale tag: `en_US` → `en-us`.
pub fn locale_tag(locale: &str) -> String {
    locale.to_lowercase().replace('_', "-")
}

/// Hex SHA-256 of the canonical JSON encoding of `content`.
///
/// `serde_json::Map` keeps keys sorted, so equal content hashes equally.
pub fn fingerprint<T: Serialize + ?Sized>(content: &T) -> Result<String, SyncError> {
    let bytes = serde_json::to_vec(content)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// A relation field rewritten into references to other nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    One(Option<NodeId>),
    Many(Vec<NodeId>),
}

/// Relation links of a node, keyed by remote field name.
pub type Links = BTreeMap<String, Link>;

/// The materialized unit of the local graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: LocalType,
    pub remote_id: i64,
    /// Locale tag, e.g. `en-us`.
    pub lang: String,
    pub write_date: Option<NaiveDateTime>,
    /// Normalized non-relation fields.
    #[serde(default)]
    pub fields: Record,
    #[serde(default)]
    pub links: Links,
    pub content_digest: String,
}
