//! Local mirror status, computed from the node store alone.
//!
//! No remote calls: this reports what the next incremental pass would start
//! from, per mapped type.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use mirror_core::{Config, LocalType, RemoteModel};

use crate::error::SyncError;
use crate::store::NodeStore;
use crate::watermark;

/// Status of one mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeStatus {
    pub connection: String,
    pub remote: RemoteModel,
    pub local: LocalType,
    pub garbage: bool,
    pub nodes: usize,
    /// Locale tags present among the nodes.
    pub locales: BTreeSet<String>,
    /// Highest `write_date` seen; `None` before the first sync.
    pub watermark: Option<NaiveDateTime>,
    pub ties: usize,
}

/// Collect the status of every mapped type, in config order.
pub fn collect(config: &Config, store: &dyn NodeStore) -> Result<Vec<TypeStatus>, SyncError> {
    let mut statuses = Vec::new();
    for conn in &config.connections {
        for mapping in conn.all_models() {
            let nodes = store.list_by_type(&mapping.local)?;
            let mark = watermark::compute(&nodes);
            let dated = nodes.iter().any(|n| n.write_date.is_some());
            statuses.push(TypeStatus {
                connection: conn.label(),
                remote: mapping.remote.clone(),
                local: mapping.local.clone(),
                garbage: conn.is_garbage(mapping),
                nodes: nodes.len(),
                locales: nodes.iter().map(|n| n.lang.clone()).collect(),
                watermark: dated.then_some(mark.max),
                ties: mark.ties.len(),
            });
        }
    }
    Ok(statuses)
}

/// Format age from a chrono timestamp (node store `synced_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_id, Node, Record};
    use crate::store::MemoryNodeStore;
    use crate::watermark::parse_write_date;
    use chrono::Duration;
    use mirror_core::{ConnectionConfig, ModelMapping};

    fn node(remote_id: i64, locale: &str, write_date: &str) -> Node {
        let node_type = LocalType::from("Post");
        Node {
            id: node_id(&node_type, remote_id, locale),
            node_type,
            remote_id,
            lang: crate::node::locale_tag(locale),
            write_date: parse_write_date(write_date),
            fields: Record::new(),
            links: Default::default(),
            content_digest: String::new(),
        }
    }

    #[test]
    fn status_reports_counts_locales_and_watermark() {
        let config = Config {
            connections: vec![ConnectionConfig::new("https://erp", "db", "bot", "pw")
                .with_model(ModelMapping::new("blog.post", "Post"))
                .with_model(ModelMapping::new("blog.tag", "Tag"))],
        };
        let store = MemoryNodeStore::with_nodes([
            node(1, "en_US", "2024-01-01 10:00:00"),
            node(1, "fr_FR", "2024-01-01 10:00:00"),
            node(2, "en_US", "2024-01-01 09:00:00"),
        ]);

        let statuses = collect(&config, &store).expect("collect");
        assert_eq!(statuses.len(), 2);
        let post = &statuses[0];
        assert_eq!(post.nodes, 3);
        assert_eq!(post.locales, BTreeSet::from(["en-us".to_string(), "fr-fr".to_string()]));
        assert_eq!(post.watermark, parse_write_date("2024-01-01 10:00:00"));
        assert_eq!(post.ties, 1);

        let tag = &statuses[1];
        assert_eq!(tag.nodes, 0);
        assert_eq!(tag.watermark, None);
        assert!(!store.sweep().is_empty(), "status must not touch nodes");
    }

    #[test]
    fn age_formatting_buckets() {
        assert_eq!(format_seconds(59), "59s");
        assert_eq!(format_seconds(60 * 5), "5m");
        assert_eq!(format_seconds(60 * 60 * 3), "3h");
        assert_eq!(format_seconds(60 * 60 * 24 * 2), "2d");
        assert_eq!(format_datetime_age(Utc::now() + Duration::hours(1)), "0s");
    }
}
