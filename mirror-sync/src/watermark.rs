//! Watermark tracking over already-materialized nodes.
//!
//! The remote `write_date` has one-second resolution, so the highest
//! timestamp seen locally is not a safe cursor on its own: a sibling record
//! may have been written in that same second after our last fetch. The
//! watermark therefore carries the set of ids sitting exactly on the maximum
//! (the tie-set) so the next fetch can re-examine that second.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDateTime};

use mirror_core::LocalType;

use crate::error::SyncError;
use crate::node::Node;
use crate::store::NodeStore;

/// Remote timestamp format: `2024-03-01 09:15:00`, UTC, second resolution.
pub const WRITE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Remote name of the last-modified field.
pub const WRITE_DATE: &str = "write_date";

pub fn parse_write_date(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, WRITE_DATE_FORMAT).ok()
}

pub fn format_write_date(ts: NaiveDateTime) -> String {
    ts.format(WRITE_DATE_FORMAT).to_string()
}

/// Per-model change-detection state derived from local nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    /// Highest `write_date` among local nodes; the epoch when there are none.
    pub max: NaiveDateTime,
    /// Remote ids whose `write_date` equals `max` exactly.
    pub ties: BTreeSet<i64>,
    /// Whether any local node of the type existed.
    pub has_nodes: bool,
}

impl Default for Watermark {
    fn default() -> Self {
        Self {
            max: NaiveDateTime::default(),
            ties: BTreeSet::new(),
            has_nodes: false,
        }
    }
}

impl Watermark {
    /// Fold one node into the watermark.
    pub fn observe(&mut self, remote_id: i64, write_date: Option<NaiveDateTime>) {
        self.has_nodes = true;
        let Some(ts) = write_date else {
            return;
        };
        if ts > self.max {
            self.max = ts;
            self.ties.clear();
            self.ties.insert(remote_id);
        } else if ts == self.max {
            self.ties.insert(remote_id);
        }
    }

    /// Start of the second after `max`: anything at or past it is new.
    pub fn next_second(&self) -> NaiveDateTime {
        self.max + Duration::seconds(1)
    }
}

/// Compute the watermark of `nodes` without side effects.
pub fn compute<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Watermark {
    let mut watermark = Watermark::default();
    for node in nodes {
        watermark.observe(node.remote_id, node.write_date);
    }
    watermark
}

/// Compute the watermark of every local node of `node_type`, touching each
/// node so the store keeps it alive through this run.
pub fn track(store: &dyn NodeStore, node_type: &LocalType) -> Result<Watermark, SyncError> {
    let nodes = store.list_by_type(node_type)?;
    for node in &nodes {
        store.touch(&node.id)?;
    }
    Ok(compute(&nodes))
}
