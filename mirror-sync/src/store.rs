//! Node store seam and the in-memory implementation.
//!
//! The engine persists nothing itself; every node goes through [`NodeStore`].
//! Stores also keep a per-run liveness set: nodes written or touched during a
//! run survive [`MemoryNodeStore::sweep`], everything else is dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mirror_core::LocalType;

use crate::error::SyncError;
use crate::node::{Node, NodeId};

/// What `create_or_replace` did with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Same content digest as the stored node; nothing was written.
    Unchanged,
}

/// Persistence layer for local nodes.
pub trait NodeStore: Send + Sync {
    /// Store `node`, replacing any node with the same id. Identical digests
    /// are a no-op, not an error.
    fn create_or_replace(&self, node: Node) -> Result<UpsertOutcome, SyncError>;

    /// Remove a node. Returns whether it existed.
    fn delete(&self, id: &NodeId) -> Result<bool, SyncError>;

    fn get(&self, id: &NodeId) -> Result<Option<Node>, SyncError>;

    /// Mark a node as still live for this run.
    fn touch(&self, id: &NodeId) -> Result<(), SyncError>;

    fn list_by_type(&self, node_type: &LocalType) -> Result<Vec<Node>, SyncError>;
}

#[derive(Debug, Default)]
struct NodeTable {
    nodes: BTreeMap<NodeId, Node>,
    live: BTreeSet<NodeId>,
}

/// A `Mutex`-guarded map of nodes.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    table: Mutex<NodeTable>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing nodes. Seeded nodes start out not live.
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            table: Mutex::new(NodeTable {
                nodes,
                live: BTreeSet::new(),
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, NodeTable> {
        // A panic mid-operation leaves the map itself consistent.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every node, ordered by id.
    pub fn nodes(&self) -> Vec<Node> {
        self.table().nodes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every node not written or touched since the last sweep, then
    /// start a fresh liveness set. Returns the removed ids.
    pub fn sweep(&self) -> Vec<NodeId> {
        let mut table = self.table();
        let NodeTable { nodes, live } = &mut *table;
        let stale: Vec<NodeId> = nodes
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            nodes.remove(id);
        }
        live.clear();
        stale
    }
}

impl NodeStore for MemoryNodeStore {
    fn create_or_replace(&self, node: Node) -> Result<UpsertOutcome, SyncError> {
        let mut table = self.table();
        table.live.insert(node.id.clone());
        let outcome = match table.nodes.get(&node.id) {
            Some(existing) if existing.content_digest == node.content_digest => {
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };
        table.nodes.insert(node.id.clone(), node);
        Ok(outcome)
    }

    fn delete(&self, id: &NodeId) -> Result<bool, SyncError> {
        let mut table = self.table();
        table.live.remove(id);
        Ok(table.nodes.remove(id).is_some())
    }

    fn get(&self, id: &NodeId) -> Result<Option<Node>, SyncError> {
        Ok(self.table().nodes.get(id).cloned())
    }

    fn touch(&self, id: &NodeId) -> Result<(), SyncError> {
        let mut table = self.table();
        if table.nodes.contains_key(id) {
            table.live.insert(id.clone());
        }
        Ok(())
    }

    fn list_by_type(&self, node_type: &LocalType) -> Result<Vec<Node>, SyncError> {
        Ok(self
            .table()
            .nodes
            .values()
            .filter(|n| &n.node_type == node_type)
            .cloned()
            .collect())
    }
}
