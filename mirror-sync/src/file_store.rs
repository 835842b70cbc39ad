//! JSON-file node store.
//!
//! Persists a [`NodeStoreFile`] at `~/.odoo-mirror/nodes.json` (or wherever
//! `--store` points). Nodes live in a [`MemoryNodeStore`] while a run is in
//! flight; [`FileNodeStore::save`] writes them back with the `.tmp` + rename
//! pattern so a crash never leaves a half-written store behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mirror_core::LocalType;

use crate::error::{io_err, SyncError};
use crate::node::{Node, NodeId};
use crate::store::{MemoryNodeStore, NodeStore, UpsertOutcome};

/// On-disk node store payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStoreFile {
    pub synced_at: DateTime<Utc>,
    pub nodes: Vec<Node>,
}

#[derive(Debug)]
pub struct FileNodeStore {
    path: PathBuf,
    synced_at: Option<DateTime<Utc>>,
    inner: MemoryNodeStore,
}

impl FileNodeStore {
    /// Load the store at `path`.
    ///
    /// Returns an empty store if the file does not yet exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                synced_at: None,
                inner: MemoryNodeStore::new(),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let file: NodeStoreFile = serde_json::from_str(&contents)?;
        Ok(Self {
            path,
            synced_at: Some(file.synced_at),
            inner: MemoryNodeStore::with_nodes(file.nodes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the store was last saved; `None` if it never was.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.inner.nodes()
    }

    /// See [`MemoryNodeStore::sweep`].
    pub fn sweep(&self) -> Vec<NodeId> {
        self.inner.sweep()
    }

    /// Save atomically: write `<path>.tmp`, then rename over `<path>`.
    pub fn save(&mut self) -> Result<(), SyncError> {
        let Some(dir) = self.path.parent() else {
            return Err(io_err(
                &self.path,
                std::io::Error::other("invalid node store path"),
            ));
        };
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let synced_at = Utc::now();
        let file = NodeStoreFile {
            synced_at,
            nodes: self.inner.nodes(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        self.synced_at = Some(synced_at);
        tracing::debug!("saved {} node(s) to {}", file.nodes.len(), self.path.display());
        Ok(())
    }
}

impl NodeStore for FileNodeStore {
    fn create_or_replace(&self, node: Node) -> Result<UpsertOutcome, SyncError> {
        self.inner.create_or_replace(node)
    }

    fn delete(&self, id: &NodeId) -> Result<bool, SyncError> {
        self.inner.delete(id)
    }

    fn get(&self, id: &NodeId) -> Result<Option<Node>, SyncError> {
        self.inner.get(id)
    }

    fn touch(&self, id: &NodeId) -> Result<(), SyncError> {
        self.inner.touch(id)
    }

    fn list_by_type(&self, node_type: &LocalType) -> Result<Vec<Node>, SyncError> {
        self.inner.list_by_type(node_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_id, Record};
    use serde_json::json;
    use tempfile::TempDir;

    fn post(remote_id: i64) -> Node {
        let node_type = LocalType::from("OdooBlogPost");
        let mut fields = Record::new();
        fields.insert("name".into(), json!(format!("post {remote_id}")));
        Node {
            id: node_id(&node_type, remote_id, "en_US"),
            node_type,
            remote_id,
            lang: "en-us".into(),
            write_date: None,
            fields,
            links: Default::default(),
            content_digest: format!("digest-{remote_id}"),
        }
    }

    #[test]
    fn empty_store_when_file_missing() {
        let tmp = TempDir::new().expect("tmp");
        let store = FileNodeStore::open(tmp.path().join("nodes.json")).expect("open");
        assert!(store.nodes().is_empty());
        assert!(store.synced_at().is_none());
    }

    #[test]
    fn roundtrip_save_open() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("store").join("nodes.json");
        let mut store = FileNodeStore::open(&path).expect("open");
        store.create_or_replace(post(1)).expect("create");
        store.create_or_replace(post(2)).expect("create");
        store.save().expect("save");
        let saved_at = store.synced_at().expect("synced_at");

        let reopened = FileNodeStore::open(&path).expect("reopen");
        assert_eq!(reopened.nodes(), store.nodes());
        assert_eq!(reopened.synced_at(), Some(saved_at));
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("nodes.json");
        let mut store = FileNodeStore::open(&path).expect("open");
        store.save().expect("save");
        assert!(path.exists());
        assert!(
            !path.with_extension("json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn reopened_nodes_are_swept_unless_touched() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("nodes.json");
        let mut store = FileNodeStore::open(&path).expect("open");
        store.create_or_replace(post(1)).expect("create");
        store.create_or_replace(post(2)).expect("create");
        store.save().expect("save");

        let reopened = FileNodeStore::open(&path).expect("reopen");
        reopened.touch(&post(1).id).expect("touch");
        assert_eq!(reopened.sweep(), vec![post(2).id]);
    }

    #[test]
    fn corrupt_file_is_a_json_error() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("nodes.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = FileNodeStore::open(&path).unwrap_err();
        assert!(matches!(err, SyncError::Json(_)));
    }
}
