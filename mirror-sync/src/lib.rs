//! # mirror-sync
//!
//! Incremental Odoo → local node graph synchronization.
//!
//! Call [`pipeline::run`] with a loaded [`mirror_core::Config`], an
//! [`RpcConnector`], and a [`NodeStore`] to run the incremental pass followed
//! by the forced pass. [`engine::sync`] does the same over connections that
//! are already logged in.

pub mod connection;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod file_store;
pub mod garbage;
pub mod metadata;
pub mod node;
pub mod normalize;
pub mod pipeline;
pub mod plan;
pub mod relations;
pub mod rpc;
pub mod status;
pub mod store;
pub mod upsert;
pub mod watermark;

pub use connection::Connection;
pub use engine::{sync, ModelFailure, ModelResult, ModelStats, Phase, SyncReport};
pub use error::{RpcError, SyncError};
pub use file_store::FileNodeStore;
pub use node::{node_id, Link, Node, NodeId};
pub use rpc::{Credentials, RpcClient, RpcConnector};
pub use store::{MemoryNodeStore, NodeStore, UpsertOutcome};
