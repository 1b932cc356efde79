//! # config
//!
//! why: keep every tunable of the durable store in one serde-friendly struct
//! relations: consumed by DurableStore::open and DurableStateMachine::open
//! what: StoreConfig with defaults, builder helpers and path layout

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a node's state machine store
///
/// On disk the store lives at `<data_dir>/<node_id>/state_machine`, so several
/// nodes can share one `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory shared by all nodes on this host.
    pub data_dir: PathBuf,

    /// Identity of this node, used to scope its directory.
    pub node_id: String,

    /// Flush to disk before acknowledging a commit or a direct write.
    pub sync_writes: bool,

    /// Page cache size of the embedded engine, in bytes.
    pub cache_capacity: u64,

    /// Background flush interval. `None` disables the background flusher.
    pub flush_every_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./raft-data"),
            node_id: "default".to_string(),
            sync_writes: true,
            cache_capacity: 1024 * 1024 * 1024,
            flush_every_ms: Some(500),
        }
    }
}

impl StoreConfig {
    /// Create a config for `node_id` rooted at `data_dir`, other values default
    pub fn new(data_dir: impl Into<PathBuf>, node_id: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    pub fn with_flush_every_ms(mut self, every: Option<u64>) -> Self {
        self.flush_every_ms = every;
        self
    }

    /// Directory owned by this node
    pub fn node_dir(&self) -> PathBuf {
        self.data_dir.join(&self.node_id)
    }

    /// Directory holding the state machine engine files
    pub fn state_machine_dir(&self) -> PathBuf {
        self.node_dir().join("state_machine")
    }

    pub(crate) fn sled_config(&self) -> sled::Config {
        sled::Config::new()
            .path(self.state_machine_dir())
            .cache_capacity(self.cache_capacity)
            .flush_every_ms(self.flush_every_ms)
    }
}
