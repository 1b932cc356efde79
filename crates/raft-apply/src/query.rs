//! # query
//!
//! why: serve reads of applied state and the out-of-band raw key-value path
//! relations: reads what Applier wrote; raw writes here never pass through the replicated log
//! what: QueryService, StateDump

use crate::error::{Result, StorageError};
use crate::metadata::MetadataStore;
use crate::store::{DurableStore, Namespace};
use raft_core::LogEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read path over applied entries, plus direct raw string access
///
/// The raw methods (`set_string`, `del_string`) bypass the apply pipeline and
/// the last applied index. Their effects are local to this node: they are not
/// in the replicated log and will not be reproduced by replay elsewhere.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<DurableStore>,
}

/// Every record a node holds, for diagnostics and cross-node comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDump {
    pub last_applied_index: u64,
    pub voted_for: String,
    pub entries: BTreeMap<String, LogEntry>,
    pub raw: BTreeMap<String, String>,
}

impl QueryService {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// The entry that last wrote `key`, with its index and term
    pub fn get(&self, key: &str) -> Result<Option<LogEntry>> {
        let Some(bytes) = self.store.get(Namespace::Data, key.as_bytes())? else {
            return Ok(None);
        };
        decode_entry(key, &bytes).map(Some)
    }

    /// Raw value of `key`, or "" when absent or unreadable
    pub fn get_string(&self, key: &str) -> String {
        match self.store.get(Namespace::Raw, key.as_bytes()) {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => String::new(),
            Err(e) => {
                tracing::error!(key, error = %e, "failed to read raw value");
                String::new()
            }
        }
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.store
            .put(Namespace::Raw, key.as_bytes(), value.as_bytes())
    }

    /// Remove keys from both the raw and the applied-entry read paths
    ///
    /// All removals commit together. The last applied index is untouched.
    pub fn del_string(&self, keys: &[&str]) -> Result<()> {
        let mut txn = self.store.begin_transaction();
        for key in keys {
            txn.delete(Namespace::Data, key.as_bytes())
                .delete(Namespace::Raw, key.as_bytes());
        }
        txn.commit()
    }

    /// Snapshot every applied entry, raw pair and metadata record
    ///
    /// Reads are not taken under one transaction; run it on a quiet node for
    /// an exact picture.
    pub fn dump(&self) -> Result<StateDump> {
        let metadata = MetadataStore::new(self.store.clone());

        let mut entries = BTreeMap::new();
        for kv in self.store.scan(Namespace::Data) {
            let (key, value) = kv?;
            let key = String::from_utf8_lossy(&key).into_owned();
            let entry = decode_entry(&key, &value)?;
            entries.insert(key, entry);
        }

        let mut raw = BTreeMap::new();
        for kv in self.store.scan(Namespace::Raw) {
            let (key, value) = kv?;
            raw.insert(
                String::from_utf8_lossy(&key).into_owned(),
                String::from_utf8_lossy(&value).into_owned(),
            );
        }

        Ok(StateDump {
            last_applied_index: metadata.last_applied_index()?,
            voted_for: metadata.voted_for(),
            entries,
            raw,
        })
    }
}

fn decode_entry(key: &str, bytes: &[u8]) -> Result<LogEntry> {
    LogEntry::from_bytes(bytes).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })
}
