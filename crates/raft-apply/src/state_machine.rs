//! # state_machine
//!
//! why: give the rest of the node one handle over applying, querying and election metadata
//! relations: composes Applier, MetadataStore and QueryService over one injected DurableStore
//! what: StateMachine trait, DurableStateMachine, InMemoryStateMachine for testing

use crate::apply::{Applier, ApplyOutcome};
use crate::config::StoreConfig;
use crate::error::{Result, StorageError};
use crate::metadata::MetadataStore;
use crate::query::{QueryService, StateDump};
use crate::queue::ApplyQueue;
use crate::store::DurableStore;
use raft_core::LogEntry;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The downstream interface of the apply layer
///
/// this abstraction allows the same driver code to work with:
/// - the durable store (production)
/// - in-memory state (testing)
///
/// `apply` must be called for committed entries one at a time, in ascending
/// index order.
pub trait StateMachine: Send + Sync {
    /// apply one committed entry; no-op entries are skipped
    fn apply(&self, entry: &LogEntry) -> Result<ApplyOutcome>;

    /// the entry that last wrote `key`
    fn get(&self, key: &str) -> Result<Option<LogEntry>>;

    /// raw value of `key`, "" when absent or unreadable
    fn get_string(&self, key: &str) -> String;

    /// write a raw value outside the replicated log
    fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// delete keys from both read paths outside the replicated log
    fn del_string(&self, keys: &[&str]) -> Result<()>;

    fn last_applied_index(&self) -> Result<u64>;

    /// "" when this node has not voted
    fn voted_for(&self) -> String;

    /// `None` is rejected and leaves the stored vote alone
    fn set_voted_for(&self, candidate: Option<&str>) -> Result<()>;
}

// -- durable implementation --

/// State machine backed by the node's durable store
///
/// Construct once at node startup and share it (or its components) by
/// reference. Every component holds the same store handle.
#[derive(Debug, Clone)]
pub struct DurableStateMachine {
    store: Arc<DurableStore>,
    applier: Applier,
    metadata: MetadataStore,
    query: QueryService,
}

impl DurableStateMachine {
    /// Open the store described by `config` and wire the components to it
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let store = DurableStore::open(config)?;
        Ok(Self::with_store(Arc::new(store)))
    }

    pub fn with_store(store: Arc<DurableStore>) -> Self {
        Self {
            applier: Applier::new(store.clone()),
            metadata: MetadataStore::new(store.clone()),
            query: QueryService::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    pub fn applier(&self) -> &Applier {
        &self.applier
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    /// Start a serialized apply queue over this store
    pub fn apply_queue(&self, capacity: usize) -> Result<ApplyQueue> {
        ApplyQueue::spawn(self.applier.clone(), &self.metadata, capacity)
    }

    pub fn dump(&self) -> Result<StateDump> {
        self.query.dump()
    }

    /// Flush and drop this handle
    ///
    /// The files are released once every other clone and component holding
    /// the store is gone too.
    pub fn close(self) -> Result<()> {
        self.store.flush()?;
        tracing::info!(path = %self.store.path().display(), "state machine closed");
        Ok(())
    }
}

impl StateMachine for DurableStateMachine {
    fn apply(&self, entry: &LogEntry) -> Result<ApplyOutcome> {
        self.applier.apply(entry)
    }

    fn get(&self, key: &str) -> Result<Option<LogEntry>> {
        self.query.get(key)
    }

    fn get_string(&self, key: &str) -> String {
        self.query.get_string(key)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.query.set_string(key, value)
    }

    fn del_string(&self, keys: &[&str]) -> Result<()> {
        self.query.del_string(keys)
    }

    fn last_applied_index(&self) -> Result<u64> {
        self.metadata.last_applied_index()
    }

    fn voted_for(&self) -> String {
        self.metadata.voted_for()
    }

    fn set_voted_for(&self, candidate: Option<&str>) -> Result<()> {
        self.metadata.set_voted_for(candidate)
    }
}

// -- in-memory implementation --

/// in-memory state machine for testing
///
/// same contract as the durable one, no persistence across restarts
#[derive(Debug, Default)]
pub struct InMemoryStateMachine {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, LogEntry>,
    raw: BTreeMap<String, String>,
    last_applied: u64,
    voted_for: Option<String>,
}

impl InMemoryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dump(&self) -> StateDump {
        let state = self.read();
        StateDump {
            last_applied_index: state.last_applied,
            voted_for: state.voted_for.clone().unwrap_or_default(),
            entries: state.entries.clone(),
            raw: state.raw.clone(),
        }
    }
}

impl StateMachine for InMemoryStateMachine {
    fn apply(&self, entry: &LogEntry) -> Result<ApplyOutcome> {
        let Some(command) = &entry.command else {
            return Ok(ApplyOutcome::Skipped);
        };
        let mut state = self.write();
        state.entries.insert(command.key.clone(), entry.clone());
        state.last_applied = entry.index;
        Ok(ApplyOutcome::Applied { index: entry.index })
    }

    fn get(&self, key: &str) -> Result<Option<LogEntry>> {
        Ok(self.read().entries.get(key).cloned())
    }

    fn get_string(&self, key: &str) -> String {
        self.read().raw.get(key).cloned().unwrap_or_default()
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.write().raw.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn del_string(&self, keys: &[&str]) -> Result<()> {
        let mut state = self.write();
        for key in keys {
            state.entries.remove(*key);
            state.raw.remove(*key);
        }
        Ok(())
    }

    fn last_applied_index(&self) -> Result<u64> {
        Ok(self.read().last_applied)
    }

    fn voted_for(&self) -> String {
        self.read().voted_for.clone().unwrap_or_default()
    }

    fn set_voted_for(&self, candidate: Option<&str>) -> Result<()> {
        let Some(candidate) = candidate else {
            tracing::error!("refusing to store an absent voted_for candidate");
            return Err(StorageError::InvalidArgument(
                "voted_for candidate must be present".to_string(),
            ));
        };
        self.write().voted_for = Some(candidate.to_string());
        Ok(())
    }
}
