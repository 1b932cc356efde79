//! # store
//!
//! why: provide the embedded transactional key-value engine all persisted state goes through
//! relations: shared (behind an Arc) by the applier, metadata store and query service
//! what: DurableStore over sled, Namespace, buffered Transaction with commit/rollback

use crate::config::StoreConfig;
use crate::error::{Result, StorageError};
use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;
use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};

/// Disjoint key spaces inside one store
///
/// Each namespace is its own sled tree, so a key in one can never shadow or
/// corrupt a key in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Serialized log entries written by the apply pipeline.
    Data,
    /// Raw strings written outside the replicated log.
    Raw,
    /// Reserved singleton records (last applied index, voted for).
    Meta,
}

impl Namespace {
    fn tree_name(self) -> &'static str {
        match self {
            Namespace::Data => "data",
            Namespace::Raw => "raw",
            Namespace::Meta => "meta",
        }
    }
}

/// The node's durable store
///
/// Opened once per process and shared by reference. Dropping the last handle
/// flushes and releases the underlying files.
#[derive(Debug)]
pub struct DurableStore {
    db: sled::Db,
    data: sled::Tree,
    raw: sled::Tree,
    meta: sled::Tree,
    path: PathBuf,
    sync_writes: bool,
}

impl DurableStore {
    /// Open (or create) the store in the node's state machine directory
    #[tracing::instrument(level = "debug", skip(config), fields(node_id = %config.node_id))]
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = config.state_machine_dir();
        if !path.exists() {
            fs::create_dir_all(&path)?;
            tracing::warn!(path = %path.display(), "created state machine directory");
        }

        let db = config.sled_config().open()?;
        let data = db.open_tree(Namespace::Data.tree_name())?;
        let raw = db.open_tree(Namespace::Raw.tree_name())?;
        let meta = db.open_tree(Namespace::Meta.tree_name())?;

        tracing::info!(path = %path.display(), recovered = db.was_recovered(), "state machine store opened");

        Ok(Self {
            db,
            data,
            raw,
            meta,
            path,
            sync_writes: config.sync_writes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tree(&self, ns: Namespace) -> &sled::Tree {
        match ns {
            Namespace::Data => &self.data,
            Namespace::Raw => &self.raw,
            Namespace::Meta => &self.meta,
        }
    }

    pub fn get(&self, ns: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.tree(ns).get(key)?;
        Ok(value.map(|v| v.to_vec()))
    }

    /// Write one key outside any transaction
    pub fn put(&self, ns: Namespace, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree(ns).insert(key, value)?;
        self.sync()
    }

    /// Remove every key in `keys`, one by one, outside any transaction
    pub fn delete<K: AsRef<[u8]>>(&self, ns: Namespace, keys: &[K]) -> Result<()> {
        let tree = self.tree(ns);
        for key in keys {
            tree.remove(key.as_ref())?;
        }
        self.sync()
    }

    /// Iterate over every pair in a namespace, in key order
    pub fn scan(&self, ns: Namespace) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        self.tree(ns)
            .iter()
            .map(|kv| kv.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(StorageError::from))
    }

    /// Start buffering writes that will commit atomically
    pub fn begin_transaction(&self) -> Transaction<'_> {
        Transaction {
            store: self,
            ops: Vec::new(),
            finished: false,
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Flush and release this handle
    pub fn close(self) -> Result<()> {
        self.flush()?;
        tracing::info!(path = %self.path.display(), "state machine store closed");
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        if self.sync_writes {
            self.flush()?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum WriteOp {
    Put {
        ns: Namespace,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        ns: Namespace,
        key: Vec<u8>,
    },
}

/// A group of writes that commits or rolls back as a unit
///
/// Writes are buffered until [`Transaction::commit`]. The commit runs as one
/// serializable engine transaction across every namespace: two transactions
/// writing the same key are serialized, disjoint ones proceed independently.
/// Dropping a transaction without committing discards its writes.
#[must_use = "an uncommitted transaction is rolled back when dropped"]
#[derive(Debug)]
pub struct Transaction<'a> {
    store: &'a DurableStore,
    ops: Vec<WriteOp>,
    finished: bool,
}

impl Transaction<'_> {
    pub fn put(
        &mut self,
        ns: Namespace,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.ops.push(WriteOp::Put {
            ns,
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, ns: Namespace, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(WriteOp::Delete { ns, key: key.into() });
        self
    }

    /// Number of buffered writes
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every buffered write atomically, then flush if the store syncs writes
    ///
    /// On failure nothing is applied and the engine error is returned.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let ops = std::mem::take(&mut self.ops);
        if ops.is_empty() {
            return Ok(());
        }

        let store = self.store;
        let result: TransactionResult<(), Infallible> = (&store.data, &store.raw, &store.meta)
            .transaction(|(data, raw, meta)| {
                for op in &ops {
                    let ns = match op {
                        WriteOp::Put { ns, .. } | WriteOp::Delete { ns, .. } => *ns,
                    };
                    let tree = match ns {
                        Namespace::Data => data,
                        Namespace::Raw => raw,
                        Namespace::Meta => meta,
                    };
                    match op {
                        WriteOp::Put { key, value, .. } => {
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        WriteOp::Delete { key, .. } => {
                            tree.remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(never)) => match never {},
            Err(TransactionError::Storage(source)) => {
                tracing::warn!(writes = ops.len(), error = %source, "commit failed, transaction rolled back");
                return Err(StorageError::Transaction { source });
            }
        }

        store.sync()
    }

    /// Discard every buffered write
    pub fn rollback(mut self) {
        self.finished = true;
        tracing::debug!(discarded = self.ops.len(), "transaction rolled back");
        self.ops.clear();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.ops.is_empty() {
            tracing::warn!(discarded = self.ops.len(), "uncommitted transaction dropped, rolling back");
        }
    }
}
