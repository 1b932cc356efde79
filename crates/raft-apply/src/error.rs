//! # error
//!
//! why: give every storage failure a typed variant instead of collapsing them into io errors
//! relations: returned by store, metadata, apply, query and the state machine facade
//! what: StorageError, Result alias

use thiserror::Error;

/// Result type for apply-layer operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by the apply layer
#[derive(Debug, Error)]
pub enum StorageError {
    /// The embedded engine failed to read or write.
    #[error("storage io error: {0}")]
    Io(#[from] sled::Error),

    /// Creating the node's state directory failed.
    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    /// Bytes at a key do not decode as a log entry, or an entry could not be encoded.
    #[error("cannot (de)serialize record at key {key:?}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Commit failed; every buffered write was discarded.
    #[error("transaction failed and was rolled back: {source}")]
    Transaction {
        #[source]
        source: sled::Error,
    },

    /// Rejected before any state was touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A reserved record exists but holds garbage.
    #[error("corrupt record at key {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("apply queue is closed")]
    QueueClosed,

    #[error("apply worker panicked")]
    WorkerPanicked,
}
