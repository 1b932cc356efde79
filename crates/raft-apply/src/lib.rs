//! # raft-apply
//!
//! why: durably apply committed raft entries together with the last applied watermark
//! relations: consumes raft-core log entries delivered by the consensus driver
//! what: DurableStore (sled), Applier, ApplyQueue, MetadataStore, QueryService, StateMachine
//!
//! Persisted layout is one sled database per node under
//! `<data_dir>/<node_id>/state_machine`, with three disjoint trees: applied
//! entries, raw strings, and the reserved metadata records.

mod apply;
mod config;
mod error;
mod metadata;
mod query;
mod queue;
mod state_machine;
mod store;

pub use apply::{Applier, ApplyOutcome};
pub use config::StoreConfig;
pub use error::{Result, StorageError};
pub use metadata::MetadataStore;
pub use query::{QueryService, StateDump};
pub use queue::{ApplyQueue, Completion};
pub use state_machine::{DurableStateMachine, InMemoryStateMachine, StateMachine};
pub use store::{DurableStore, Namespace, Transaction};

pub use raft_core::{Command, LogEntry};
