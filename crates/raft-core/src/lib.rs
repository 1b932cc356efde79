//! # raft-core
//!
//! why: define the replicated log data model shared by the consensus layer and the apply layer
//! relations: entries are produced by the external consensus driver, consumed by raft-apply
//! what: LogEntry, Command, and the json codec used to persist entries

pub mod log;

pub use log::{Command, LogEntry};
