//! # log
//!
//! why: describe one committed slot of the replicated log and the command it carries
//! relations: applied by raft-apply, stored verbatim under the command key
//! what: LogEntry struct, Command struct, json encode/decode helpers

use serde::{Deserialize, Serialize};

/// A single-key "set" mutation carried by a log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub key: String,
    pub value: String,
}

impl Command {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single entry in the replicated log
///
/// An entry without a command is a no-op (barrier/heartbeat) entry: it only
/// establishes commit order and never touches the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created
    pub term: u64,
    /// The index of this entry in the log (1-indexed)
    pub index: u64,
    /// The command to be applied to the state machine, if any
    pub command: Option<Command>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: u64, index: u64, command: Option<Command>) -> Self {
        Self { term, index, command }
    }

    /// Create an entry carrying a `set key value` command
    pub fn set(term: u64, index: u64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(term, index, Some(Command::new(key, value)))
    }

    /// Create a no-op entry
    pub fn noop(term: u64, index: u64) -> Self {
        Self::new(term, index, None)
    }

    pub fn is_noop(&self) -> bool {
        self.command.is_none()
    }

    /// The key this entry writes, if it carries a command
    pub fn key(&self) -> Option<&str> {
        self.command.as_ref().map(|c| c.key.as_str())
    }

    /// Encode the whole entry (index, term and command) as stored by the apply layer
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
