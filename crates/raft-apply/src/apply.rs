//! # apply
//!
//! why: turn committed log entries into durable state together with the last applied watermark
//! relations: fed by the consensus driver directly or through ApplyQueue, writes via DurableStore
//! what: Applier, ApplyOutcome

use crate::error::{Result, StorageError};
use crate::metadata::{encode_index, LAST_APPLIED_KEY};
use crate::store::{DurableStore, Namespace};
use raft_core::{Command, LogEntry};
use std::sync::Arc;

/// What an apply call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No command to apply; storage untouched.
    Skipped,
    /// The command and the watermark were committed together.
    Applied { index: u64 },
    /// Older than what the apply queue already applied; storage untouched.
    Stale { index: u64, last_applied: u64 },
}

/// Applies committed entries to the state machine
///
/// `apply` is a blind overwrite of the command key and of the last applied
/// index, so it is idempotent for a given entry. It does NOT order concurrent
/// callers: applies of different keys may commit in any order, letting the
/// watermark regress. Callers must apply entries one at a time in ascending
/// index order, or go through [`crate::ApplyQueue`] which does that for them.
#[derive(Debug, Clone)]
pub struct Applier {
    store: Arc<DurableStore>,
}

impl Applier {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// Apply one committed entry
    ///
    /// The serialized entry lands under its command key and the entry index
    /// under the last applied record in a single transaction. On failure
    /// neither write is visible; the error is logged and returned, never retried.
    #[tracing::instrument(level = "debug", skip(self, entry), fields(index = entry.index, term = entry.term))]
    pub fn apply(&self, entry: &LogEntry) -> Result<ApplyOutcome> {
        let Some(command) = &entry.command else {
            tracing::trace!("no-op entry, nothing to apply");
            return Ok(ApplyOutcome::Skipped);
        };

        match self.commit_one(entry, command) {
            Ok(()) => {
                tracing::debug!(key = %command.key, "applied log entry");
                Ok(ApplyOutcome::Applied { index: entry.index })
            }
            Err(e) => {
                tracing::error!(index = entry.index, error = %e, "failed to apply log entry");
                Err(e)
            }
        }
    }

    fn commit_one(&self, entry: &LogEntry, command: &Command) -> Result<()> {
        let record = encode_entry(entry, command)?;
        let mut txn = self.store.begin_transaction();
        txn.put(Namespace::Data, command.key.as_bytes(), record)
            .put(Namespace::Meta, LAST_APPLIED_KEY, encode_index(entry.index));
        txn.commit()
    }

    /// Apply a run of committed entries in one transaction
    ///
    /// Entries must be in strictly ascending index order. No-op entries are
    /// skipped; the watermark ends at the highest index that carried a
    /// command. Either the whole batch lands or none of it does.
    #[tracing::instrument(level = "debug", skip(self, entries), fields(len = entries.len()))]
    pub fn apply_batch(&self, entries: &[LogEntry]) -> Result<ApplyOutcome> {
        if let Some(pair) = entries.windows(2).find(|w| w[1].index <= w[0].index) {
            return Err(StorageError::InvalidArgument(format!(
                "batch is not in ascending index order: {} followed by {}",
                pair[0].index, pair[1].index
            )));
        }

        let mut txn = self.store.begin_transaction();
        let mut last = None;
        for entry in entries {
            let Some(command) = &entry.command else {
                continue;
            };
            txn.put(
                Namespace::Data,
                command.key.as_bytes(),
                encode_entry(entry, command)?,
            );
            last = Some(entry.index);
        }

        let Some(index) = last else {
            return Ok(ApplyOutcome::Skipped);
        };
        txn.put(Namespace::Meta, LAST_APPLIED_KEY, encode_index(index));

        if let Err(e) = txn.commit() {
            tracing::error!(
                first = entries.first().map(|entry| entry.index),
                last = index,
                error = %e,
                "failed to apply log batch"
            );
            return Err(e);
        }

        tracing::debug!(last = index, "applied log batch");
        Ok(ApplyOutcome::Applied { index })
    }
}

fn encode_entry(entry: &LogEntry, command: &Command) -> Result<Vec<u8>> {
    entry
        .to_bytes()
        .map_err(|source| StorageError::Serialization {
            key: command.key.clone(),
            source,
        })
}
