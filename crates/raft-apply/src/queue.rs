//! # queue
//!
//! why: make ascending, one-at-a-time application structural instead of a caller promise
//! relations: wraps an Applier; the consensus driver submits committed entries here
//! what: ApplyQueue with a single worker thread draining a bounded channel

use crate::apply::{Applier, ApplyOutcome};
use crate::error::{Result, StorageError};
use crate::metadata::MetadataStore;
use raft_core::LogEntry;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

/// Receives the outcome of one submitted entry
pub type Completion = oneshot::Receiver<Result<ApplyOutcome>>;

struct Job {
    entry: LogEntry,
    done: oneshot::Sender<Result<ApplyOutcome>>,
}

/// Serializes apply calls through one dedicated worker
///
/// Entries are applied in submission order. The worker remembers the last
/// index it applied (seeded from the store) and reports entries below it as
/// [`ApplyOutcome::Stale`] without writing, so redelivered old entries cannot
/// move the watermark backwards. An entry equal to the watermark is applied
/// again, which is harmless.
///
/// All methods block; do not call them from inside an async runtime.
pub struct ApplyQueue {
    tx: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ApplyQueue {
    /// Start the worker with room for `capacity` pending entries
    pub fn spawn(applier: Applier, metadata: &MetadataStore, capacity: usize) -> Result<Self> {
        let watermark = metadata.last_applied_index()?;
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let worker = thread::Builder::new()
            .name("raft-apply".to_string())
            .spawn(move || run(applier, rx, watermark))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Enqueue an entry, blocking while the queue is full
    pub fn submit(&self, entry: LogEntry) -> Result<Completion> {
        let tx = self.tx.as_ref().ok_or(StorageError::QueueClosed)?;
        let (done, completion) = oneshot::channel();
        tx.blocking_send(Job { entry, done })
            .map_err(|_| StorageError::QueueClosed)?;
        Ok(completion)
    }

    /// Enqueue an entry and wait until it has been applied
    pub fn apply(&self, entry: LogEntry) -> Result<ApplyOutcome> {
        self.submit(entry)?
            .blocking_recv()
            .map_err(|_| StorageError::QueueClosed)?
    }

    /// Apply everything already queued, then stop the worker
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.tx.take();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| StorageError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for ApplyQueue {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "apply queue did not stop cleanly");
        }
    }
}

fn run(applier: Applier, mut rx: mpsc::Receiver<Job>, mut watermark: u64) {
    tracing::debug!(watermark, "apply worker started");

    while let Some(Job { entry, done }) = rx.blocking_recv() {
        let outcome = if !entry.is_noop() && entry.index < watermark {
            tracing::debug!(index = entry.index, watermark, "dropping stale entry");
            Ok(ApplyOutcome::Stale {
                index: entry.index,
                last_applied: watermark,
            })
        } else {
            applier.apply(&entry)
        };

        if let Ok(ApplyOutcome::Applied { index }) = outcome {
            watermark = index;
        }

        // the submitter may have stopped waiting; the entry is applied regardless
        let _ = done.send(outcome);
    }

    tracing::debug!(watermark, "apply worker stopped");
}
