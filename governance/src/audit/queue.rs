//! Single-writer audit queue.
//!
//! ```text
//!  engine ──┐
//!  runner ──┼──▶ mpsc (unbounded) ──▶ writer (blocking task) ──▶ inner sink
//!  gate   ──┘
//! ```
//!
//! One consumer drains the channel, so entries reach the inner sink in
//! submission order, per entity and globally.

use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AuditEntry, AuditError, AuditResult, AuditSink, SharedAuditSink};

pub struct AuditQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<AuditEntry>>>,
    writer: Mutex<Option<JoinHandle<usize>>>,
}

impl AuditQueue {
    /// Start the writer. Must be called from within a Tokio runtime.
    pub fn spawn(inner: SharedAuditSink) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuditEntry>();

        let writer = tokio::task::spawn_blocking(move || {
            let mut written = 0usize;
            while let Some(entry) = receiver.blocking_recv() {
                let kind = entry.kind.clone();
                match inner.append(entry) {
                    Ok(()) => written += 1,
                    Err(e) => warn!(kind = %kind, "Audit writer failed to append: {}", e),
                }
            }
            debug!(written, "Audit writer drained");
            written
        });

        Self {
            sender: Mutex::new(Some(sender)),
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Close the queue and wait until every accepted entry has been handed to
    /// the inner sink. Returns how many were written successfully.
    pub async fn shutdown(&self) -> AuditResult<usize> {
        let sender = self.sender.lock().map_err(|_| AuditError::LockPoisoned)?.take();
        drop(sender);

        let writer = self.writer.lock().map_err(|_| AuditError::LockPoisoned)?.take();
        match writer {
            Some(handle) => handle.await.map_err(|e| {
                warn!("Audit writer task failed: {}", e);
                AuditError::QueueClosed
            }),
            None => Ok(0),
        }
    }
}

impl AuditSink for AuditQueue {
    fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        let guard = self.sender.lock().map_err(|_| AuditError::LockPoisoned)?;
        match guard.as_ref() {
            Some(sender) => sender.send(entry).map_err(|_| AuditError::QueueClosed),
            None => Err(AuditError::QueueClosed),
        }
    }
}
