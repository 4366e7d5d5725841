//! Append-only audit trail.
//!
//! Decisions are final before they are audited: a failed write is logged and
//! dropped, it never changes the decision that produced it. Sinks must keep
//! per-entity append order; [`AuditQueue`] adds that guarantee on top of any
//! sink when writers are concurrent.

mod queue;
mod sink;

pub use queue::AuditQueue;
pub use sink::{JsonlAuditSink, MemoryAuditSink, NullAuditSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Entry kinds written by the core.
pub mod kinds {
    pub const PIPELINE_OUTCOME: &str = "pipeline_outcome";
    pub const ESCALATION: &str = "escalation";
    pub const ESCALATION_EXHAUSTED: &str = "escalation_exhausted";
    pub const ESCALATION_REJECTED: &str = "escalation_rejected";
    pub const DE_ESCALATION: &str = "de_escalation";
    pub const GATE_VERDICT: &str = "gate_verdict";
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Failed to write audit entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Audit sink lock poisoned")]
    LockPoisoned,

    #[error("Audit queue closed")]
    QueueClosed,
}

pub type AuditResult<T> = Result<T, AuditError>;

/// Shared reference to an audit sink
pub type SharedAuditSink = Arc<dyn AuditSink>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub entity_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
}

impl AuditEntry {
    pub fn new(entity_id: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            entity_id: entity_id.into(),
            kind: kind.into(),
            payload,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> AuditResult<()>;
}

/// Append and forget: failures are logged, never returned.
pub fn record(sink: &dyn AuditSink, entry: AuditEntry) {
    let kind = entry.kind.clone();
    let entity_id = entry.entity_id.clone();
    if let Err(e) = sink.append(entry) {
        tracing::warn!(kind = %kind, entity_id = %entity_id, "Failed to append audit entry: {}", e);
    }
}
