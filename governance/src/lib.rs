//! Foreman Governance Core
//!
//! Deterministic decision engines for autonomous build agents:
//!
//! - **Tiered selection and escalation** ([`escalation`], [`tiers`]): route a
//!   task to a cost tier, detect struggle in its attempt history, escalate
//!   one rank at a time and de-escalate after sustained clean success.
//! - **Stage pipelines** ([`pipeline`]): the six-stage builder blueprint and
//!   the nine-control pre-merge gate, both fail-fast and audited.
//! - **Drift classification** ([`drift`]): structural diffs between
//!   signatures and a stability label for a window of them.
//!
//! Engines are constructed once through [`GovernanceContext`] and passed by
//! reference.
//!
//! # Usage
//!
//! ```bash
//! foreman-governance select --domain builder --descriptor task.json
//! foreman-governance gate --candidate pr-123.json
//! FOREMAN_AUDIT_LOG=audit.jsonl foreman-governance drift --signatures window.json
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod audit;
pub mod config;
pub mod context;
pub mod drift;
pub mod error;
pub mod escalation;
pub mod pipeline;
pub mod tiers;

pub use audit::{AuditEntry, AuditError, AuditQueue, AuditSink, JsonlAuditSink, MemoryAuditSink, SharedAuditSink};
pub use config::{ConfigError, ConfigOverrides, GovernanceConfig};
pub use context::GovernanceContext;
pub use drift::{
    analyze_constraint_stress, classify_drift_pattern, compute_drift, DriftClassification, DriftClassificationResult,
    Signature,
};
pub use error::{GovernanceError, GovernanceResult, IntegrityViolation, PolicyDenial, Severity, StageFault};
pub use escalation::{
    consider_de_escalation, detect_struggle, AttemptDecision, AttemptLedger, BuildAttempt, EscalationDecision,
    EscalationEngine, StruggleSignal, TieredSelector,
};
pub use pipeline::{Blueprint, Gate, GateVerdict, MergeCandidate, PipelineExecutionResult, StageResult};
pub use tiers::{Tier, TierTable};
