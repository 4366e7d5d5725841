//! Error taxonomy for the governance core.
//!
//! Five classes of failure exist, and each one has a fixed way of reaching
//! the caller:
//!
//! | Class | Reaches the caller as |
//! |---|---|
//! | `ConfigurationUnavailable` | a `warn!` log; the loader substitutes the embedded table |
//! | `PolicyDenial` | a structured decision with `allowed = false`, or `AttemptDecision::Rejected` |
//! | `StageFault` | a failing `StageResult` attributed to the faulting stage |
//! | `IntegrityViolation` | a critical, blocking gate verdict |
//! | `ExhaustedEscalation` | a terminal `AttemptDecision::Exhausted` |
//!
//! Severity is attached to every class and is never lowered on the way out.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::audit::AuditError;

/// Result type alias for governance operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Severity shared by every failure class in the crate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A refusal issued by policy: hard block, insufficient evidence, forbidden
/// category. Returned as data, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDenial {
    /// Machine-readable code (e.g. `MUTATION_BLOCKED`, `PRE_CONDITION_FAILED`)
    pub code: String,
    /// Human-readable reason
    pub reason: String,
    pub severity: Severity,
}

impl PolicyDenial {
    pub fn new(code: impl Into<String>, reason: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
            severity,
        }
    }
}

impl std::fmt::Display for PolicyDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.reason)
    }
}

/// Tampering or protected-path modification detected while evaluating a gate.
///
/// Always critical. There is no override path inside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    /// Artifact or path the violation concerns
    pub subject: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl IntegrityViolation {
    pub fn new(subject: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            description: description.into(),
            expected: None,
            actual: None,
        }
    }

    /// Hash mismatch between what was declared and what was captured.
    pub fn hash_mismatch(
        subject: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        Self {
            description: format!("evidence hash mismatch for {subject}"),
            subject,
            expected: Some(expected.into()),
            actual: Some(actual.into()),
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Critical
    }
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subject, self.description)
    }
}

/// A stage returned an error or panicked. The runner turns this into a
/// failing `StageResult`.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("stage {stage} faulted: {message}")]
pub struct StageFault {
    pub stage: String,
    pub message: String,
}

impl StageFault {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the governance core.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Tier table could not be read, parsed or validated.
    #[error("configuration unavailable ({source_name}): {reason}")]
    ConfigurationUnavailable { source_name: String, reason: String },

    #[error("policy denial: {0}")]
    PolicyDenial(PolicyDenial),

    #[error(transparent)]
    StageFault(#[from] StageFault),

    #[error("integrity violation: {0}")]
    IntegrityViolation(IntegrityViolation),

    /// Struggle or budget exhaustion at the top tier.
    #[error("escalation exhausted at tier {tier}: {reason}")]
    ExhaustedEscalation { tier: String, reason: String },

    #[error("audit sink failure: {0}")]
    Audit(#[from] AuditError),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl GovernanceError {
    pub fn configuration(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Severity of this error. Integrity violations and exhausted escalation
    /// are always critical.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ConfigurationUnavailable { .. } => Severity::Medium,
            Self::PolicyDenial(denial) => denial.severity,
            Self::StageFault(_) => Severity::High,
            Self::IntegrityViolation(_) => Severity::Critical,
            Self::ExhaustedEscalation { .. } => Severity::Critical,
            Self::Audit(_) => Severity::Low,
            Self::FileRead { .. } | Self::JsonParse(_) | Self::TomlParse(_) => Severity::Medium,
        }
    }

    /// Whether this error must block the flow it occurred in.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::PolicyDenial(_)
                | Self::StageFault(_)
                | Self::IntegrityViolation(_)
                | Self::ExhaustedEscalation { .. }
        )
    }
}
