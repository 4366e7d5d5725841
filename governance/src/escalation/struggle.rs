//! Struggle detection: one prioritized diagnosis per attempt history.
//!
//! Rules are checked in a fixed order and the first match wins:
//!
//! ```text
//! last attempt succeeded ─────────────▶ None
//! "QIC validation failed" (any) ──────▶ qic_failure            (high)
//! TypeError / SyntaxError / ... (any) ▶ invalid_code_generation (high)
//! missing import  (>= threshold) ─────▶ missing_imports        (medium)
//! failures        (>= threshold) ─────▶ repeated_errors        (medium)
//! otherwise ──────────────────────────▶ None
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Severity;
use crate::escalation::attempt::{AttemptResult, BuildAttempt};
use crate::tiers::defaults::rules;
use crate::tiers::TierTable;

pub const QUALITY_GATE_PATTERNS: &[&str] = &["QIC validation failed"];
pub const INVALID_CODE_PATTERNS: &[&str] = &["TypeError", "SyntaxError", "Cannot read property"];
pub const MISSING_IMPORT_PATTERNS: &[&str] = &["Cannot find name", "Cannot find module"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StruggleType {
    QicFailure,
    InvalidCodeGeneration,
    MissingImports,
    RepeatedErrors,
    PartialFileRewrites,
    TokenOverflow,
    AmbiguityDetected,
    DirectiveNotFollowed,
}

impl std::fmt::Display for StruggleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QicFailure => write!(f, "qic_failure"),
            Self::InvalidCodeGeneration => write!(f, "invalid_code_generation"),
            Self::MissingImports => write!(f, "missing_imports"),
            Self::RepeatedErrors => write!(f, "repeated_errors"),
            Self::PartialFileRewrites => write!(f, "partial_file_rewrites"),
            Self::TokenOverflow => write!(f, "token_overflow"),
            Self::AmbiguityDetected => write!(f, "ambiguity_detected"),
            Self::DirectiveNotFollowed => write!(f, "directive_not_followed"),
        }
    }
}

/// A single diagnosis of why recent attempts are failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StruggleSignal {
    #[serde(rename = "type")]
    pub kind: StruggleType,
    pub severity: Severity,
    pub message: String,
    pub recommend_escalation: bool,
}

impl StruggleSignal {
    fn escalating(kind: StruggleType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            recommend_escalation: true,
        }
    }
}

/// Occurrence thresholds for the counting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StruggleThresholds {
    pub missing_imports: u32,
    pub repeated_errors: u32,
}

impl Default for StruggleThresholds {
    fn default() -> Self {
        Self {
            missing_imports: 2,
            repeated_errors: 2,
        }
    }
}

impl StruggleThresholds {
    /// Read thresholds from a table's escalation rules.
    pub fn from_table(table: &TierTable) -> Self {
        let defaults = Self::default();
        Self {
            missing_imports: table.escalation_threshold(rules::MISSING_IMPORTS, defaults.missing_imports),
            repeated_errors: table.escalation_threshold(rules::REPEATED_ERRORS, defaults.repeated_errors),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StruggleDetector {
    thresholds: StruggleThresholds,
}

impl StruggleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: StruggleThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> StruggleThresholds {
        self.thresholds
    }

    /// Diagnose an attempt history. Total: every history maps to exactly one
    /// signal or `None`.
    pub fn detect(&self, attempts: &[BuildAttempt]) -> Option<StruggleSignal> {
        let last = attempts.last()?;
        if last.result.is_success() {
            return None;
        }

        let matches_any = |a: &BuildAttempt, patterns: &[&str]| patterns.iter().any(|p| a.error_contains(p));

        if attempts.iter().any(|a| matches_any(a, QUALITY_GATE_PATTERNS)) {
            return Some(StruggleSignal::escalating(
                StruggleType::QicFailure,
                Severity::High,
                "Quality integrity check failures detected",
            ));
        }

        if attempts.iter().any(|a| matches_any(a, INVALID_CODE_PATTERNS)) {
            return Some(StruggleSignal::escalating(
                StruggleType::InvalidCodeGeneration,
                Severity::High,
                "Invalid code generation detected",
            ));
        }

        let missing = attempts
            .iter()
            .filter(|a| matches_any(a, MISSING_IMPORT_PATTERNS))
            .count();
        if missing >= self.thresholds.missing_imports as usize {
            return Some(StruggleSignal::escalating(
                StruggleType::MissingImports,
                Severity::Medium,
                format!("Missing imports in {missing} attempts"),
            ));
        }

        let failures = attempts
            .iter()
            .filter(|a| a.result == AttemptResult::Failure)
            .count();
        if failures >= self.thresholds.repeated_errors as usize {
            return Some(StruggleSignal::escalating(
                StruggleType::RepeatedErrors,
                Severity::Medium,
                format!("{failures} repeated failures detected"),
            ));
        }

        None
    }
}

/// Detect with default thresholds.
pub fn detect_struggle(attempts: &[BuildAttempt]) -> Option<StruggleSignal> {
    StruggleDetector::new().detect(attempts)
}
