//! Attempt records: the append-only history the escalation logic reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::struggle::StruggleSignal;

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Success,
    Failure,
    Partial,
}

impl AttemptResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// One execution of a task by a bound resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildAttempt {
    /// 1-indexed
    pub attempt_number: u32,
    pub resource: String,
    pub tier: String,
    pub timestamp: DateTime<Utc>,
    pub result: AttemptResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struggle_signal: Option<StruggleSignal>,
}

impl BuildAttempt {
    pub fn error_contains(&self, pattern: &str) -> bool {
        self.error_message
            .as_deref()
            .is_some_and(|m| m.contains(pattern))
    }
}

/// Summary of a finished task, used for de-escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHistory {
    pub task_id: String,
    pub tier: String,
    pub outcome: TaskOutcome,
    pub attempts_used: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failure,
}

impl TaskHistory {
    pub fn new(task_id: impl Into<String>, tier: impl Into<String>, outcome: TaskOutcome, attempts_used: u32) -> Self {
        Self {
            task_id: task_id.into(),
            tier: tier.into(),
            outcome,
            attempts_used,
            completed_at: None,
        }
    }

    /// Succeeded on the first attempt.
    pub fn is_clean_success(&self) -> bool {
        self.outcome == TaskOutcome::Success && self.attempts_used == 1
    }
}

/// Append-only attempt history for one task.
///
/// The caller owns and persists the ledger; the engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptLedger {
    task_id: String,
    attempts: Vec<BuildAttempt>,
}

impl AttemptLedger {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            attempts: Vec::new(),
        }
    }

    /// Rebuild a ledger from persisted attempts.
    pub fn from_attempts(task_id: impl Into<String>, attempts: Vec<BuildAttempt>) -> Self {
        Self {
            task_id: task_id.into(),
            attempts,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn attempts(&self) -> &[BuildAttempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last(&self) -> Option<&BuildAttempt> {
        self.attempts.last()
    }

    /// Append an attempt, numbering it after the last one.
    pub fn record(
        &mut self,
        resource: impl Into<String>,
        tier: impl Into<String>,
        result: AttemptResult,
        error_message: Option<String>,
    ) -> &BuildAttempt {
        let attempt = BuildAttempt {
            attempt_number: self.attempts.len() as u32 + 1,
            resource: resource.into(),
            tier: tier.into(),
            timestamp: Utc::now(),
            result,
            error_message,
            struggle_signal: None,
        };
        self.attempts.push(attempt);
        &self.attempts[self.attempts.len() - 1]
    }

    pub fn record_success(&mut self, resource: impl Into<String>, tier: impl Into<String>) -> &BuildAttempt {
        self.record(resource, tier, AttemptResult::Success, None)
    }

    pub fn record_failure(
        &mut self,
        resource: impl Into<String>,
        tier: impl Into<String>,
        error_message: impl Into<String>,
    ) -> &BuildAttempt {
        self.record(resource, tier, AttemptResult::Failure, Some(error_message.into()))
    }

    /// Trailing run of attempts made at `tier`.
    pub fn suffix_at_tier(&self, tier: &str) -> &[BuildAttempt] {
        let start = self
            .attempts
            .iter()
            .rposition(|a| a.tier != tier)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.attempts[start..]
    }
}
