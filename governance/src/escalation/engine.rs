//! Escalation Engine: retry, escalate, or give up.
//!
//! Consumes the attempt ledger for one task and produces an
//! [`AttemptDecision`]. All decisions are deterministic given the ledger and
//! the tier table.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{self, kinds, AuditEntry, SharedAuditSink};
use crate::error::{GovernanceError, PolicyDenial, Severity};
use crate::escalation::attempt::{AttemptLedger, TaskHistory};
use crate::escalation::deescalation::consider_de_escalation;
use crate::escalation::struggle::{StruggleDetector, StruggleSignal, StruggleThresholds};
use crate::tiers::{Tier, TierTable};

/// Denial code for a decision requested at a tier the table does not define.
pub const UNKNOWN_TIER: &str = "UNKNOWN_TIER";

/// Why the engine is leaving the current tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum EscalationTrigger {
    Struggle { signal: StruggleSignal },
    BudgetExhausted { budget: u32 },
}

impl std::fmt::Display for EscalationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Struggle { signal } => write!(f, "{}: {}", signal.kind, signal.message),
            Self::BudgetExhausted { budget } => write!(f, "retry budget of {budget} exhausted"),
        }
    }
}

/// What the caller should do next with a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AttemptDecision {
    /// Last attempt succeeded
    Complete { tier: String, attempts_used: u32 },
    /// Run again at the same tier
    Retry {
        tier: String,
        resource: String,
        remaining: u32,
    },
    /// Move one rank up
    Escalate {
        from: String,
        to: String,
        resource: String,
        trigger: EscalationTrigger,
    },
    /// Top tier reached; hand off to a human
    Exhausted {
        tier: String,
        trigger: EscalationTrigger,
    },
    /// Request refused outright; nothing runs
    Rejected { tier: String, denial: PolicyDenial },
}

impl AttemptDecision {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Exhausted { .. } | Self::Rejected { .. }
        )
    }

    pub fn denial(&self) -> Option<&PolicyDenial> {
        match self {
            Self::Rejected { denial, .. } => Some(denial),
            _ => None,
        }
    }

    /// The error a caller surfaces for an exhausted task.
    pub fn exhausted_error(&self) -> Option<GovernanceError> {
        match self {
            Self::Exhausted { tier, trigger } => Some(GovernanceError::ExhaustedEscalation {
                tier: tier.clone(),
                reason: trigger.to_string(),
            }),
            _ => None,
        }
    }
}

pub struct EscalationEngine {
    table: Arc<TierTable>,
    detector: StruggleDetector,
    audit: SharedAuditSink,
}

impl EscalationEngine {
    /// Struggle thresholds are read from the table's escalation rules.
    pub fn new(table: Arc<TierTable>, audit: SharedAuditSink) -> Self {
        let detector = StruggleDetector::with_thresholds(StruggleThresholds::from_table(&table));
        Self {
            table,
            detector,
            audit,
        }
    }

    pub fn with_detector(mut self, detector: StruggleDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    fn reject_unknown_tier(&self, task_id: &str, name: &str) -> AttemptDecision {
        warn!(task_id, tier = name, "Rejecting decision for unknown tier");
        let decision = AttemptDecision::Rejected {
            tier: name.to_string(),
            denial: PolicyDenial::new(
                UNKNOWN_TIER,
                format!("tier '{name}' is not defined in table v{}", self.table.version()),
                Severity::High,
            ),
        };
        let payload = serde_json::to_value(&decision).unwrap_or(serde_json::Value::Null);
        audit::record(self.audit.as_ref(), AuditEntry::new(task_id, kinds::ESCALATION_REJECTED, payload));
        decision
    }

    /// Decide the next step for the task recorded in `ledger`.
    ///
    /// Only the trailing attempts made at `current_tier` are considered, so a
    /// freshly escalated task starts with its full retry budget. A tier the
    /// table does not define is rejected, never mapped onto another tier.
    pub fn decide(&self, current_tier: &str, ledger: &AttemptLedger) -> AttemptDecision {
        let Some(tier) = self.table.get(current_tier) else {
            return self.reject_unknown_tier(ledger.task_id(), current_tier);
        };
        let at_tier = ledger.suffix_at_tier(&tier.name);

        let Some(last) = at_tier.last() else {
            return AttemptDecision::Retry {
                tier: tier.name.clone(),
                resource: tier.primary_resource().to_string(),
                remaining: tier.retry_budget,
            };
        };

        if last.result.is_success() {
            return AttemptDecision::Complete {
                tier: tier.name.clone(),
                attempts_used: ledger.len() as u32,
            };
        }

        if let Some(signal) = self.detector.detect(at_tier) {
            if signal.recommend_escalation {
                info!(
                    task_id = ledger.task_id(),
                    tier = %tier.name,
                    signal = %signal.kind,
                    "Struggle detected"
                );
                return self.leave_tier(ledger.task_id(), tier, EscalationTrigger::Struggle { signal });
            }
        }

        let used = at_tier.len() as u32;
        if used < tier.retry_budget {
            return AttemptDecision::Retry {
                tier: tier.name.clone(),
                resource: last.resource.clone(),
                remaining: tier.retry_budget - used,
            };
        }

        self.leave_tier(
            ledger.task_id(),
            tier,
            EscalationTrigger::BudgetExhausted {
                budget: tier.retry_budget,
            },
        )
    }

    fn leave_tier(&self, task_id: &str, tier: &Tier, trigger: EscalationTrigger) -> AttemptDecision {
        let (decision, kind) = match self.table.next_above(&tier.name) {
            Some(next) => {
                info!(task_id, from = %tier.name, to = %next.name, "Escalating: {}", trigger);
                (
                    AttemptDecision::Escalate {
                        from: tier.name.clone(),
                        to: next.name.clone(),
                        resource: next.primary_resource().to_string(),
                        trigger,
                    },
                    kinds::ESCALATION,
                )
            }
            None => {
                warn!(task_id, tier = %tier.name, "Escalation exhausted: {}", trigger);
                (
                    AttemptDecision::Exhausted {
                        tier: tier.name.clone(),
                        trigger,
                    },
                    kinds::ESCALATION_EXHAUSTED,
                )
            }
        };

        let payload = serde_json::to_value(&decision).unwrap_or(serde_json::Value::Null);
        audit::record(self.audit.as_ref(), AuditEntry::new(task_id, kind, payload));
        decision
    }

    /// Next tier down when the trailing history earns it.
    pub fn review_de_escalation(
        &self,
        task_id: &str,
        current_tier: &str,
        history: &[TaskHistory],
    ) -> Option<&Tier> {
        if !consider_de_escalation(history) {
            return None;
        }
        let lower = self.table.next_below(current_tier)?;

        info!(task_id, from = current_tier, to = %lower.name, "De-escalating after clean streak");
        audit::record(
            self.audit.as_ref(),
            AuditEntry::new(
                task_id,
                kinds::DE_ESCALATION,
                serde_json::json!({ "from": current_tier, "to": lower.name }),
            ),
        );
        Some(lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::escalation::attempt::TaskOutcome;
    use crate::escalation::struggle::StruggleType;
    use crate::tiers::defaults;

    fn engine() -> (EscalationEngine, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let engine = EscalationEngine::new(Arc::new(defaults::builder_table()), sink.clone());
        (engine, sink)
    }

    #[test]
    fn test_fresh_task_gets_full_budget() {
        let (engine, sink) = engine();
        let ledger = AttemptLedger::new("task-1");
        assert_eq!(
            engine.decide("T1", &ledger),
            AttemptDecision::Retry {
                tier: "T1".to_string(),
                resource: "gpt-4o-mini".to_string(),
                remaining: 3
            }
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_success_completes() {
        let (engine, _) = engine();
        let mut ledger = AttemptLedger::new("task-1");
        ledger.record_failure("gpt-4o-mini", "T1", "flaky");
        ledger.record_success("gpt-4o-mini", "T1");
        let decision = engine.decide("T1", &ledger);
        assert!(decision.is_terminal());
        assert!(matches!(decision, AttemptDecision::Complete { attempts_used: 2, .. }));
    }

    #[test]
    fn test_single_plain_failure_retries() {
        let (engine, _) = engine();
        let mut ledger = AttemptLedger::new("task-1");
        ledger.record_failure("gpt-4o-mini", "T1", "network");
        assert!(matches!(
            engine.decide("T1", &ledger),
            AttemptDecision::Retry { remaining: 2, .. }
        ));
    }

    #[test]
    fn test_struggle_escalates_and_audits_once() {
        let (engine, sink) = engine();
        let mut ledger = AttemptLedger::new("task-1");
        ledger.record_failure("gpt-4o-mini", "T1", "SyntaxError: unexpected token");

        match engine.decide("T1", &ledger) {
            AttemptDecision::Escalate { from, to, resource, trigger } => {
                assert_eq!(from, "T1");
                assert_eq!(to, "T2");
                assert_eq!(resource, "gpt-4o");
                assert!(matches!(
                    trigger,
                    EscalationTrigger::Struggle { ref signal } if signal.kind == StruggleType::InvalidCodeGeneration
                ));
            }
            other => panic!("expected escalation, got {other:?}"),
        }
        assert_eq!(sink.count_kind(kinds::ESCALATION), 1);
    }

    #[test]
    fn test_escalated_tier_starts_fresh() {
        let (engine, _) = engine();
        let mut ledger = AttemptLedger::new("task-1");
        ledger.record_failure("gpt-4o-mini", "T1", "SyntaxError");
        // First failure at T2 with no pattern: the T1 history does not leak in.
        ledger.record_failure("gpt-4o", "T2", "timeout");
        assert!(matches!(
            engine.decide("T2", &ledger),
            AttemptDecision::Retry { remaining: 2, .. }
        ));
    }

    #[test]
    fn test_struggle_at_top_is_exhausted() {
        let (engine, sink) = engine();
        let mut ledger = AttemptLedger::new("task-9");
        ledger.record_failure("claude-3.5-sonnet", "T3", "QIC validation failed");

        let decision = engine.decide("T3", &ledger);
        assert!(decision.is_terminal());
        let err = decision.exhausted_error().unwrap();
        assert!(matches!(err, GovernanceError::ExhaustedEscalation { .. }));
        assert_eq!(sink.count_kind(kinds::ESCALATION_EXHAUSTED), 1);
        assert_eq!(sink.entries_for("task-9").len(), 1);
    }

    #[test]
    fn test_budget_exhaustion_escalates() {
        let sink = Arc::new(MemoryAuditSink::new());
        // Raise thresholds so only the budget can trigger.
        let engine = EscalationEngine::new(Arc::new(defaults::builder_table()), sink.clone())
            .with_detector(StruggleDetector::with_thresholds(StruggleThresholds {
                missing_imports: 10,
                repeated_errors: 10,
            }));
        let mut ledger = AttemptLedger::new("task-1");
        for _ in 0..3 {
            ledger.record_failure("gpt-4o-mini", "T1", "flaky");
        }
        match engine.decide("T1", &ledger) {
            AttemptDecision::Escalate { trigger, .. } => {
                assert_eq!(trigger, EscalationTrigger::BudgetExhausted { budget: 3 });
            }
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tier_is_rejected() {
        let (engine, sink) = engine();
        let mut ledger = AttemptLedger::new("task-7");
        ledger.record_failure("gpt-4o-mini", "T1", "timeout");

        let decision = engine.decide("T9", &ledger);
        assert!(decision.is_terminal());
        assert!(!matches!(decision, AttemptDecision::Retry { .. }));
        let denial = decision.denial().unwrap();
        assert_eq!(denial.code, UNKNOWN_TIER);
        assert_eq!(denial.severity, Severity::High);
        assert!(decision.exhausted_error().is_none());

        let entries = sink.entries_for("task-7");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, kinds::ESCALATION_REJECTED);
        assert_eq!(entries[0].payload["tier"], "T9");
    }

    #[test]
    fn test_review_de_escalation() {
        let (engine, sink) = engine();
        let clean: Vec<TaskHistory> = (0..3)
            .map(|i| TaskHistory::new(format!("t{i}"), "T2", TaskOutcome::Success, 1))
            .collect();
        assert_eq!(engine.review_de_escalation("docs", "T2", &clean).unwrap().name, "T1");
        assert!(engine.review_de_escalation("docs", "T1", &clean).is_none());
        assert_eq!(sink.count_kind(kinds::DE_ESCALATION), 1);

        let mut dirty = clean.clone();
        dirty[2].attempts_used = 2;
        assert!(engine.review_de_escalation("docs", "T2", &dirty).is_none());
        assert_eq!(sink.count_kind(kinds::DE_ESCALATION), 1);
    }
}
