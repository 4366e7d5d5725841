//! Pre-merge constitutional gate.
//!
//! ```text
//! MergeCandidate
//!   │ evidence snapshot (once, Arc)
//!   │ pre-conditions ──► PolicyDenial
//!   ▼
//! QIEL ─► CS1 ─► CS2 ─► CS3 ─► CS4 ─► CS5 ─► CS6 ─► GSR ─► BuildPhilosophy
//!   │
//!   ▼
//! GateVerdict (+ one gate_verdict audit entry)
//! ```

pub mod controls;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::{self, kinds, AuditEntry, SharedAuditSink};
use crate::error::{GovernanceError, IntegrityViolation, PolicyDenial, Severity};
use crate::pipeline::blueprint::model::HandoverPackage;
use crate::pipeline::evidence::{EvidenceSnapshot, EvidenceStore};
use crate::pipeline::runner::{PipelineExecutionResult, PipelineRunner, StageObserver};
use crate::pipeline::stage::FnStage;

pub const PIPELINE_NAME: &str = "gate";

/// Denial codes carried by a blocked verdict.
pub mod denials {
    pub const PRE_CONDITION_FAILED: &str = "PRE_CONDITION_FAILED";
    pub const EVIDENCE_UNAVAILABLE: &str = "EVIDENCE_UNAVAILABLE";
    pub const CONTROL_FAILED: &str = "CONTROL_FAILED";
    pub const INTEGRITY_VIOLATION: &str = "INTEGRITY_VIOLATION";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QaReport {
    pub tests_run: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub tests_skipped: u32,
    pub lint_errors: u32,
    pub build_errors: u32,
    pub type_errors: u32,
    pub warnings: u32,
}

impl QaReport {
    /// Percentage of executed tests that passed; 0 when nothing ran.
    pub fn pass_rate(&self) -> f64 {
        if self.tests_run == 0 {
            return 0.0;
        }
        f64::from(self.tests_passed) / f64::from(self.tests_run) * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureApproval {
    pub approved: bool,
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub status: IncidentStatus,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceAlert {
    pub id: String,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceCheck {
    pub metric: String,
    pub baseline: f64,
    pub observed: f64,
    /// Allowed regression, percent of baseline
    pub budget_pct: f64,
}

impl PerformanceCheck {
    /// Regression relative to baseline, percent. Improvements are negative.
    pub fn regression_pct(&self) -> f64 {
        if self.baseline <= 0.0 {
            return 0.0;
        }
        (self.observed - self.baseline) / self.baseline * 100.0
    }

    pub fn over_budget(&self) -> bool {
        self.regression_pct() > self.budget_pct
    }
}

/// When each build-philosophy phase happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildTimeline {
    pub architecture_at: Option<DateTime<Utc>>,
    pub red_qa_at: Option<DateTime<Utc>>,
    pub build_started_at: Option<DateTime<Utc>>,
    pub green_qa_at: Option<DateTime<Utc>>,
}

/// Everything the gate needs to judge one pull request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeCandidate {
    pub pr_number: u64,
    pub commit_sha: String,
    pub branch: String,
    pub base_branch: String,
    pub changed_files: Vec<ChangedFile>,
    pub qa_report: Option<QaReport>,
    /// Evidence artifact path to content
    pub evidence: BTreeMap<String, String>,
    /// Hashes the builder declared at handover, by artifact path
    pub declared_hashes: BTreeMap<String, String>,
    pub architecture_approval: Option<ArchitectureApproval>,
    pub incidents: Vec<Incident>,
    pub compliance_alerts: Vec<ComplianceAlert>,
    pub performance_checks: Vec<PerformanceCheck>,
    /// Actions the builder performed outside the workspace
    pub boundary_actions: Vec<String>,
    pub timeline: Option<BuildTimeline>,
}

impl MergeCandidate {
    pub fn entity_id(&self) -> String {
        format!("pr-{}", self.pr_number)
    }

    /// Carry a blueprint handover's declared hashes into the candidate.
    pub fn with_handover(mut self, handover: &HandoverPackage) -> Self {
        self.declared_hashes.extend(handover.declared_hashes());
        self
    }
}

/// State threaded through the controls.
#[derive(Debug, Clone)]
pub struct GateState {
    pub candidate: MergeCandidate,
    pub snapshot: Arc<EvidenceSnapshot>,
    pub integrity_violations: Vec<IntegrityViolation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateVerdict {
    pub entity_id: String,
    pub merge_allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<PolicyDenial>,
    pub integrity_violations: Vec<IntegrityViolation>,
    /// Absent when the gate refused before the first control
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Arc<EvidenceSnapshot>>,
}

impl GateVerdict {
    fn refused(entity_id: String, denial: PolicyDenial, snapshot: Option<Arc<EvidenceSnapshot>>) -> Self {
        Self {
            entity_id,
            merge_allowed: false,
            denial: Some(denial),
            integrity_violations: Vec::new(),
            result: None,
            snapshot,
        }
    }

    pub fn severity(&self) -> Severity {
        if !self.integrity_violations.is_empty() {
            return Severity::Critical;
        }
        self.denial.as_ref().map(|d| d.severity).unwrap_or(Severity::Low)
    }

    pub fn is_critical(&self) -> bool {
        self.severity() == Severity::Critical
    }

    pub fn failed_control(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.failed_stage.as_deref())
    }
}

/// Checks that must hold before any control runs.
pub fn check_preconditions(candidate: &MergeCandidate) -> Option<PolicyDenial> {
    let mut issues = Vec::new();
    if candidate.branch.to_lowercase().contains("incomplete") {
        issues.push("Build-to-Green not complete".to_string());
    }
    if candidate.commit_sha.is_empty() {
        issues.push("commit sha missing".to_string());
    }
    if issues.is_empty() {
        None
    } else {
        Some(PolicyDenial::new(denials::PRE_CONDITION_FAILED, issues.join("; "), Severity::High))
    }
}

pub struct Gate {
    runner: PipelineRunner<GateState>,
    evidence: Arc<dyn EvidenceStore>,
    audit: SharedAuditSink,
}

impl Gate {
    pub fn new(evidence: Arc<dyn EvidenceStore>, audit: SharedAuditSink) -> Self {
        let runner = controls::CANONICAL_CONTROLS
            .iter()
            .fold(PipelineRunner::new(PIPELINE_NAME, audit.clone()), |runner, (name, control)| {
                runner.with_stage(FnStage::new(*name, *control))
            });
        Self {
            runner,
            evidence,
            audit,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StageObserver>) {
        self.runner.add_observer(observer);
    }

    pub fn control_names(&self) -> Vec<&str> {
        self.runner.stage_names()
    }

    /// Judge one candidate. Never returns an error: every failure is a
    /// blocking verdict.
    pub fn evaluate(&self, candidate: MergeCandidate) -> GateVerdict {
        let entity_id = candidate.entity_id();

        let snapshot = match self.evidence.snapshot(&entity_id, &candidate.evidence) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                let denial = match err {
                    GovernanceError::PolicyDenial(denial) => denial,
                    other => PolicyDenial::new(denials::EVIDENCE_UNAVAILABLE, other.to_string(), other.severity()),
                };
                return self.finish(GateVerdict::refused(entity_id, denial, None));
            }
        };

        if let Some(denial) = check_preconditions(&candidate) {
            return self.finish(GateVerdict::refused(entity_id, denial, Some(snapshot)));
        }

        let mut state = GateState {
            candidate,
            snapshot: Arc::clone(&snapshot),
            integrity_violations: Vec::new(),
        };
        let result = self.runner.run(&entity_id, &mut state);

        let denial = if !state.integrity_violations.is_empty() {
            Some(PolicyDenial::new(
                denials::INTEGRITY_VIOLATION,
                state
                    .integrity_violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
                Severity::Critical,
            ))
        } else {
            result.failure().map(|failure| {
                PolicyDenial::new(
                    denials::CONTROL_FAILED,
                    format!("{}: {}", failure.stage_name, failure.diagnostics.join("; ")),
                    failure.severity,
                )
            })
        };

        self.finish(GateVerdict {
            entity_id,
            merge_allowed: result.passed && state.integrity_violations.is_empty(),
            denial,
            integrity_violations: state.integrity_violations,
            result: Some(result),
            snapshot: Some(snapshot),
        })
    }

    fn finish(&self, verdict: GateVerdict) -> GateVerdict {
        if verdict.merge_allowed {
            info!(entity_id = %verdict.entity_id, "Gate passed, merge allowed");
        } else if verdict.is_critical() {
            error!(
                entity_id = %verdict.entity_id,
                failed_control = ?verdict.failed_control(),
                violations = verdict.integrity_violations.len(),
                "Gate blocked on integrity violation"
            );
        } else {
            warn!(
                entity_id = %verdict.entity_id,
                failed_control = ?verdict.failed_control(),
                denial = ?verdict.denial.as_ref().map(|d| d.code.as_str()),
                "Gate blocked merge"
            );
        }

        audit::record(
            self.audit.as_ref(),
            AuditEntry::new(
                verdict.entity_id.as_str(),
                kinds::GATE_VERDICT,
                serde_json::json!({
                    "mergeAllowed": verdict.merge_allowed,
                    "severity": verdict.severity(),
                    "failedControl": verdict.failed_control(),
                    "denial": verdict.denial.as_ref().map(|d| d.code.clone()),
                    "snapshotId": verdict.snapshot.as_ref().map(|s| s.snapshot_id.clone()),
                }),
            ),
        );
        verdict
    }
}
