//! Stage contract and per-stage results.

use serde::{Deserialize, Serialize};

use crate::error::{Severity, StageFault};

/// Pointer into an evidence snapshot. Stages reference evidence, they never
/// copy it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRef {
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage_name: String,
    pub success: bool,
    /// Severity of the failure; `Low` for a passing stage
    pub severity: Severity,
    #[serde(default)]
    pub diagnostics: Vec<String>,
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceRef>,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn passed(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            success: true,
            severity: Severity::Low,
            diagnostics: Vec::new(),
            evidence_refs: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn failed(stage_name: impl Into<String>, severity: Severity, diagnostics: Vec<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            success: false,
            severity,
            diagnostics,
            evidence_refs: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Pass when `diagnostics` is empty, otherwise fail at `severity`.
    pub fn from_diagnostics(stage_name: impl Into<String>, severity: Severity, diagnostics: Vec<String>) -> Self {
        if diagnostics.is_empty() {
            Self::passed(stage_name)
        } else {
            Self::failed(stage_name, severity, diagnostics)
        }
    }

    /// Synthetic failure for a stage that errored or panicked.
    pub fn from_fault(stage_name: impl Into<String>, fault: &StageFault) -> Self {
        Self::failed(stage_name, Severity::High, vec![format!("Stage fault: {}", fault.message)])
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostics.push(diagnostic.into());
        self
    }

    pub fn with_evidence(mut self, evidence: EvidenceRef) -> Self {
        self.evidence_refs.push(evidence);
        self
    }

    pub fn with_evidence_refs(mut self, refs: impl IntoIterator<Item = EvidenceRef>) -> Self {
        self.evidence_refs.extend(refs);
        self
    }

    /// Raise severity. Never lowers it.
    pub fn escalate_severity(mut self, severity: Severity) -> Self {
        self.severity = self.severity.max(severity);
        self
    }
}

/// One named step of a pipeline over state `S`.
///
/// A stage may read anything earlier stages produced and add its own output,
/// but must not rewrite what an earlier stage stored.
pub trait Stage<S> {
    fn name(&self) -> &str;

    fn run(&self, state: &mut S) -> Result<StageResult, StageFault>;
}

/// Adapts a closure into a [`Stage`].
pub struct FnStage<F> {
    name: String,
    func: F,
}

impl<F> FnStage<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<S, F> Stage<S> for FnStage<F>
where
    F: Fn(&mut S) -> Result<StageResult, StageFault>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, state: &mut S) -> Result<StageResult, StageFault> {
        (self.func)(state)
    }
}
