//! The nine constitutional controls, in canonical order.
//!
//! Every control fails closed: missing input is a failure, never a pass.
//! Each result references the run's single evidence snapshot.

use super::GateState;
use crate::error::{IntegrityViolation, Severity, StageFault};
use crate::pipeline::evidence::hash_hex;
use crate::pipeline::scan;
use crate::pipeline::stage::StageResult;

pub type ControlFn = fn(&mut GateState) -> Result<StageResult, StageFault>;

pub const CANONICAL_CONTROLS: &[(&str, ControlFn)] = &[
    ("QIEL", qiel),
    ("CS1", cs1_constitutional_integrity),
    ("CS2", cs2_architecture_approval),
    ("CS3", cs3_incident_feedback),
    ("CS4", cs4_compliance_monitoring),
    ("CS5", cs5_performance_enforcement),
    ("CS6", cs6_execution_boundary),
    ("GSR", gsr_governance_supremacy),
    ("BuildPhilosophy", build_philosophy),
];

/// Actions a builder may never take, whatever the justification.
pub const FORBIDDEN_ACTIONS: &[&str] = &[
    "force_push",
    "push_to_protected_branch",
    "modify_secrets",
    "disable_branch_protection",
    "self_approve",
    "edit_error_patterns",
    "remove_test_files",
    "exclude_from_strict",
    "weaken_tsconfig",
    "silence_warnings",
    "insert_whitelists",
    "reduce_coverage",
    "relax_linting",
    "bypass_qa",
    "accept_partial_pass",
];

fn conclude(
    state: &GateState,
    control: &str,
    severity: Severity,
    diagnostics: Vec<String>,
    needles: &[&str],
) -> StageResult {
    StageResult::from_diagnostics(control, severity, diagnostics)
        .with_evidence(state.snapshot.reference_whole())
        .with_evidence_refs(state.snapshot.references_matching(needles))
}

/// QA integrity: tests ran, nothing failed, zero errors and warnings.
fn qiel(state: &mut GateState) -> Result<StageResult, StageFault> {
    let mut diagnostics = Vec::new();
    match &state.candidate.qa_report {
        None => diagnostics.push("QA report missing".to_string()),
        Some(qa) => {
            if qa.tests_run == 0 {
                diagnostics.push("no tests executed".to_string());
            }
            for (count, what) in [
                (qa.tests_failed, "failing tests"),
                (qa.build_errors, "build errors"),
                (qa.lint_errors, "lint errors"),
                (qa.type_errors, "type errors"),
                (qa.warnings, "warnings"),
            ] {
                if count > 0 {
                    diagnostics.push(format!("{count} {what}"));
                }
            }
        }
    }
    Ok(conclude(state, "QIEL", Severity::High, diagnostics, &["qa", "qiel", "test"]))
}

/// Constitutional integrity: no protected-path writes, no suppressions or
/// bypasses, and every declared artifact hash matches what was captured.
fn cs1_constitutional_integrity(state: &mut GateState) -> Result<StageResult, StageFault> {
    let mut diagnostics = Vec::new();
    let mut violations = Vec::new();

    for file in &state.candidate.changed_files {
        if scan::is_protected_path(&file.path) {
            diagnostics.push(format!("protected path modified: {}", file.path));
            violations.push(IntegrityViolation::new(file.path.as_str(), "protected path modified"));
        }
        for hit in scan::find_suppressions(&file.content) {
            diagnostics.push(format!("suppression in {}:{hit}", file.path));
        }
        for hit in scan::find_bypass_attempts(&file.content) {
            diagnostics.push(format!("bypass attempt in {}:{hit}", file.path));
        }
    }

    for (path, declared) in &state.candidate.declared_hashes {
        let captured = state.snapshot.hash_of(path).map(str::to_string).or_else(|| {
            state
                .candidate
                .changed_files
                .iter()
                .find(|f| &f.path == path)
                .map(|f| hash_hex(f.content.as_bytes()))
        });
        match captured {
            None => diagnostics.push(format!("declared artifact not present: {path}")),
            Some(actual) if actual != *declared => {
                diagnostics.push(format!("evidence hash mismatch: {path}"));
                violations.push(IntegrityViolation::hash_mismatch(path.as_str(), declared.as_str(), actual));
            }
            Some(_) => {}
        }
    }

    let severity = if violations.is_empty() {
        Severity::High
    } else {
        Severity::Critical
    };
    state.integrity_violations.extend(violations);
    Ok(conclude(state, "CS1", severity, diagnostics, &["cs1", "hash", "integrity"]))
}

fn cs2_architecture_approval(state: &mut GateState) -> Result<StageResult, StageFault> {
    let diagnostics = match &state.candidate.architecture_approval {
        None => vec!["architecture approval missing".to_string()],
        Some(a) if !a.approved => vec!["architecture not approved".to_string()],
        Some(_) => Vec::new(),
    };
    Ok(conclude(state, "CS2", Severity::Critical, diagnostics, &["architecture"]))
}

fn cs3_incident_feedback(state: &mut GateState) -> Result<StageResult, StageFault> {
    let diagnostics = state
        .candidate
        .incidents
        .iter()
        .filter(|i| i.status == super::IncidentStatus::Open)
        .map(|i| format!("open incident {} ({}): {}", i.id, i.severity, i.description))
        .collect();
    Ok(conclude(state, "CS3", Severity::High, diagnostics, &["incident"]))
}

fn cs4_compliance_monitoring(state: &mut GateState) -> Result<StageResult, StageFault> {
    let diagnostics = state
        .candidate
        .compliance_alerts
        .iter()
        .filter(|a| a.severity == Severity::Critical)
        .map(|a| format!("critical compliance alert {}: {}", a.id, a.message))
        .collect();
    Ok(conclude(state, "CS4", Severity::High, diagnostics, &["compliance"]))
}

fn cs5_performance_enforcement(state: &mut GateState) -> Result<StageResult, StageFault> {
    let diagnostics = state
        .candidate
        .performance_checks
        .iter()
        .filter(|c| c.over_budget())
        .map(|c| {
            format!(
                "{} regressed {:.1}% (budget {:.1}%)",
                c.metric,
                c.regression_pct(),
                c.budget_pct
            )
        })
        .collect();
    Ok(conclude(state, "CS5", Severity::High, diagnostics, &["perf"]))
}

fn cs6_execution_boundary(state: &mut GateState) -> Result<StageResult, StageFault> {
    let diagnostics = state
        .candidate
        .boundary_actions
        .iter()
        .filter(|action| {
            let normalized = action.trim().to_lowercase().replace(['-', ' '], "_");
            FORBIDDEN_ACTIONS.contains(&normalized.as_str())
        })
        .map(|action| format!("forbidden action: {action}"))
        .collect();
    Ok(conclude(state, "CS6", Severity::High, diagnostics, &["boundary"]))
}

/// Governance supremacy: only a complete, unskipped, 100% QA pass merges.
fn gsr_governance_supremacy(state: &mut GateState) -> Result<StageResult, StageFault> {
    let mut diagnostics = Vec::new();
    match &state.candidate.qa_report {
        None => diagnostics.push("QA report missing".to_string()),
        Some(qa) => {
            let rate = qa.pass_rate();
            if rate < 100.0 {
                diagnostics.push(format!("QA pass rate {rate:.1}% below 100%"));
            }
            if qa.tests_skipped > 0 {
                diagnostics.push(format!("partial QA pass: {} tests skipped", qa.tests_skipped));
            }
        }
    }
    Ok(conclude(state, "GSR", Severity::High, diagnostics, &["qa", "gsr"]))
}

/// Architecture, then red QA, then build, then green QA.
fn build_philosophy(state: &mut GateState) -> Result<StageResult, StageFault> {
    let mut diagnostics = Vec::new();
    match &state.candidate.timeline {
        None => diagnostics.push("build timeline missing".to_string()),
        Some(t) => {
            let phases = [
                ("architecture", t.architecture_at),
                ("red QA", t.red_qa_at),
                ("build", t.build_started_at),
                ("green QA", t.green_qa_at),
            ];
            for (phase, at) in &phases {
                if at.is_none() {
                    diagnostics.push(format!("{phase} phase missing"));
                }
            }
            for pair in phases.windows(2) {
                if let ((earlier, Some(a)), (later, Some(b))) = (pair[0], pair[1]) {
                    if b < a {
                        diagnostics.push(format!("{later} happened before {earlier}"));
                    }
                }
            }
        }
    }
    Ok(conclude(state, "BuildPhilosophy", Severity::High, diagnostics, &["timeline", "philosophy"]))
}
