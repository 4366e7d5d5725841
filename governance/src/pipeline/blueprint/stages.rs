//! The six blueprint stages.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::model::{
    BlueprintState, BuilderPlan, ComplianceStatement, GenerationFindings, HandoverPackage,
    HashedArtifact, InterpretedContext, ReviewFindings, Risk,
};
use super::{ArtifactGenerator, PlanSynthesizer};
use super::{
    ARCHITECTURE_INTERPRET, CODE_GENERATION, GOVERNANCE_PLANNING, GOVERNANCE_PRE_CHECK, HANDOVER,
    SELF_REVIEW,
};
use crate::error::{IntegrityViolation, Severity, StageFault};
use crate::pipeline::evidence::hash_hex;
use crate::pipeline::scan;
use crate::pipeline::stage::{Stage, StageResult};

/// Files every builder must have loaded, unmodified, before starting.
pub const REQUIRED_GOVERNANCE_FILES: &[&str] = &["BUILD_PHILOSOPHY.md", ".github/foreman/agent-contract.md"];

/// Plan wording that signals a shortcut around governance.
pub const SHORTCUT_PATTERNS: &[&str] = &[
    "skip validation",
    "bypass",
    "temporary hack",
    "disable check",
    "ignore error",
];

fn missing_slot(stage: &str, slot: &str) -> StageFault {
    StageFault::new(stage, format!("{slot} not available from an earlier stage"))
}

pub struct GovernancePreCheck;

impl Stage<BlueprintState> for GovernancePreCheck {
    fn name(&self) -> &str {
        GOVERNANCE_PRE_CHECK
    }

    fn run(&self, state: &mut BlueprintState) -> Result<StageResult, StageFault> {
        let request = &state.request;
        let files: BTreeSet<&str> = REQUIRED_GOVERNANCE_FILES
            .iter()
            .copied()
            .chain(request.expected_hashes.keys().map(String::as_str))
            .collect();

        let mut diagnostics = Vec::new();
        let mut violations = Vec::new();

        for file in files {
            let Some(content) = request.governance_files.get(file) else {
                diagnostics.push(format!("governance file missing: {file}"));
                continue;
            };
            let actual = hash_hex(content.as_bytes());
            match request.expected_hashes.get(file) {
                None => diagnostics.push(format!("no approved hash recorded for {file}")),
                Some(expected) if *expected != actual => {
                    diagnostics.push(format!("CONSTITUTIONAL_INTEGRITY: hash mismatch for {file}"));
                    violations.push(IntegrityViolation::hash_mismatch(file, expected.as_str(), actual));
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
        Ok(StageResult::from_diagnostics(GOVERNANCE_PRE_CHECK, severity, diagnostics))
    }
}

pub struct ArchitectureInterpret;

impl Stage<BlueprintState> for ArchitectureInterpret {
    fn name(&self) -> &str {
        ARCHITECTURE_INTERPRET
    }

    fn run(&self, state: &mut BlueprintState) -> Result<StageResult, StageFault> {
        let Some(arch) = state.request.architecture.as_ref() else {
            return Ok(StageResult::failed(
                ARCHITECTURE_INTERPRET,
                Severity::High,
                vec!["incomplete architecture: no architecture supplied".to_string()],
            ));
        };

        let mut diagnostics = Vec::new();

        let missing: Vec<&str> = [
            ("components", arch.components.is_empty()),
            ("types", arch.types.is_empty()),
            ("flows", arch.flows.is_empty()),
        ]
        .into_iter()
        .filter(|(_, empty)| *empty)
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            diagnostics.push(format!("incomplete architecture: missing {}", missing.join(", ")));
        }

        let mut components = BTreeSet::new();
        let mut locations = BTreeMap::new();
        for component in &arch.components {
            if !components.insert(component.name.clone()) {
                diagnostics.push(format!("contradiction: component {} declared twice", component.name));
            }
            if let Some(location) = &component.location {
                locations.insert(component.name.clone(), location.clone());
            }
        }

        let type_fields: BTreeMap<String, BTreeSet<String>> = arch
            .types
            .iter()
            .map(|t| (t.name.clone(), t.fields.iter().cloned().collect()))
            .collect();

        for component in &arch.components {
            for dep in &component.dependencies {
                if !components.contains(dep) {
                    diagnostics.push(format!("missing dependency: {dep} (required by {})", component.name));
                }
            }
            if let Some(usage) = &component.uses {
                match type_fields.get(&usage.type_name) {
                    None => diagnostics.push(format!(
                        "schema misalignment: {} uses undeclared type {}",
                        component.name, usage.type_name
                    )),
                    Some(fields) => {
                        for field in usage.fields.iter().filter(|f| !fields.contains(*f)) {
                            diagnostics.push(format!(
                                "schema misalignment: {}.{} used by {} is not declared",
                                usage.type_name, field, component.name
                            ));
                        }
                    }
                }
            }
        }

        state.context = Some(InterpretedContext {
            components,
            locations,
            type_fields,
            flows: arch.flows.iter().map(|f| f.name.clone()).collect(),
        });

        Ok(StageResult::from_diagnostics(ARCHITECTURE_INTERPRET, Severity::High, diagnostics))
    }
}

pub struct GovernancePlanning {
    pub synthesizer: Arc<dyn PlanSynthesizer>,
}

impl GovernancePlanning {
    fn validate(plan: &BuilderPlan, context: &InterpretedContext, constraints: &[String]) -> Vec<String> {
        let mut diagnostics = Vec::new();

        if plan.tests.is_empty() {
            diagnostics.push("missing test coverage: plan contains no tests".to_string());
        } else if plan.coverage < 100 {
            diagnostics.push(format!("missing test coverage: {}% planned", plan.coverage));
        }

        if !plan.strict_typing {
            diagnostics.push("strict typing required".to_string());
        }

        for step in &plan.steps {
            let lower = step.description.to_lowercase();
            if let Some(pattern) = SHORTCUT_PATTERNS.iter().find(|p| lower.contains(*p)) {
                diagnostics.push(format!("shortcut detected ({pattern}): {}", step.description));
            }
            if let Some(constraint) = constraints.iter().find(|c| lower.contains(&c.to_lowercase())) {
                diagnostics.push(format!("constraint violated ({constraint}): {}", step.description));
            }
            if let (Some(component), Some(location)) = (&step.component, &step.location) {
                if let Some(required) = context.locations.get(component) {
                    if !location.starts_with(required.as_str()) {
                        diagnostics.push(format!(
                            "architecture violation: {component} planned at {location}, expected {required}"
                        ));
                    }
                }
            }
        }

        diagnostics
    }
}

impl Stage<BlueprintState> for GovernancePlanning {
    fn name(&self) -> &str {
        GOVERNANCE_PLANNING
    }

    fn run(&self, state: &mut BlueprintState) -> Result<StageResult, StageFault> {
        let context = state
            .context
            .as_ref()
            .ok_or_else(|| missing_slot(GOVERNANCE_PLANNING, "interpreted context"))?;
        let plan = self.synthesizer.synthesize(&state.request, context)?;
        let diagnostics = Self::validate(&plan, context, &state.request.constraints);
        state.plan = Some(plan);
        Ok(StageResult::from_diagnostics(GOVERNANCE_PLANNING, Severity::High, diagnostics))
    }
}

pub struct CodeGeneration {
    pub generator: Arc<dyn ArtifactGenerator>,
}

impl Stage<BlueprintState> for CodeGeneration {
    fn name(&self) -> &str {
        CODE_GENERATION
    }

    fn run(&self, state: &mut BlueprintState) -> Result<StageResult, StageFault> {
        let plan = state
            .plan
            .as_ref()
            .ok_or_else(|| missing_slot(CODE_GENERATION, "plan"))?;
        let output = self.generator.generate(&state.request, plan)?;

        if output.is_empty() {
            state.output = Some(output);
            return Ok(StageResult::failed(
                CODE_GENERATION,
                Severity::High,
                vec!["no artifacts generated".to_string()],
            ));
        }

        let mut findings = GenerationFindings::default();
        for artifact in output.all() {
            findings.drift.extend(scan::find_drift_markers(&artifact.content));
            findings.suppressions.extend(
                scan::find_suppressions(&artifact.content)
                    .into_iter()
                    .map(|s| format!("{}:{s}", artifact.path)),
            );
            if scan::is_protected_path(&artifact.path) {
                findings.protected_writes.push(artifact.path.clone());
            }
            let lower = artifact.content.to_lowercase();
            for constraint in &state.request.constraints {
                if lower.contains(&constraint.to_lowercase()) {
                    findings
                        .constraint_violations
                        .push(format!("{}: {constraint}", artifact.path));
                }
            }
        }

        let mut diagnostics: Vec<String> = findings
            .drift
            .iter()
            .map(|d| format!("drift detected ({}) line {}: {}", d.kind, d.line, d.excerpt))
            .collect();
        diagnostics.extend(findings.suppressions.iter().map(|s| format!("suppression: {s}")));
        diagnostics.extend(
            findings
                .protected_writes
                .iter()
                .map(|p| format!("protected path write: {p}")),
        );
        diagnostics.extend(
            findings
                .constraint_violations
                .iter()
                .map(|c| format!("constraint violated: {c}")),
        );

        let severity = if findings.protected_writes.is_empty() {
            Severity::High
        } else {
            for path in &findings.protected_writes {
                state
                    .integrity_violations
                    .push(IntegrityViolation::new(path.as_str(), "builder output writes a protected path"));
            }
            Severity::Critical
        };

        state.output = Some(output);
        state.generation = Some(findings);
        Ok(StageResult::from_diagnostics(CODE_GENERATION, severity, diagnostics))
    }
}

pub struct SelfReview;

impl Stage<BlueprintState> for SelfReview {
    fn name(&self) -> &str {
        SELF_REVIEW
    }

    fn run(&self, state: &mut BlueprintState) -> Result<StageResult, StageFault> {
        let output = state
            .output
            .as_ref()
            .ok_or_else(|| missing_slot(SELF_REVIEW, "builder output"))?;

        let test_corpus: String = output
            .tests
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut review = ReviewFindings::default();
        if output.tests.is_empty() {
            review.missing_tests.push("no test artifacts generated".to_string());
        }
        for file in &output.files {
            for name in scan::exported_functions(&file.content) {
                if !test_corpus.contains(&name) {
                    review.missing_tests.push(name);
                }
            }
            review.schema_violations.extend(
                scan::untyped_any(&file.content)
                    .into_iter()
                    .map(|l| format!("{}:{l}", file.path)),
            );
            review.warnings.extend(
                scan::warning_markers(&file.content)
                    .into_iter()
                    .map(|l| format!("{}:{l}", file.path)),
            );
        }

        let mut diagnostics: Vec<String> = review
            .missing_tests
            .iter()
            .map(|t| format!("missing test: {t}"))
            .collect();
        diagnostics.extend(review.schema_violations.iter().map(|s| format!("schema violation: {s}")));
        diagnostics.extend(review.warnings.iter().map(|w| format!("warning: {w}")));

        state.review = Some(review);
        Ok(StageResult::from_diagnostics(SELF_REVIEW, Severity::High, diagnostics))
    }
}

pub struct Handover;

impl Stage<BlueprintState> for Handover {
    fn name(&self) -> &str {
        HANDOVER
    }

    fn run(&self, state: &mut BlueprintState) -> Result<StageResult, StageFault> {
        let plan = state.plan.as_ref().ok_or_else(|| missing_slot(HANDOVER, "plan"))?;
        let output = state
            .output
            .as_ref()
            .ok_or_else(|| missing_slot(HANDOVER, "builder output"))?;
        let context = state
            .context
            .as_ref()
            .ok_or_else(|| missing_slot(HANDOVER, "interpreted context"))?;

        let hashed = |artifacts: &[super::model::Artifact]| -> Vec<HashedArtifact> {
            artifacts
                .iter()
                .map(|a| HashedArtifact {
                    path: a.path.clone(),
                    hash: hash_hex(a.content.as_bytes()),
                })
                .collect()
        };
        let implementation = hashed(&output.files);
        let tests = hashed(&output.tests);

        let alignment: BTreeSet<String> = plan
            .steps
            .iter()
            .filter_map(|s| s.component.as_ref())
            .filter(|c| context.components.contains(*c))
            .cloned()
            .collect();

        let clean = state.generation.as_ref().is_some_and(GenerationFindings::is_clean)
            && state.review.as_ref().is_some_and(ReviewFindings::is_clean);
        let compliance = ComplianceStatement {
            compliant: clean && state.integrity_violations.is_empty(),
            checks_passed: [GOVERNANCE_PRE_CHECK, ARCHITECTURE_INTERPRET, GOVERNANCE_PLANNING, CODE_GENERATION, SELF_REVIEW]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            attestation: format!(
                "{} attests that task {} was built under the governance blueprint",
                state.request.builder_id, state.request.task_id
            ),
        };

        let mut risks = Vec::new();
        let uncovered: Vec<&String> = context.components.difference(&alignment).collect();
        if !uncovered.is_empty() {
            risks.push(Risk {
                description: format!("components without a plan step: {uncovered:?}"),
                severity: Severity::Medium,
            });
        }
        if risks.is_empty() {
            risks.push(Risk {
                description: "No known risks identified".to_string(),
                severity: Severity::Low,
            });
        }

        let mut hasher = blake3::Hasher::new();
        for artifact in implementation.iter().chain(tests.iter()) {
            hasher.update(artifact.path.as_bytes());
            hasher.update(&[0]);
            hasher.update(artifact.hash.as_bytes());
            hasher.update(&[b'\n']);
        }

        let package = HandoverPackage {
            builder_id: state.request.builder_id.clone(),
            task_id: state.request.task_id.clone(),
            implementation,
            tests,
            reasoning: plan.steps.iter().map(|s| s.description.clone()).collect(),
            architecture_alignment: alignment.into_iter().collect(),
            compliance: Some(compliance),
            risks,
            package_hash: hasher.finalize().to_hex().to_string(),
        };

        let problems = package.validate(state.request.architecture.is_some());
        state.handover = Some(package);
        Ok(StageResult::from_diagnostics(HANDOVER, Severity::High, problems))
    }
}
