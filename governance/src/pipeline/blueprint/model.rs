//! Inputs, intermediate products and the handover package of a blueprint run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{IntegrityViolation, Severity};
use crate::pipeline::scan::DriftMarker;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeUsage {
    pub type_name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    /// Where the component must live, e.g. `src/services/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<TypeUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

impl Architecture {
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Everything a builder is handed for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintRequest {
    pub builder_id: String,
    pub task_id: String,
    #[serde(default)]
    pub description: String,
    /// Governance file path to its current content
    #[serde(default)]
    pub governance_files: BTreeMap<String, String>,
    /// Governance file path to its approved blake3 hash
    #[serde(default)]
    pub expected_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub architecture: Option<Architecture>,
    /// Phrases that must not appear in plans or generated code
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// Architecture digested by the interpretation stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpretedContext {
    pub components: BTreeSet<String>,
    /// Component name to required location
    pub locations: BTreeMap<String, String>,
    pub type_fields: BTreeMap<String, BTreeSet<String>>,
    pub flows: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderPlan {
    pub steps: Vec<PlanStep>,
    pub tests: Vec<String>,
    /// Planned test coverage, percent
    pub coverage: u8,
    pub strict_typing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Source,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub content: String,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn source(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            kind: ArtifactKind::Source,
        }
    }

    pub fn test(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            kind: ArtifactKind::Test,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderOutput {
    pub files: Vec<Artifact>,
    pub tests: Vec<Artifact>,
}

impl BuilderOutput {
    pub fn all(&self) -> impl Iterator<Item = &Artifact> {
        self.files.iter().chain(self.tests.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.tests.is_empty()
    }
}

/// What code generation found wrong with an output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFindings {
    pub drift: Vec<DriftMarker>,
    pub suppressions: Vec<String>,
    pub protected_writes: Vec<String>,
    pub constraint_violations: Vec<String>,
}

impl GenerationFindings {
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty()
            && self.suppressions.is_empty()
            && self.protected_writes.is_empty()
            && self.constraint_violations.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFindings {
    pub missing_tests: Vec<String>,
    pub schema_violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl ReviewFindings {
    pub fn is_clean(&self) -> bool {
        self.missing_tests.is_empty() && self.schema_violations.is_empty() && self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedArtifact {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceStatement {
    pub compliant: bool,
    pub checks_passed: Vec<String>,
    pub attestation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub description: String,
    pub severity: Severity,
}

/// Output of a successful blueprint run; becomes the merge candidate's
/// declared evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverPackage {
    pub builder_id: String,
    pub task_id: String,
    pub implementation: Vec<HashedArtifact>,
    pub tests: Vec<HashedArtifact>,
    /// Plan steps in order
    pub reasoning: Vec<String>,
    /// Architecture components covered by the plan
    pub architecture_alignment: Vec<String>,
    pub compliance: Option<ComplianceStatement>,
    pub risks: Vec<Risk>,
    pub package_hash: String,
}

impl HandoverPackage {
    /// Names of required sections that are empty.
    pub fn missing_artifacts(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.implementation.is_empty() {
            missing.push("implementation");
        }
        if self.tests.is_empty() {
            missing.push("tests");
        }
        if self.reasoning.is_empty() {
            missing.push("reasoningDocument");
        }
        if self.compliance.is_none() {
            missing.push("complianceStatement");
        }
        missing
    }

    /// Every problem that would block the handover.
    pub fn validate(&self, expects_architecture: bool) -> Vec<String> {
        let mut problems: Vec<String> = self
            .missing_artifacts()
            .into_iter()
            .map(|a| format!("missing artifact: {a}"))
            .collect();

        match &self.compliance {
            Some(c) if !c.compliant => problems.push("compliance statement required".to_string()),
            _ => {}
        }
        if expects_architecture && self.architecture_alignment.is_empty() {
            problems.push("architecture alignment required".to_string());
        }
        if self.risks.is_empty() {
            problems.push("explicit risk disclosure required".to_string());
        }
        problems
    }

    /// Declared hash for every packaged artifact, by path.
    pub fn declared_hashes(&self) -> BTreeMap<String, String> {
        self.implementation
            .iter()
            .chain(self.tests.iter())
            .map(|a| (a.path.clone(), a.hash.clone()))
            .collect()
    }
}

/// Working state threaded through the six stages. Each stage fills its own
/// slot once.
#[derive(Debug, Clone, Default)]
pub struct BlueprintState {
    pub request: BlueprintRequest,
    pub integrity_violations: Vec<IntegrityViolation>,
    pub context: Option<InterpretedContext>,
    pub plan: Option<BuilderPlan>,
    pub output: Option<BuilderOutput>,
    pub generation: Option<GenerationFindings>,
    pub review: Option<ReviewFindings>,
    pub handover: Option<HandoverPackage>,
}

impl BlueprintState {
    pub fn new(request: BlueprintRequest) -> Self {
        Self {
            request,
            ..Default::default()
        }
    }
}
