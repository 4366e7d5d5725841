//! Structural signatures captured at commit, PR and wave boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Commit,
    Pr,
    Wave,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Pr => write!(f, "pr"),
            Self::Wave => write!(f, "wave"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contracts {
    pub apis: Vec<String>,
    pub types: Vec<String>,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GovernanceSnapshot {
    /// Constraints currently under violation
    pub constraints: BTreeSet<String>,
    pub protected_paths: Vec<String>,
}

/// Immutable once captured. The classifier borrows signatures and never
/// mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub dependency_edges: Vec<DependencyEdge>,
    #[serde(default)]
    pub contracts: Contracts,
    #[serde(default)]
    pub governance: GovernanceSnapshot,
}

/// Structural content only; identity and capture time are not part of the digest.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalSignature<'a> {
    modules: Vec<&'a ModuleEntry>,
    dependency_edges: Vec<&'a DependencyEdge>,
    contracts: &'a Contracts,
    constraints: &'a BTreeSet<String>,
    protected_paths: Vec<&'a String>,
}

impl Signature {
    pub fn new(
        id: impl Into<String>,
        source_type: SourceType,
        source_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source_type,
            source_id: source_id.into(),
            timestamp,
            modules: Vec::new(),
            dependency_edges: Vec::new(),
            contracts: Contracts::default(),
            governance: GovernanceSnapshot::default(),
        }
    }

    pub fn with_module(mut self, name: impl Into<String>, hash: impl Into<String>) -> Self {
        self.modules.push(ModuleEntry {
            name: name.into(),
            hash: hash.into(),
        });
        self
    }

    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.dependency_edges.push(DependencyEdge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.contracts.apis.push(api.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.governance.constraints.insert(constraint.into());
        self
    }

    pub fn with_protected_path(mut self, path: impl Into<String>) -> Self {
        self.governance.protected_paths.push(path.into());
        self
    }

    /// Number of constraints under violation.
    pub fn violation_count(&self) -> usize {
        self.governance.constraints.len()
    }

    pub fn module_names(&self) -> BTreeSet<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// blake3 over the canonical JSON form: modules, edges and protected
    /// paths sorted.
    pub fn digest(&self) -> serde_json::Result<String> {
        let mut modules: Vec<&ModuleEntry> = self.modules.iter().collect();
        modules.sort();
        let mut dependency_edges: Vec<&DependencyEdge> = self.dependency_edges.iter().collect();
        dependency_edges.sort();
        let mut protected_paths: Vec<&String> = self.governance.protected_paths.iter().collect();
        protected_paths.sort();

        let canonical = CanonicalSignature {
            modules,
            dependency_edges,
            contracts: &self.contracts,
            constraints: &self.governance.constraints,
            protected_paths,
        };
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}
