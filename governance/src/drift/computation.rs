//! Pairwise structural diff between two signatures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::signature::Signature;

/// Contract or constraint changes that take a score from 1 to 0.
const SCORE_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralChanges {
    pub modules_added: Vec<String>,
    pub modules_removed: Vec<String>,
    pub modules_modified: Vec<String>,
    pub dependencies_added: usize,
    pub dependencies_removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractChanges {
    pub apis_changed: usize,
    pub types_changed: usize,
    pub events_changed: usize,
}

impl ContractChanges {
    pub fn total(&self) -> usize {
        self.apis_changed + self.types_changed + self.events_changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceChanges {
    pub constraints_added: Vec<String>,
    pub constraints_removed: Vec<String>,
    pub protected_paths_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftMetrics {
    pub total_changes: usize,
    /// Changed modules over the larger module count, in `[0, 1]`
    pub structural_churn_rate: f64,
    pub contract_stability_score: f64,
    pub governance_alignment_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftComputation {
    /// `<old id>..<new id>`
    pub id: String,
    pub old_signature_id: String,
    pub new_signature_id: String,
    /// Structural digest of each side; `None` if it could not be computed
    pub old_digest: Option<String>,
    pub new_digest: Option<String>,
    /// Capture time of the newer signature
    pub timestamp: DateTime<Utc>,
    pub structural_changes: StructuralChanges,
    pub contract_changes: ContractChanges,
    pub governance_changes: GovernanceChanges,
    pub metrics: DriftMetrics,
}

impl DriftComputation {
    /// Both sides hash to the same structure, whatever their ids or capture
    /// times.
    pub fn structurally_identical(&self) -> bool {
        matches!((&self.old_digest, &self.new_digest), (Some(a), Some(b)) if a == b)
    }
}

fn sorted_difference<'a>(left: &BTreeSet<&'a str>, right: &BTreeSet<&'a str>) -> Vec<String> {
    left.difference(right).map(|s| s.to_string()).collect()
}

fn bounded_score(changes: usize) -> f64 {
    (1.0 - changes as f64 / SCORE_SCALE).clamp(0.0, 1.0)
}

/// Deterministic diff of `old` against `new`. Same inputs, same output.
pub fn compute_drift(old: &Signature, new: &Signature) -> DriftComputation {
    let old_modules = old.module_names();
    let new_modules = new.module_names();

    let old_hashes: BTreeMap<&str, &str> = old.modules.iter().map(|m| (m.name.as_str(), m.hash.as_str())).collect();
    let new_hashes: BTreeMap<&str, &str> = new.modules.iter().map(|m| (m.name.as_str(), m.hash.as_str())).collect();
    let modules_modified: Vec<String> = old_hashes
        .iter()
        .filter(|(name, hash)| new_hashes.get(*name).is_some_and(|h| h != *hash))
        .map(|(name, _)| name.to_string())
        .collect();

    let structural_changes = StructuralChanges {
        modules_added: sorted_difference(&new_modules, &old_modules),
        modules_removed: sorted_difference(&old_modules, &new_modules),
        modules_modified,
        dependencies_added: new.dependency_edges.len().saturating_sub(old.dependency_edges.len()),
        dependencies_removed: old.dependency_edges.len().saturating_sub(new.dependency_edges.len()),
    };

    let contract_changes = ContractChanges {
        apis_changed: old.contracts.apis.len().abs_diff(new.contracts.apis.len()),
        types_changed: old.contracts.types.len().abs_diff(new.contracts.types.len()),
        events_changed: old.contracts.events.len().abs_diff(new.contracts.events.len()),
    };

    let old_paths: BTreeSet<&String> = old.governance.protected_paths.iter().collect();
    let new_paths: BTreeSet<&String> = new.governance.protected_paths.iter().collect();
    let governance_changes = GovernanceChanges {
        constraints_added: new
            .governance
            .constraints
            .difference(&old.governance.constraints)
            .cloned()
            .collect(),
        constraints_removed: old
            .governance
            .constraints
            .difference(&new.governance.constraints)
            .cloned()
            .collect(),
        protected_paths_changed: old_paths != new_paths,
    };

    let total_modules = old_modules.len().max(new_modules.len());
    let total_changes = structural_changes.modules_added.len()
        + structural_changes.modules_removed.len()
        + structural_changes.modules_modified.len();
    let structural_churn_rate = if total_modules == 0 {
        0.0
    } else {
        (total_changes as f64 / total_modules as f64).clamp(0.0, 1.0)
    };

    let metrics = DriftMetrics {
        total_changes,
        structural_churn_rate,
        contract_stability_score: bounded_score(contract_changes.total()),
        governance_alignment_score: bounded_score(
            governance_changes.constraints_added.len() + governance_changes.constraints_removed.len(),
        ),
    };

    DriftComputation {
        id: format!("{}..{}", old.id, new.id),
        old_signature_id: old.id.clone(),
        new_signature_id: new.id.clone(),
        old_digest: old.digest().ok(),
        new_digest: new.digest().ok(),
        timestamp: new.timestamp,
        structural_changes,
        contract_changes,
        governance_changes,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::signature::SourceType;
    use chrono::TimeZone;

    fn sig(id: &str) -> Signature {
        Signature::new(id, SourceType::Commit, id, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_identical_signatures_have_no_drift() {
        let s = sig("a")
            .with_module("core", "h1")
            .with_module("api", "h2")
            .with_edge("api", "core")
            .with_constraint("no-any");
        let drift = compute_drift(&s, &s);
        assert!(drift.structural_changes.modules_added.is_empty());
        assert!(drift.structural_changes.modules_removed.is_empty());
        assert!(drift.structural_changes.modules_modified.is_empty());
        assert_eq!(drift.structural_changes.dependencies_added, 0);
        assert_eq!(drift.metrics.structural_churn_rate, 0.0);
        assert_eq!(drift.metrics.contract_stability_score, 1.0);
        assert_eq!(drift.metrics.governance_alignment_score, 1.0);
        assert!(!drift.governance_changes.protected_paths_changed);
    }

    #[test]
    fn test_added_removed_modified_sorted() {
        let old = sig("a").with_module("core", "h1").with_module("zeta", "z").with_module("api", "h2");
        let new = sig("b")
            .with_module("core", "h1-changed")
            .with_module("api", "h2")
            .with_module("web", "w")
            .with_module("cli", "c");
        let drift = compute_drift(&old, &new);
        assert_eq!(drift.structural_changes.modules_added, vec!["cli", "web"]);
        assert_eq!(drift.structural_changes.modules_removed, vec!["zeta"]);
        assert_eq!(drift.structural_changes.modules_modified, vec!["core"]);
        assert_eq!(drift.metrics.total_changes, 4);
        assert_eq!(drift.metrics.structural_churn_rate, 1.0);
        assert_eq!(drift.id, "a..b");
    }

    #[test]
    fn test_churn_and_scores_are_clamped() {
        let old = sig("a").with_module("x", "1");
        let new = sig("b").with_module("y", "1");
        // One added plus one removed over a single-module window.
        assert_eq!(compute_drift(&old, &new).metrics.structural_churn_rate, 1.0);

        let mut many = sig("c");
        for i in 0..15 {
            many = many.with_api(format!("api-{i}")).with_constraint(format!("c-{i}"));
        }
        let drift = compute_drift(&sig("d"), &many);
        assert_eq!(drift.contract_changes.apis_changed, 15);
        assert_eq!(drift.metrics.contract_stability_score, 0.0);
        assert_eq!(drift.metrics.governance_alignment_score, 0.0);
    }

    #[test]
    fn test_protected_paths_compared_as_sets() {
        let old = sig("a").with_protected_path("b/").with_protected_path("a/");
        let new = sig("b").with_protected_path("a/").with_protected_path("b/");
        assert!(!compute_drift(&old, &new).governance_changes.protected_paths_changed);
        let changed = sig("c").with_protected_path("a/");
        assert!(compute_drift(&old, &changed).governance_changes.protected_paths_changed);
    }

    #[test]
    fn test_digests_identify_compared_structures() {
        let old = sig("a").with_module("core", "1").with_module("api", "2");
        let reordered = sig("b").with_module("api", "2").with_module("core", "1");
        let drift = compute_drift(&old, &reordered);
        assert_eq!(drift.old_digest, old.digest().ok());
        assert_eq!(drift.new_digest, reordered.digest().ok());
        assert!(drift.structurally_identical());

        let changed = reordered.with_constraint("no-any");
        assert!(!compute_drift(&old, &changed).structurally_identical());
    }

    #[test]
    fn test_is_deterministic() {
        let old = sig("a").with_module("core", "1").with_constraint("x");
        let new = sig("b").with_module("core", "2").with_module("api", "3");
        assert_eq!(compute_drift(&old, &new), compute_drift(&old, &new));
    }
}
