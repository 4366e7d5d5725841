//! Integration tests for drift computation and window classification

use chrono::{DateTime, Duration, TimeZone, Utc};
use foreman_governance::drift::classifier::{StabilityTrend, Trend};
use foreman_governance::drift::{
    analyze_constraint_stress, classify_drift_pattern, compute_drift, DriftClassification, DriftClassifier,
    DriftThresholds, Signature, SourceType,
};

fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

/// Ten modules; the first `changed` get a hash unique to this signature.
fn commit(id: &str, hours: i64, changed: usize) -> Signature {
    (0..10).fold(Signature::new(id, SourceType::Commit, id, at(hours)), |sig, i| {
        let hash = if i < changed { format!("{id}-{i}") } else { format!("base-{i}") };
        sig.with_module(format!("mod_{i}"), hash)
            .with_edge(format!("mod_{i}"), "mod_0")
    })
}

/// Test: a diff of a signature against itself is empty and fully aligned
#[test]
fn test_self_diff_is_zero() {
    let sig = commit("c1", 0, 0).with_api("GET /orders").with_constraint("no-any");
    let drift = compute_drift(&sig, &sig);

    assert_eq!(drift.id, "c1..c1");
    assert_eq!(drift.metrics.total_changes, 0);
    assert_eq!(drift.metrics.structural_churn_rate, 0.0);
    assert_eq!(drift.metrics.contract_stability_score, 1.0);
    assert_eq!(drift.metrics.governance_alignment_score, 1.0);
    assert!(!drift.governance_changes.protected_paths_changed);
    assert_eq!(drift.timestamp, sig.timestamp);
    assert!(drift.structurally_identical());
}

/// Test: module churn, contract and governance changes are all counted
#[test]
fn test_structural_diff() {
    let old = commit("c1", 0, 0).with_api("GET /orders").with_protected_path("foreman/");
    let new = commit("c2", 1, 3)
        .with_module("mod_new", "fresh")
        .with_api("GET /orders")
        .with_api("POST /orders")
        .with_constraint("strict-types");

    let drift = compute_drift(&old, &new);
    assert_eq!(drift.structural_changes.modules_added, vec!["mod_new"]);
    assert!(drift.structural_changes.modules_removed.is_empty());
    assert_eq!(drift.structural_changes.modules_modified, vec!["mod_0", "mod_1", "mod_2"]);
    assert_eq!(drift.metrics.total_changes, 4);
    assert!((drift.metrics.structural_churn_rate - 4.0 / 11.0).abs() < 1e-9);
    assert_eq!(drift.contract_changes.apis_changed, 1);
    assert!((drift.metrics.contract_stability_score - 0.9).abs() < 1e-9);
    assert_eq!(drift.governance_changes.constraints_added, vec!["strict-types"]);
    assert!(drift.governance_changes.protected_paths_changed);
}

/// Test: input order never changes the classification
#[test]
fn test_window_order_independent() {
    let window = vec![commit("a", 0, 0), commit("b", 1, 1), commit("c", 2, 1), commit("d", 3, 1)];
    let mut shuffled = window.clone();
    shuffled.reverse();
    shuffled.swap(0, 2);

    let sorted = classify_drift_pattern(&window);
    let unsorted = classify_drift_pattern(&shuffled);
    assert_eq!(sorted, unsorted);
    assert_eq!(sorted.classification, DriftClassification::Gradual);
    assert_eq!(sorted.observation_window.start_time, Some(at(0)));
    assert_eq!(sorted.observation_window.end_time, Some(at(3)));
    assert_eq!(sorted.computations[0].id, "a..b");
}

/// Test: a growing violation count wins over quiet structure
#[test]
fn test_regressive_precedence() {
    let window = vec![
        commit("a", 0, 0),
        commit("b", 1, 0).with_constraint("c1"),
        commit("c", 2, 0)
            .with_constraint("c1")
            .with_constraint("c2")
            .with_constraint("c3"),
    ];
    let result = classify_drift_pattern(&window);
    assert_eq!(result.classification, DriftClassification::Regressive);
    assert_eq!(result.supporting_metrics.violation_delta, 3);
    assert_eq!(result.supporting_metrics.violation_trend, Trend::Increasing);
    assert_eq!(result.supporting_metrics.average_churn_rate, 0.0);
}

/// Test: churn that jumps late in the window is Accelerating
#[test]
fn test_accelerating_window() {
    let window = vec![
        commit("a", 0, 0),
        commit("b", 1, 0),
        commit("c", 2, 0),
        commit("d", 3, 9),
        commit("e", 4, 9),
    ];
    let result = classify_drift_pattern(&window);
    assert_eq!(result.classification, DriftClassification::Accelerating);
    assert_eq!(result.supporting_metrics.stability_trend, StabilityTrend::Degrading);
}

/// Test: configured thresholds change the verdict
#[test]
fn test_custom_thresholds() {
    let window = vec![commit("a", 0, 0), commit("b", 1, 1), commit("c", 2, 1)];
    assert_eq!(classify_drift_pattern(&window).classification, DriftClassification::Gradual);

    let lenient = DriftClassifier::with_thresholds(DriftThresholds {
        stable_max_churn: 0.2,
        ..Default::default()
    });
    assert_eq!(lenient.classify(&window).classification, DriftClassification::Stable);
}

/// Test: constraint stress counts violations and reads the trend chronologically
#[test]
fn test_constraint_stress() {
    let window = vec![
        commit("d", 3, 0).with_constraint("no-any"),
        commit("a", 0, 0),
        commit("c", 2, 0).with_constraint("no-any"),
        commit("b", 1, 0),
    ];
    let stress = analyze_constraint_stress("no-any", &window);
    assert_eq!(stress.stress_count, 2);
    assert_eq!(stress.trend, Trend::Increasing);
    let order: Vec<&str> = stress.observations.iter().map(|o| o.source_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);

    let untouched = analyze_constraint_stress("strict-types", &window);
    assert_eq!(untouched.stress_count, 0);
    assert_eq!(untouched.trend, Trend::Stable);
}
