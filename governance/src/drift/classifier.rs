//! Window classification: Stable, Gradual, Accelerating or Regressive.
//!
//! Precedence is fixed:
//!
//! 1. violation delta ≥ regressive threshold → `Regressive`
//! 2. churn acceleration ≥ accelerating threshold → `Accelerating`
//! 3. churn and violation delta within stable bounds → `Stable`
//! 4. churn and violation delta within gradual bounds → `Gradual`
//! 5. otherwise → `Accelerating` (fallback confidence)
//!
//! Confidence is a constant per branch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::computation::{compute_drift, DriftComputation};
use super::signature::{Signature, SourceType};

pub const REGRESSIVE_CONFIDENCE: f64 = 0.9;
pub const ACCELERATING_CONFIDENCE: f64 = 0.85;
pub const STABLE_CONFIDENCE: f64 = 0.9;
pub const GRADUAL_CONFIDENCE: f64 = 0.8;
pub const FALLBACK_CONFIDENCE: f64 = 0.7;
pub const DEGENERATE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriftClassification {
    Stable,
    Gradual,
    Accelerating,
    Regressive,
}

impl std::fmt::Display for DriftClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "Stable"),
            Self::Gradual => write!(f, "Gradual"),
            Self::Accelerating => write!(f, "Accelerating"),
            Self::Regressive => write!(f, "Regressive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityTrend {
    Improving,
    Stable,
    Degrading,
}

/// Classification bounds. Loaded from configuration; defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftThresholds {
    pub stable_max_churn: f64,
    pub stable_max_violation_delta: i64,
    pub gradual_max_churn: f64,
    pub gradual_max_violation_delta: i64,
    pub accelerating_min_churn_increase: f64,
    pub regressive_min_violation_delta: i64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            stable_max_churn: 0.05,
            stable_max_violation_delta: 0,
            gradual_max_churn: 0.15,
            gradual_max_violation_delta: 2,
            accelerating_min_churn_increase: 0.5,
            regressive_min_violation_delta: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingMetrics {
    pub average_churn_rate: f64,
    pub violation_delta: i64,
    pub churn_acceleration: f64,
    pub violation_trend: Trend,
    pub stability_trend: StabilityTrend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationWindow {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub signature_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftClassificationResult {
    pub classification: DriftClassification,
    pub confidence: f64,
    pub supporting_metrics: SupportingMetrics,
    pub observation_window: ObservationWindow,
    /// Consecutive pairwise diffs the classification was computed from
    pub computations: Vec<DriftComputation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintObservation {
    pub timestamp: DateTime<Utc>,
    pub violated: bool,
    pub source_type: SourceType,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintStress {
    pub constraint_id: String,
    pub stress_count: usize,
    pub trend: Trend,
    pub observations: Vec<ConstraintObservation>,
}

fn chronological(signatures: &[Signature]) -> Vec<&Signature> {
    let mut sorted: Vec<&Signature> = signatures.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    sorted
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriftClassifier {
    thresholds: DriftThresholds,
}

impl DriftClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: DriftThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DriftThresholds {
        &self.thresholds
    }

    /// Classify a window of signatures. Input order does not matter; the
    /// window is sorted by timestamp, ties broken by id.
    pub fn classify(&self, signatures: &[Signature]) -> DriftClassificationResult {
        let sorted = chronological(signatures);
        let observation_window = ObservationWindow {
            start_time: sorted.first().map(|s| s.timestamp),
            end_time: sorted.last().map(|s| s.timestamp),
            signature_count: sorted.len(),
        };

        if sorted.len() < 2 {
            debug!(signatures = sorted.len(), "Drift window too small, reporting Stable");
            return DriftClassificationResult {
                classification: DriftClassification::Stable,
                confidence: DEGENERATE_CONFIDENCE,
                supporting_metrics: SupportingMetrics {
                    average_churn_rate: 0.0,
                    violation_delta: 0,
                    churn_acceleration: 0.0,
                    violation_trend: Trend::Stable,
                    stability_trend: StabilityTrend::Stable,
                },
                observation_window,
                computations: Vec::new(),
            };
        }

        let computations: Vec<DriftComputation> = sorted
            .windows(2)
            .map(|pair| compute_drift(pair[0], pair[1]))
            .collect();
        let churn: Vec<f64> = computations.iter().map(|c| c.metrics.structural_churn_rate).collect();

        let average_churn_rate = mean(&churn);
        let (first_half, second_half) = churn.split_at(churn.len() / 2);
        let churn_acceleration = mean(second_half) - mean(first_half);

        let first_violations = sorted.first().map_or(0, |s| s.violation_count()) as i64;
        let last_violations = sorted.last().map_or(0, |s| s.violation_count()) as i64;
        let violation_delta = last_violations - first_violations;

        let t = &self.thresholds;
        let (classification, confidence) = if violation_delta >= t.regressive_min_violation_delta {
            (DriftClassification::Regressive, REGRESSIVE_CONFIDENCE)
        } else if churn_acceleration >= t.accelerating_min_churn_increase {
            (DriftClassification::Accelerating, ACCELERATING_CONFIDENCE)
        } else if average_churn_rate <= t.stable_max_churn && violation_delta <= t.stable_max_violation_delta {
            (DriftClassification::Stable, STABLE_CONFIDENCE)
        } else if average_churn_rate <= t.gradual_max_churn && violation_delta <= t.gradual_max_violation_delta {
            (DriftClassification::Gradual, GRADUAL_CONFIDENCE)
        } else {
            (DriftClassification::Accelerating, FALLBACK_CONFIDENCE)
        };

        let violation_trend = if violation_delta > 1 {
            Trend::Increasing
        } else if violation_delta < -1 {
            Trend::Decreasing
        } else {
            Trend::Stable
        };
        let stability_trend = if churn_acceleration < -0.1 {
            StabilityTrend::Improving
        } else if churn_acceleration > 0.1 {
            StabilityTrend::Degrading
        } else {
            StabilityTrend::Stable
        };

        info!(
            classification = %classification,
            confidence,
            average_churn_rate,
            violation_delta,
            churn_acceleration,
            signatures = sorted.len(),
            "Drift window classified"
        );

        DriftClassificationResult {
            classification,
            confidence,
            supporting_metrics: SupportingMetrics {
                average_churn_rate,
                violation_delta,
                churn_acceleration,
                violation_trend,
                stability_trend,
            },
            observation_window,
            computations,
        }
    }
}

/// Classify with the default thresholds.
pub fn classify_drift_pattern(signatures: &[Signature]) -> DriftClassificationResult {
    DriftClassifier::new().classify(signatures)
}

/// How often `constraint_id` is under violation across a window, and whether
/// that is getting worse.
pub fn analyze_constraint_stress(constraint_id: &str, signatures: &[Signature]) -> ConstraintStress {
    let observations: Vec<ConstraintObservation> = chronological(signatures)
        .into_iter()
        .map(|s| ConstraintObservation {
            timestamp: s.timestamp,
            violated: s.governance.constraints.contains(constraint_id),
            source_type: s.source_type,
            source_id: s.source_id.clone(),
        })
        .collect();

    let (first_half, second_half) = observations.split_at(observations.len() / 2);
    let first = first_half.iter().filter(|o| o.violated).count() as f64;
    let second = second_half.iter().filter(|o| o.violated).count() as f64;
    let trend = if second > first * 1.2 {
        Trend::Increasing
    } else if second < first * 0.8 {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    ConstraintStress {
        constraint_id: constraint_id.to_string(),
        stress_count: observations.iter().filter(|o| o.violated).count(),
        trend,
        observations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sig(id: &str, hour: u32) -> Signature {
        Signature::new(id, SourceType::Commit, id, Utc.with_ymd_and_hms(2026, 2, 1, hour, 0, 0).unwrap())
    }

    /// Twenty modules, `changed` of which carry a per-signature hash.
    fn churned(id: &str, hour: u32, changed: usize) -> Signature {
        (0..20).fold(sig(id, hour), |s, i| {
            let hash = if i < changed { format!("{id}-{i}") } else { "same".to_string() };
            s.with_module(format!("m{i:02}"), hash)
        })
    }

    #[test]
    fn test_degenerate_windows() {
        let empty = classify_drift_pattern(&[]);
        assert_eq!(empty.classification, DriftClassification::Stable);
        assert_eq!(empty.confidence, DEGENERATE_CONFIDENCE);
        assert!(empty.observation_window.start_time.is_none());

        let single = classify_drift_pattern(&[sig("a", 1)]);
        assert_eq!(single.confidence, DEGENERATE_CONFIDENCE);
        assert_eq!(single.observation_window.signature_count, 1);
    }

    #[test]
    fn test_stable_window() {
        let window = [churned("a", 1, 0), churned("b", 2, 0), churned("c", 3, 0)];
        let result = classify_drift_pattern(&window);
        assert_eq!(result.classification, DriftClassification::Stable);
        assert_eq!(result.confidence, STABLE_CONFIDENCE);
        assert_eq!(result.computations.len(), 2);
    }

    #[test]
    fn test_regressive_beats_stable() {
        let window = [
            churned("a", 1, 0),
            churned("b", 2, 0).with_constraint("c1"),
            churned("c", 3, 0).with_constraint("c1").with_constraint("c2").with_constraint("c3"),
        ];
        let result = classify_drift_pattern(&window);
        assert_eq!(result.supporting_metrics.violation_delta, 3);
        assert!(result.supporting_metrics.average_churn_rate <= 0.05);
        assert_eq!(result.classification, DriftClassification::Regressive);
        assert_eq!(result.confidence, REGRESSIVE_CONFIDENCE);
        assert_eq!(result.supporting_metrics.violation_trend, Trend::Increasing);
    }

    #[test]
    fn test_accelerating_window() {
        // Pair churn 0, 0, 0.8, 0.8.
        let window = [
            churned("a", 1, 0),
            churned("b", 2, 0),
            churned("c", 3, 0),
            churned("d", 4, 16),
            churned("e", 5, 16),
        ];
        let result = classify_drift_pattern(&window);
        assert!(result.supporting_metrics.churn_acceleration >= 0.5);
        assert_eq!(result.classification, DriftClassification::Accelerating);
        assert_eq!(result.confidence, ACCELERATING_CONFIDENCE);
        assert_eq!(result.supporting_metrics.stability_trend, StabilityTrend::Degrading);
    }

    #[test]
    fn test_gradual_window() {
        // Churn 0.1 on every pair.
        let window = [churned("a", 1, 2), churned("b", 2, 2), churned("c", 3, 2)];
        let result = classify_drift_pattern(&window);
        assert!((result.supporting_metrics.average_churn_rate - 0.1).abs() < 1e-9);
        assert_eq!(result.classification, DriftClassification::Gradual);
        assert_eq!(result.confidence, GRADUAL_CONFIDENCE);
    }

    #[test]
    fn test_fallback_window() {
        // Steady 0.5 churn: no acceleration, but too much for gradual.
        let window = [churned("a", 1, 10), churned("b", 2, 10), churned("c", 3, 10)];
        let result = classify_drift_pattern(&window);
        assert_eq!(result.classification, DriftClassification::Accelerating);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let a = churned("a", 1, 0);
        let b = churned("b", 2, 4).with_constraint("x");
        let c = churned("c", 3, 1);
        let forward = classify_drift_pattern(&[a.clone(), b.clone(), c.clone()]);
        let shuffled = classify_drift_pattern(&[c, a, b]);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_custom_thresholds() {
        let window = [churned("a", 1, 2), churned("b", 2, 2)];
        let strict = DriftClassifier::with_thresholds(DriftThresholds {
            gradual_max_churn: 0.01,
            ..DriftThresholds::default()
        });
        assert_eq!(strict.classify(&window).classification, DriftClassification::Accelerating);
    }

    #[test]
    fn test_constraint_stress() {
        let window = [
            sig("a", 1),
            sig("b", 2),
            sig("c", 3).with_constraint("no-any"),
            sig("d", 4).with_constraint("no-any"),
        ];
        let stress = analyze_constraint_stress("no-any", &window);
        assert_eq!(stress.stress_count, 2);
        assert_eq!(stress.trend, Trend::Increasing);
        assert_eq!(stress.observations.len(), 4);
        assert!(stress.observations[3].violated);

        let easing = [sig("a", 1).with_constraint("x"), sig("b", 2)];
        assert_eq!(analyze_constraint_stress("x", &easing).trend, Trend::Decreasing);
        assert_eq!(analyze_constraint_stress("x", &[]).trend, Trend::Stable);
    }
}
