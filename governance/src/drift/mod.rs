//! Structural drift between signatures and classification of drift windows.
//!
//! Advisory telemetry: nothing here blocks a merge.

pub mod classifier;
pub mod computation;
pub mod signature;

pub use classifier::{
    analyze_constraint_stress, classify_drift_pattern, ConstraintStress, DriftClassification,
    DriftClassificationResult, DriftClassifier, DriftThresholds,
};
pub use computation::{compute_drift, DriftComputation};
pub use signature::{Signature, SourceType};
