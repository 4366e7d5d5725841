//! Ordered, fail-fast stage pipelines.
//!
//! One runner backs two instantiations:
//!
//! - [`blueprint::Blueprint`]: six stages governing how a builder produces code
//! - [`gate::Gate`]: nine constitutional controls run before a merge
//!
//! Both share the halting rule (first failing stage stops the run), the
//! panic-to-failure conversion and the terminal audit entry.

pub mod blueprint;
pub mod evidence;
pub mod gate;
pub mod runner;
pub mod scan;
pub mod stage;

pub use blueprint::{Blueprint, BlueprintOutcome};
pub use evidence::{EvidenceSnapshot, EvidenceStore, HashingEvidenceStore};
pub use gate::{Gate, GateVerdict, MergeCandidate};
pub use runner::{PipelineExecutionResult, PipelineRunner, StageObserver};
pub use stage::{EvidenceRef, FnStage, Stage, StageResult};
