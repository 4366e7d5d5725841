//! Tiered selection, struggle detection and escalation.
//!
//! # Lifecycle of one task
//!
//! ```text
//! descriptor ──▶ TieredSelector::select_tier ──▶ tier + resource
//!                                                  │
//!                        ┌──── attempt ◀───────────┘
//!                        ▼
//!                  AttemptLedger ──▶ EscalationEngine::decide
//!                                        │
//!      ├─ last attempt succeeded ────────┼──▶ Complete
//!      ├─ struggle signal ───────────────┼──▶ Escalate (one rank) / Exhausted at top
//!      ├─ budget left ───────────────────┼──▶ Retry
//!      └─ budget spent ──────────────────┴──▶ Escalate / Exhausted
//!
//! finished tasks ──▶ consider_de_escalation (3 clean successes) ──▶ one rank down
//! ```
//!
//! The selector is generic over a [`TierPolicy`]; [`ForemanPolicy`] and
//! [`BuilderPolicy`] are the two domains.

pub mod attempt;
pub mod builder;
pub mod deescalation;
pub mod engine;
pub mod foreman;
pub mod selector;
pub mod struggle;

pub use attempt::{AttemptLedger, AttemptResult, BuildAttempt, TaskHistory, TaskOutcome};
pub use builder::{BuilderComplexity, BuilderPolicy, BuilderTaskDescriptor};
pub use deescalation::{consider_de_escalation, DE_ESCALATION_WINDOW};
pub use engine::{AttemptDecision, EscalationEngine, EscalationTrigger};
pub use foreman::{ForemanPolicy, TaskComplexity, TaskDescriptor, TaskType};
pub use selector::{EscalationDecision, HardBlock, Recommendation, TierPolicy, TierSelection, TieredSelector};
pub use struggle::{detect_struggle, StruggleDetector, StruggleSignal, StruggleThresholds, StruggleType};
