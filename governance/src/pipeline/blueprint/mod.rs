//! Six-stage builder blueprint.
//!
//! ```text
//! request ─► governance-pre-check ─► architecture-interpret ─► governance-planning
//!                                                                      │
//!   HandoverPackage ◄─ handover ◄─ self-review ◄─ code-generation ◄────┘
//! ```
//!
//! Plan synthesis and code generation are supplied by the caller; every
//! other stage is deterministic text and hash inspection.

pub mod model;
pub mod stages;

use std::sync::Arc;

use crate::audit::SharedAuditSink;
use crate::error::{IntegrityViolation, StageFault};
use crate::pipeline::runner::{PipelineExecutionResult, PipelineRunner, StageObserver};

use model::{BlueprintRequest, BlueprintState, BuilderOutput, BuilderPlan, HandoverPackage, InterpretedContext, PlanStep};

pub const GOVERNANCE_PRE_CHECK: &str = "governance-pre-check";
pub const ARCHITECTURE_INTERPRET: &str = "architecture-interpret";
pub const GOVERNANCE_PLANNING: &str = "governance-planning";
pub const CODE_GENERATION: &str = "code-generation";
pub const SELF_REVIEW: &str = "self-review";
pub const HANDOVER: &str = "handover";

pub const PIPELINE_NAME: &str = "blueprint";

/// Turns an interpreted architecture into a build plan.
pub trait PlanSynthesizer: Send + Sync {
    fn synthesize(&self, request: &BlueprintRequest, context: &InterpretedContext) -> Result<BuilderPlan, StageFault>;
}

/// Produces source and test artifacts for a plan.
pub trait ArtifactGenerator: Send + Sync {
    fn generate(&self, request: &BlueprintRequest, plan: &BuilderPlan) -> Result<BuilderOutput, StageFault>;
}

impl<F> ArtifactGenerator for F
where
    F: Fn(&BlueprintRequest, &BuilderPlan) -> Result<BuilderOutput, StageFault> + Send + Sync,
{
    fn generate(&self, request: &BlueprintRequest, plan: &BuilderPlan) -> Result<BuilderOutput, StageFault> {
        self(request, plan)
    }
}

/// One implementation step and one test per architecture component, placed
/// at the component's declared location.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicPlanSynthesizer;

impl PlanSynthesizer for DeterministicPlanSynthesizer {
    fn synthesize(&self, request: &BlueprintRequest, context: &InterpretedContext) -> Result<BuilderPlan, StageFault> {
        let mut steps: Vec<PlanStep> = context
            .components
            .iter()
            .map(|name| PlanStep {
                description: format!("Implement {name} with strict types"),
                component: Some(name.clone()),
                location: context.locations.get(name).cloned(),
            })
            .collect();
        if steps.is_empty() && !request.description.is_empty() {
            steps.push(PlanStep {
                description: request.description.clone(),
                component: None,
                location: None,
            });
        }

        Ok(BuilderPlan {
            tests: context.components.iter().map(|name| format!("test {name}")).collect(),
            steps,
            coverage: 100,
            strict_typing: true,
        })
    }
}

/// Returns the same output for every plan.
#[derive(Debug, Clone, Default)]
pub struct StaticArtifactGenerator {
    output: BuilderOutput,
}

impl StaticArtifactGenerator {
    pub fn new(output: BuilderOutput) -> Self {
        Self { output }
    }
}

impl ArtifactGenerator for StaticArtifactGenerator {
    fn generate(&self, _request: &BlueprintRequest, _plan: &BuilderPlan) -> Result<BuilderOutput, StageFault> {
        Ok(self.output.clone())
    }
}

#[derive(Debug, Clone)]
pub struct BlueprintOutcome {
    pub result: PipelineExecutionResult,
    /// Present only when every stage passed
    pub handover: Option<HandoverPackage>,
    pub integrity_violations: Vec<IntegrityViolation>,
}

impl BlueprintOutcome {
    pub fn passed(&self) -> bool {
        self.result.passed
    }
}

pub struct Blueprint {
    runner: PipelineRunner<BlueprintState>,
}

impl Blueprint {
    pub fn new(
        synthesizer: Arc<dyn PlanSynthesizer>,
        generator: Arc<dyn ArtifactGenerator>,
        audit: SharedAuditSink,
    ) -> Self {
        let runner = PipelineRunner::new(PIPELINE_NAME, audit)
            .with_stage(stages::GovernancePreCheck)
            .with_stage(stages::ArchitectureInterpret)
            .with_stage(stages::GovernancePlanning { synthesizer })
            .with_stage(stages::CodeGeneration { generator })
            .with_stage(stages::SelfReview)
            .with_stage(stages::Handover);
        Self { runner }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StageObserver>) {
        self.runner.add_observer(observer);
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.runner.stage_names()
    }

    /// Run all six stages for one task. The audit entry is keyed by task id.
    pub fn execute(&self, request: BlueprintRequest) -> BlueprintOutcome {
        let task_id = request.task_id.clone();
        let mut state = BlueprintState::new(request);
        let result = self.runner.run(&task_id, &mut state);

        if !state.integrity_violations.is_empty() {
            tracing::error!(
                task_id = %task_id,
                violations = state.integrity_violations.len(),
                "Blueprint detected integrity violations"
            );
        }

        BlueprintOutcome {
            handover: if result.passed { state.handover } else { None },
            integrity_violations: state.integrity_violations,
            result,
        }
    }
}
