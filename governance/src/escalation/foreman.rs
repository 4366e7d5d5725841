//! Orchestrator-domain policy: the five-tier `basic`..`ultimate` ladder.

use serde::{Deserialize, Serialize};

use crate::escalation::selector::{HardBlock, Recommendation, TierPolicy};
use crate::tiers::TierTable;

/// Token volume above which a task needs the very-complex minimum tier.
pub const VERY_COMPLEX_TOKEN_THRESHOLD: u64 = 60_000;
/// Token volume above which a task needs the complex minimum tier.
pub const COMPLEX_TOKEN_THRESHOLD: u64 = 8_000;
/// Document ingestion above this size needs the advanced tier.
pub const LARGE_DOCUMENT_TOKEN_THRESHOLD: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Architecture,
    CodeGeneration,
    DocumentIngestion,
    GovernanceReasoning,
    ConstitutionalAnalysis,
    Mutation,
    Review,
    Planning,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Architecture => write!(f, "architecture"),
            Self::CodeGeneration => write!(f, "code_generation"),
            Self::DocumentIngestion => write!(f, "document_ingestion"),
            Self::GovernanceReasoning => write!(f, "governance_reasoning"),
            Self::ConstitutionalAnalysis => write!(f, "constitutional_analysis"),
            Self::Mutation => write!(f, "mutation"),
            Self::Review => write!(f, "review"),
            Self::Planning => write!(f, "planning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
    Architectural,
}

impl std::fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
            Self::VeryComplex => write!(f, "very_complex"),
            Self::Architectural => write!(f, "architectural"),
        }
    }
}

/// What the dispatcher knows about a task before it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub complexity: TaskComplexity,
    #[serde(default, alias = "estimatedTokens")]
    pub token_count: u64,
    #[serde(default)]
    pub requires_architecture: bool,
    #[serde(default)]
    pub requires_governance: bool,
    #[serde(default)]
    pub is_mutation: bool,
    #[serde(default)]
    pub description: String,
}

impl TaskDescriptor {
    pub fn new(task_type: TaskType, complexity: TaskComplexity, token_count: u64) -> Self {
        Self {
            task_type,
            complexity,
            token_count,
            requires_architecture: false,
            requires_governance: false,
            is_mutation: false,
            description: String::new(),
        }
    }

    pub fn mutation(mut self) -> Self {
        self.is_mutation = true;
        self
    }

    pub fn requiring_architecture(mut self) -> Self {
        self.requires_architecture = true;
        self
    }

    pub fn requiring_governance(mut self) -> Self {
        self.requires_governance = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Rule set for the orchestrator's own reasoning tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForemanPolicy {
    /// Resources known to hallucinate on mutating work
    pub hallucination_prone: Vec<String>,
    /// Tier recommended when a mutation is blocked
    pub mutation_safe_tier: String,
    pub very_complex_tier: String,
    pub complex_tier: String,
    pub architecture_tier: String,
    pub governance_tier: String,
    pub constitutional_tier: String,
    pub large_document_tier: String,
}

impl Default for ForemanPolicy {
    fn default() -> Self {
        Self {
            hallucination_prone: vec!["gpt-3.5-turbo".to_string()],
            mutation_safe_tier: "standard".to_string(),
            very_complex_tier: "premium".to_string(),
            complex_tier: "advanced".to_string(),
            architecture_tier: "ultimate".to_string(),
            governance_tier: "advanced".to_string(),
            constitutional_tier: "premium".to_string(),
            large_document_tier: "advanced".to_string(),
        }
    }
}

impl ForemanPolicy {
    pub fn complexity_tier(&self, complexity: TaskComplexity) -> &str {
        match complexity {
            TaskComplexity::Simple | TaskComplexity::Moderate => &self.mutation_safe_tier,
            TaskComplexity::Complex => &self.complex_tier,
            TaskComplexity::VeryComplex => &self.very_complex_tier,
            TaskComplexity::Architectural => &self.architecture_tier,
        }
    }
}

impl TierPolicy for ForemanPolicy {
    type Descriptor = TaskDescriptor;

    fn domain(&self) -> &'static str {
        "foreman"
    }

    fn hard_block(&self, current_resource: &str, descriptor: &TaskDescriptor, _table: &TierTable) -> Option<HardBlock> {
        if descriptor.is_mutation && !self.is_resource_valid_for_mutation(current_resource) {
            return Some(HardBlock {
                rule: "mutation_hard_block",
                reason: format!(
                    "{current_resource} is not permitted for mutation operations due to hallucination risk"
                ),
                safe_tier: self.mutation_safe_tier.clone(),
            });
        }
        None
    }

    fn recommendations(&self, d: &TaskDescriptor, _table: &TierTable) -> Vec<Recommendation> {
        let mut recs = Vec::new();

        if d.token_count > VERY_COMPLEX_TOKEN_THRESHOLD {
            recs.push(Recommendation::new(
                "token_volume",
                &self.very_complex_tier,
                format!("Token count ({}) exceeds very-complex threshold", d.token_count),
            ));
        } else if d.token_count > COMPLEX_TOKEN_THRESHOLD {
            recs.push(Recommendation::new(
                "token_volume",
                &self.complex_tier,
                format!("Token count ({}) exceeds complex threshold", d.token_count),
            ));
        }

        if d.task_type == TaskType::Architecture || d.requires_architecture {
            recs.push(Recommendation::new(
                "architecture",
                &self.architecture_tier,
                "Architecture tasks require the most capable tier",
            ));
        }

        if d.task_type == TaskType::GovernanceReasoning || d.requires_governance {
            recs.push(Recommendation::new(
                "governance_reasoning",
                &self.governance_tier,
                "Governance reasoning requires enhanced capabilities",
            ));
        }

        if d.task_type == TaskType::ConstitutionalAnalysis {
            recs.push(Recommendation::new(
                "constitutional_analysis",
                &self.constitutional_tier,
                "Constitutional analysis requires deep reasoning",
            ));
        }

        if d.task_type == TaskType::DocumentIngestion && d.token_count > LARGE_DOCUMENT_TOKEN_THRESHOLD {
            recs.push(Recommendation::new(
                "document_ingestion",
                &self.large_document_tier,
                "Large document ingestion requires extended context",
            ));
        }

        recs.push(Recommendation::new(
            "complexity",
            self.complexity_tier(d.complexity),
            format!("Task complexity ({}) requires a higher tier", d.complexity),
        ));

        recs
    }

    fn is_resource_valid_for_mutation(&self, resource: &str) -> bool {
        !self.hallucination_prone.iter().any(|r| r == resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::selector::TieredSelector;
    use crate::tiers::defaults;
    use std::sync::Arc;

    fn selector() -> TieredSelector<ForemanPolicy> {
        TieredSelector::new(Arc::new(defaults::foreman_table()), ForemanPolicy::default())
    }

    #[test]
    fn test_architecture_beats_complexity() {
        let d = TaskDescriptor::new(TaskType::Architecture, TaskComplexity::Simple, 500);
        let decision = selector().evaluate("gpt-4o-mini", &d);
        assert!(decision.should_escalate);
        assert_eq!(decision.recommended_tier.as_deref(), Some("ultimate"));
        assert_eq!(decision.recommended_resource, "gpt-5.1-large");
        assert_eq!(decision.rule.as_deref(), Some("architecture"));
    }

    #[test]
    fn test_mutation_block_ignores_everything_else() {
        for (complexity, tokens) in [
            (TaskComplexity::Simple, 10),
            (TaskComplexity::Architectural, 100_000),
            (TaskComplexity::VeryComplex, 9_000),
        ] {
            let d = TaskDescriptor::new(TaskType::Mutation, complexity, tokens).mutation();
            let decision = selector().evaluate("gpt-3.5-turbo", &d);
            assert!(decision.blocked);
            assert_eq!(decision.recommended_resource, "gpt-4.1");
            assert!(decision.should_escalate);
        }
    }

    #[test]
    fn test_token_breakpoints() {
        let s = selector();
        let d = TaskDescriptor::new(TaskType::CodeGeneration, TaskComplexity::Simple, 60_001);
        assert_eq!(s.evaluate("gpt-4o-mini", &d).recommended_tier.as_deref(), Some("premium"));

        let d = TaskDescriptor::new(TaskType::CodeGeneration, TaskComplexity::Simple, 8_001);
        assert_eq!(s.evaluate("gpt-4o-mini", &d).recommended_tier.as_deref(), Some("advanced"));

        // Exactly on the breakpoint does not trigger it.
        let d = TaskDescriptor::new(TaskType::CodeGeneration, TaskComplexity::Simple, 8_000);
        let decision = s.evaluate("gpt-4o-mini", &d);
        assert_eq!(decision.rule.as_deref(), Some("complexity"));
        assert_eq!(decision.recommended_tier.as_deref(), Some("standard"));
    }

    #[test]
    fn test_large_document_ingestion() {
        let s = selector();
        let d = TaskDescriptor::new(TaskType::DocumentIngestion, TaskComplexity::Simple, 10_001);
        // The complex-token rule does not apply below 8000; here it does and wins first.
        assert_eq!(s.evaluate("gpt-4.1", &d).rule.as_deref(), Some("token_volume"));

        let d = TaskDescriptor::new(TaskType::DocumentIngestion, TaskComplexity::Simple, 5_000);
        assert!(!s.evaluate("gpt-4.1", &d).should_escalate);
    }

    #[test]
    fn test_governance_flag() {
        let d = TaskDescriptor::new(TaskType::Review, TaskComplexity::Simple, 100).requiring_governance();
        let decision = selector().evaluate("gpt-4.1", &d);
        assert_eq!(decision.rule.as_deref(), Some("governance_reasoning"));
        assert_eq!(decision.recommended_tier.as_deref(), Some("advanced"));
    }

    #[test]
    fn test_adequate_resource_retained() {
        let d = TaskDescriptor::new(TaskType::ConstitutionalAnalysis, TaskComplexity::Moderate, 100);
        let decision = selector().evaluate("gpt-5.1", &d);
        assert!(!decision.should_escalate);
        assert_eq!(decision.justification, "Current resource is adequate for task");
    }

    #[test]
    fn test_mutation_validity() {
        let p = ForemanPolicy::default();
        assert!(!p.is_resource_valid_for_mutation("gpt-3.5-turbo"));
        assert!(p.is_resource_valid_for_mutation("gpt-4.1"));
    }

    #[test]
    fn test_descriptor_json() {
        let d: TaskDescriptor = serde_json::from_str(
            r#"{"type":"architecture","complexity":"simple","tokenCount":500,"isMutation":false}"#,
        )
        .unwrap();
        assert_eq!(d.task_type, TaskType::Architecture);
        assert!(!d.requires_governance);
    }
}
