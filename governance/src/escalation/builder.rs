//! Builder-domain policy: task-type affinity from the loaded table.

use serde::{Deserialize, Serialize};

use crate::escalation::selector::{HardBlock, Recommendation, TierPolicy};
use crate::tiers::TierTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderComplexity {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for BuilderComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A build task handed to a builder agent.
///
/// `task_type` is free-form (`docs`, `crud`, `refactor`, ...); its tier comes
/// from the table's task-type affinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderTaskDescriptor {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub complexity: BuilderComplexity,
    #[serde(default)]
    pub is_architecture_task: bool,
    #[serde(default)]
    pub is_governance_task: bool,
    #[serde(default, alias = "requiresRedQA")]
    pub requires_red_qa: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
}

impl BuilderTaskDescriptor {
    pub fn new(task_type: impl Into<String>, complexity: BuilderComplexity) -> Self {
        Self {
            task_type: task_type.into(),
            complexity,
            is_architecture_task: false,
            is_governance_task: false,
            requires_red_qa: false,
            estimated_tokens: None,
        }
    }
}

/// Rule set for builder agents. Has no hard blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuilderPolicy;

impl TierPolicy for BuilderPolicy {
    type Descriptor = BuilderTaskDescriptor;

    fn domain(&self) -> &'static str {
        "builder"
    }

    fn hard_block(&self, _: &str, _: &BuilderTaskDescriptor, _: &TierTable) -> Option<HardBlock> {
        None
    }

    fn recommendations(&self, d: &BuilderTaskDescriptor, table: &TierTable) -> Vec<Recommendation> {
        let mut recs = Vec::new();
        let top = &table.highest().name;

        if d.is_architecture_task {
            recs.push(Recommendation::new(
                "architecture",
                top,
                "Architecture task requires the top tier",
            ));
        }

        if d.is_governance_task && d.requires_red_qa {
            recs.push(Recommendation::new(
                "governance_red_qa",
                top,
                "Governance task with red QA requires the top tier",
            ));
        }

        if let Some(tier) = table.tier_for_task_type(&d.task_type) {
            recs.push(Recommendation::new(
                "task_type_affinity",
                &tier.name,
                format!("Task type '{}' maps to {}", d.task_type, tier.label),
            ));
        }

        if d.complexity == BuilderComplexity::High {
            if let Some(middle) = table.tiers().get(table.len() / 2) {
                recs.push(Recommendation::new(
                    "complexity",
                    &middle.name,
                    format!("Complexity level: {}", d.complexity),
                ));
            }
        }

        recs
    }

    fn is_resource_valid_for_mutation(&self, _resource: &str) -> bool {
        true
    }
}
