//! Tiered selector, generic over a policy domain.
//!
//! A [`TierPolicy`] contributes two things for its descriptor type: an
//! optional hard block, and an ordered list of minimum-tier recommendations.
//! The selector owns everything else: rank comparison, the first-strictly-
//! higher-wins rule, cost and path bookkeeping.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{PolicyDenial, Severity};
use crate::tiers::{Tier, TierTable};

/// A rule refusing the current resource outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardBlock {
    pub rule: &'static str,
    pub reason: String,
    /// Tier to move to instead
    pub safe_tier: String,
}

/// A rule's minimum-tier demand, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub rule: &'static str,
    pub tier: String,
    pub justification: String,
}

impl Recommendation {
    pub fn new(rule: &'static str, tier: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            rule,
            tier: tier.into(),
            justification: justification.into(),
        }
    }
}

/// Domain-specific classification rules.
pub trait TierPolicy: Send + Sync {
    type Descriptor;

    /// Policy domain name, used in logs and audit entries.
    fn domain(&self) -> &'static str;

    fn hard_block(
        &self,
        current_resource: &str,
        descriptor: &Self::Descriptor,
        table: &TierTable,
    ) -> Option<HardBlock>;

    /// Recommendations in strict precedence order. Only matching rules are
    /// returned.
    fn recommendations(&self, descriptor: &Self::Descriptor, table: &TierTable) -> Vec<Recommendation>;

    /// Whether `resource` may be used for mutating work.
    fn is_resource_valid_for_mutation(&self, resource: &str) -> bool;
}

/// Result of evaluating a descriptor against a current binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tier: Option<String>,
    pub current_resource: String,
    pub recommended_tier: Option<String>,
    pub recommended_resource: String,
    pub should_escalate: bool,
    pub justification: String,
    /// Rule that produced the recommendation, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

impl EscalationDecision {
    pub fn allowed(&self) -> bool {
        !self.blocked
    }

    /// The denial carried by a blocked decision.
    pub fn denial(&self) -> Option<PolicyDenial> {
        if !self.blocked {
            return None;
        }
        Some(PolicyDenial::new(
            "MUTATION_BLOCKED",
            self.block_reason.clone().unwrap_or_else(|| self.justification.clone()),
            Severity::High,
        ))
    }
}

/// Binding chosen for a fresh task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSelection {
    pub tier: String,
    pub resource: String,
    pub justification: String,
    pub retry_budget: u32,
    pub escalation_path: Vec<String>,
    pub estimated_cost: f64,
    pub blocked: bool,
}

pub struct TieredSelector<P: TierPolicy> {
    table: Arc<TierTable>,
    policy: P,
}

impl<P: TierPolicy> TieredSelector<P> {
    pub fn new(table: Arc<TierTable>, policy: P) -> Self {
        Self { table, policy }
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Evaluate a descriptor against the resource currently bound.
    pub fn evaluate(&self, current_resource: &str, descriptor: &P::Descriptor) -> EscalationDecision {
        let table = self.table.as_ref();
        let current = table.tier_for_resource(current_resource);

        if let Some(block) = self.policy.hard_block(current_resource, descriptor, table) {
            let safe = table.get(&block.safe_tier);
            let should_escalate = match (current, safe) {
                (Some(c), Some(s)) => s.rank > c.rank,
                (None, Some(_)) => true,
                _ => false,
            };
            tracing::warn!(
                domain = self.policy.domain(),
                resource = current_resource,
                rule = block.rule,
                "Resource blocked: {}",
                block.reason
            );
            return EscalationDecision {
                current_tier: current.map(|t| t.name.clone()),
                current_resource: current_resource.to_string(),
                recommended_tier: safe.map(|t| t.name.clone()),
                recommended_resource: safe
                    .map(|t| t.primary_resource().to_string())
                    .unwrap_or_default(),
                should_escalate,
                justification: block.reason.clone(),
                rule: Some(block.rule.to_string()),
                blocked: true,
                block_reason: Some(block.reason),
            };
        }

        let Some(current) = current else {
            tracing::debug!(
                domain = self.policy.domain(),
                resource = current_resource,
                "Unknown resource, retaining binding"
            );
            return self.retain(None, current_resource, format!("Unknown resource '{current_resource}'; binding retained"));
        };

        for rec in self.policy.recommendations(descriptor, table) {
            let Some(target) = table.get(&rec.tier) else {
                tracing::debug!(
                    domain = self.policy.domain(),
                    rule = rec.rule,
                    tier = %rec.tier,
                    "Recommended tier not in table, skipping rule"
                );
                continue;
            };
            if target.rank > current.rank {
                tracing::info!(
                    domain = self.policy.domain(),
                    from = %current.name,
                    to = %target.name,
                    rule = rec.rule,
                    "Escalation recommended"
                );
                return EscalationDecision {
                    current_tier: Some(current.name.clone()),
                    current_resource: current_resource.to_string(),
                    recommended_tier: Some(target.name.clone()),
                    recommended_resource: target.primary_resource().to_string(),
                    should_escalate: true,
                    justification: rec.justification,
                    rule: Some(rec.rule.to_string()),
                    blocked: false,
                    block_reason: None,
                };
            }
        }

        self.retain(Some(current), current_resource, "Current resource is adequate for task".to_string())
    }

    fn retain(&self, current: Option<&Tier>, resource: &str, justification: String) -> EscalationDecision {
        EscalationDecision {
            current_tier: current.map(|t| t.name.clone()),
            current_resource: resource.to_string(),
            recommended_tier: current.map(|t| t.name.clone()),
            recommended_resource: resource.to_string(),
            should_escalate: false,
            justification,
            rule: None,
            blocked: false,
            block_reason: None,
        }
    }

    /// Choose a binding for a fresh task, starting from the lowest tier.
    pub fn select_tier(&self, descriptor: &P::Descriptor) -> TierSelection {
        let table = self.table.as_ref();
        let lowest = table.lowest();
        let decision = self.evaluate(lowest.primary_resource(), descriptor);

        let tier = decision
            .recommended_tier
            .as_deref()
            .and_then(|name| table.get(name))
            .unwrap_or(lowest);
        let resource = if decision.recommended_resource.is_empty() {
            tier.primary_resource().to_string()
        } else {
            decision.recommended_resource.clone()
        };

        let selection = TierSelection {
            tier: tier.name.clone(),
            resource,
            justification: decision.justification,
            retry_budget: tier.retry_budget,
            escalation_path: table.escalation_path(&tier.name),
            estimated_cost: table.estimated_cost(&tier.name),
            blocked: decision.blocked,
        };

        tracing::info!(
            domain = self.policy.domain(),
            tier = %selection.tier,
            resource = %selection.resource,
            "Tier selected"
        );
        selection
    }

    /// One rank up, `None` at the top.
    pub fn escalate(&self, current_tier: &str) -> Option<&Tier> {
        self.table.next_above(current_tier)
    }

    /// One rank down, `None` at the bottom.
    pub fn de_escalate(&self, current_tier: &str) -> Option<&Tier> {
        self.table.next_below(current_tier)
    }

    pub fn is_resource_valid_for_mutation(&self, resource: &str) -> bool {
        self.policy.is_resource_valid_for_mutation(resource)
    }

    pub fn resources_in_tier(&self, tier: &str) -> Vec<String> {
        self.table
            .get(tier)
            .map(|t| t.resources.clone())
            .unwrap_or_default()
    }
}
