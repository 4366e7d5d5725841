//! Tier Table: named capability tiers in a strict total order.
//!
//! ```text
//!   rank 0          rank 1          rank 2
//!  ┌──────┐  up   ┌──────┐  up   ┌──────┐
//!  │  T1  │ ────▶ │  T2  │ ────▶ │  T3  │ ──▶ None (top)
//!  └──────┘ ◀──── └──────┘ ◀──── └──────┘
//!            down            down
//! ```
//!
//! Each tier binds one or more resource identifiers, a retry budget and a
//! cost multiplier. Tables are loaded once at startup (see [`loader`]) and
//! are read-only afterwards; share them with `Arc<TierTable>`.

pub mod defaults;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{GovernanceError, GovernanceResult};

/// Cost of one request at multiplier 1.0.
pub const BASE_COST_UNIT: f64 = 0.01;

/// One capability tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Identifier used for lookups (`T1`, `standard`, ...)
    pub name: String,
    /// Position in the total order, 0 is the cheapest
    pub rank: u8,
    /// Human-readable label
    pub label: String,
    /// Bound resource identifiers, primary first
    pub resources: Vec<String>,
    pub retry_budget: u32,
    pub cost_multiplier: f64,
    /// Task types this tier is the natural home for
    pub task_type_affinity: Vec<String>,
}

impl Tier {
    /// The resource a fresh selection binds to.
    pub fn primary_resource(&self) -> &str {
        self.resources.first().map(String::as_str).unwrap_or_default()
    }

    pub fn binds(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == resource)
    }

    pub fn has_affinity(&self, task_type: &str) -> bool {
        self.task_type_affinity.iter().any(|t| t == task_type)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// What a rule does once its threshold is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Escalate,
    Retry,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub threshold: u32,
    pub action: RuleAction,
}

impl EscalationRule {
    pub fn escalate_at(threshold: u32) -> Self {
        Self {
            threshold,
            action: RuleAction::Escalate,
        }
    }
}

/// Validated, rank-ordered set of tiers plus the escalation rules that came
/// with them.
///
/// Construction goes through [`TierTable::new`], which guarantees the table
/// is non-empty with unique names and ranks. Deserialization is routed
/// through it as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TierTableParts")]
pub struct TierTable {
    version: String,
    tiers: Vec<Tier>,
    escalation_rules: BTreeMap<String, EscalationRule>,
}

/// Unvalidated serialized form of a [`TierTable`].
#[derive(Deserialize)]
struct TierTableParts {
    version: String,
    tiers: Vec<Tier>,
    #[serde(default)]
    escalation_rules: BTreeMap<String, EscalationRule>,
}

impl TryFrom<TierTableParts> for TierTable {
    type Error = GovernanceError;

    fn try_from(parts: TierTableParts) -> GovernanceResult<Self> {
        Self::new(parts.version, parts.tiers, parts.escalation_rules)
    }
}

impl TierTable {
    /// Validate and sort tiers by rank.
    pub fn new(
        version: impl Into<String>,
        mut tiers: Vec<Tier>,
        escalation_rules: BTreeMap<String, EscalationRule>,
    ) -> GovernanceResult<Self> {
        let version = version.into();
        let source = format!("tier table v{version}");

        if tiers.is_empty() {
            return Err(GovernanceError::configuration(source, "no tiers defined"));
        }

        let mut names = HashSet::new();
        let mut ranks = HashSet::new();
        for tier in &tiers {
            if !names.insert(tier.name.as_str()) {
                return Err(GovernanceError::configuration(
                    source,
                    format!("duplicate tier name '{}'", tier.name),
                ));
            }
            if !ranks.insert(tier.rank) {
                return Err(GovernanceError::configuration(
                    source,
                    format!("duplicate rank {} on tier '{}'", tier.rank, tier.name),
                ));
            }
            if tier.resources.is_empty() {
                return Err(GovernanceError::configuration(
                    source,
                    format!("tier '{}' has no bound resource", tier.name),
                ));
            }
            if tier.retry_budget == 0 {
                return Err(GovernanceError::configuration(
                    source,
                    format!("tier '{}' has a zero retry budget", tier.name),
                ));
            }
            if tier.cost_multiplier.is_nan() || tier.cost_multiplier <= 0.0 {
                return Err(GovernanceError::configuration(
                    source,
                    format!("tier '{}' has a non-positive cost multiplier", tier.name),
                ));
            }
        }

        tiers.sort_by_key(|t| t.rank);

        Ok(Self {
            version,
            tiers,
            escalation_rules,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// All tiers, lowest rank first.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    // `tiers` is non-empty and rank-sorted for every constructed table.
    pub fn lowest(&self) -> &Tier {
        &self.tiers[0]
    }

    pub fn highest(&self) -> &Tier {
        &self.tiers[self.tiers.len() - 1]
    }

    pub fn get(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.name == name)
    }

    /// The lowest tier a resource is bound to.
    pub fn tier_for_resource(&self, resource: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.binds(resource))
    }

    /// One rank up. `None` at the top or for an unknown tier.
    pub fn next_above(&self, name: &str) -> Option<&Tier> {
        let idx = self.position(name)?;
        self.tiers.get(idx + 1)
    }

    /// One rank down. `None` at the bottom or for an unknown tier.
    pub fn next_below(&self, name: &str) -> Option<&Tier> {
        let idx = self.position(name)?;
        idx.checked_sub(1).and_then(|i| self.tiers.get(i))
    }

    /// Tier names from `from` up to the top, inclusive.
    pub fn escalation_path(&self, from: &str) -> Vec<String> {
        match self.position(from) {
            Some(idx) => self.tiers[idx..].iter().map(|t| t.name.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Estimated cost of one request at this tier. Zero for an unknown tier.
    pub fn estimated_cost(&self, name: &str) -> f64 {
        self.get(name)
            .map(|t| BASE_COST_UNIT * t.cost_multiplier)
            .unwrap_or(0.0)
    }

    pub fn primary_resource(&self, name: &str) -> Option<&str> {
        self.get(name).map(Tier::primary_resource)
    }

    /// Highest tier listing `task_type` in its affinity.
    pub fn tier_for_task_type(&self, task_type: &str) -> Option<&Tier> {
        self.tiers.iter().rev().find(|t| t.has_affinity(task_type))
    }

    pub fn rule(&self, name: &str) -> Option<&EscalationRule> {
        self.escalation_rules.get(name)
    }

    pub fn escalation_rules(&self) -> &BTreeMap<String, EscalationRule> {
        &self.escalation_rules
    }

    /// Threshold of an escalating rule, or `default` when the rule is absent
    /// or configured not to escalate.
    pub fn escalation_threshold(&self, rule: &str, default: u32) -> u32 {
        match self.rule(rule) {
            Some(r) if r.action == RuleAction::Escalate => r.threshold.max(1),
            _ => default,
        }
    }
}
