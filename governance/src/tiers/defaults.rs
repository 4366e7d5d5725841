//! Embedded tier tables. Used whenever no external table is configured or
//! the configured one cannot be loaded.

use std::collections::BTreeMap;

use super::{EscalationRule, Tier, TierTable};

pub const DEFAULT_VERSION: &str = "1.0.0";

/// Escalation rule names shared by both domains.
pub mod rules {
    pub const REPEATED_ERRORS: &str = "repeatedErrors";
    pub const INVALID_CODE_GENERATION: &str = "invalidCodeGeneration";
    pub const MISSING_IMPORTS: &str = "missingImports";
    pub const PARTIAL_FILE_REWRITES: &str = "partialFileRewrites";
    pub const QIC_FAILURES: &str = "qicFailures";
    pub const TOKEN_OVERFLOW: &str = "tokenOverflow";
    pub const AMBIGUITY_DETECTED: &str = "ambiguityDetected";
}

fn default_rules() -> BTreeMap<String, EscalationRule> {
    [
        (rules::REPEATED_ERRORS, 2),
        (rules::INVALID_CODE_GENERATION, 1),
        (rules::MISSING_IMPORTS, 2),
        (rules::PARTIAL_FILE_REWRITES, 1),
        (rules::QIC_FAILURES, 1),
        (rules::TOKEN_OVERFLOW, 1),
        (rules::AMBIGUITY_DETECTED, 2),
    ]
    .into_iter()
    .map(|(name, threshold)| (name.to_string(), EscalationRule::escalate_at(threshold)))
    .collect()
}

fn tier(
    name: &str,
    rank: u8,
    label: &str,
    resources: &[&str],
    cost_multiplier: f64,
    affinity: &[&str],
) -> Tier {
    Tier {
        name: name.to_string(),
        rank,
        label: label.to_string(),
        resources: resources.iter().map(|s| s.to_string()).collect(),
        retry_budget: 3,
        cost_multiplier,
        task_type_affinity: affinity.iter().map(|s| s.to_string()).collect(),
    }
}

/// Tiers used by the orchestrator for its own reasoning tasks.
pub fn foreman_tiers() -> Vec<Tier> {
    vec![
        tier("basic", 0, "Basic", &["gpt-4o-mini", "gpt-3.5-turbo"], 1.0, &[]),
        tier("standard", 1, "Standard", &["gpt-4.1", "gpt-4"], 2.0, &[]),
        tier(
            "advanced",
            2,
            "Advanced",
            &["gpt-4.1-turbo", "gpt-4o"],
            5.0,
            &["governance_reasoning", "document_ingestion"],
        ),
        tier(
            "premium",
            3,
            "Premium",
            &["gpt-5.1"],
            10.0,
            &["constitutional_analysis"],
        ),
        tier(
            "ultimate",
            4,
            "Ultimate",
            &["gpt-5.1-large"],
            20.0,
            &["architecture"],
        ),
    ]
}

/// Tiers used for builder agents.
pub fn builder_tiers() -> Vec<Tier> {
    vec![
        tier(
            "T1",
            0,
            "Tier 1 - Lightweight Tasks",
            &["gpt-4o-mini", "claude-haiku"],
            1.0,
            &["docs", "simple-ui", "config-update"],
        ),
        tier(
            "T2",
            1,
            "Tier 2 - Standard Development",
            &["gpt-4o", "claude-sonnet-lite"],
            5.0,
            &["crud", "api-endpoint", "component", "integration"],
        ),
        tier(
            "T3",
            2,
            "Tier 3 - Complex Architecture",
            &["claude-3.5-sonnet"],
            20.0,
            &["architecture", "red-qa", "refactor", "multi-module"],
        ),
    ]
}

/// Deterministic fallback table for the orchestrator domain.
pub fn foreman_table() -> TierTable {
    assemble(foreman_tiers())
}

/// Deterministic fallback table for the builder domain.
pub fn builder_table() -> TierTable {
    assemble(builder_tiers())
}

fn assemble(tiers: Vec<Tier>) -> TierTable {
    let mut tiers = tiers;
    tiers.sort_by_key(|t| t.rank);
    // Hand-checked constants; skip validation so the fallback can never fail.
    TierTable {
        version: DEFAULT_VERSION.to_string(),
        tiers,
        escalation_rules: default_rules(),
    }
}
