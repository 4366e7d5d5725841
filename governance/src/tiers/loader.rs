//! Versioned tier-table documents in JSON or TOML.
//!
//! Loading never fails from the caller's point of view: [`load_or_fallback`]
//! logs the reason and hands back the embedded table instead.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::{EscalationRule, Tier, TierTable};
use crate::error::{GovernanceError, GovernanceResult};

/// Either a single resource or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ResourceBinding {
    One(String),
    Many(Vec<String>),
}

impl ResourceBinding {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(r) => vec![r],
            Self::Many(rs) => rs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TierDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    rank: Option<u8>,
    #[serde(alias = "boundResource", alias = "resources")]
    models: ResourceBinding,
    #[serde(default, alias = "taskTypeAffinity")]
    task_types: Vec<String>,
    #[serde(alias = "retryBudget")]
    max_retries: u32,
    cost_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TierTableDocument {
    #[serde(default = "default_version")]
    version: String,
    tiers: BTreeMap<String, TierDocument>,
    #[serde(default, alias = "escalation_rules")]
    escalation_rules: BTreeMap<String, EscalationRule>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl TierTableDocument {
    /// Tiers without an explicit rank are ordered by cost multiplier, then
    /// by key.
    fn into_table(self) -> GovernanceResult<TierTable> {
        let mut entries: Vec<(String, TierDocument)> = self.tiers.into_iter().collect();
        let explicit = entries.iter().all(|(_, t)| t.rank.is_some());
        if !explicit {
            entries.sort_by(|(ka, a), (kb, b)| {
                a.cost_multiplier
                    .total_cmp(&b.cost_multiplier)
                    .then_with(|| ka.cmp(kb))
            });
        }

        let mut tiers = Vec::with_capacity(entries.len());
        for (position, (key, doc)) in entries.into_iter().enumerate() {
            let rank = match doc.rank {
                Some(rank) if explicit => rank,
                _ => u8::try_from(position).map_err(|_| {
                    GovernanceError::configuration("tier table", "more than 256 tiers")
                })?,
            };
            tiers.push(Tier {
                label: doc.name.unwrap_or_else(|| key.clone()),
                name: key,
                rank,
                resources: doc.models.into_vec(),
                retry_budget: doc.max_retries,
                cost_multiplier: doc.cost_multiplier,
                task_type_affinity: doc.task_types,
            });
        }

        TierTable::new(self.version, tiers, self.escalation_rules)
    }
}

/// Parse a JSON tier-table document.
pub fn from_json_str(raw: &str) -> GovernanceResult<TierTable> {
    let doc: TierTableDocument = serde_json::from_str(raw)?;
    doc.into_table()
}

/// Parse a TOML tier-table document.
pub fn from_toml_str(raw: &str) -> GovernanceResult<TierTable> {
    let doc: TierTableDocument = toml::from_str(raw)?;
    doc.into_table()
}

/// Read and parse a tier table, choosing the format by extension
/// (`.toml` is TOML, anything else is JSON).
pub fn load(path: &Path) -> GovernanceResult<TierTable> {
    let raw = std::fs::read_to_string(path).map_err(|source| GovernanceError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    if is_toml {
        from_toml_str(&raw)
    } else {
        from_json_str(&raw)
    }
}

/// Load a tier table, substituting `fallback` on any failure.
///
/// `None` means nothing was configured and the fallback is used silently.
pub fn load_or_fallback(path: Option<&Path>, fallback: impl FnOnce() -> TierTable) -> TierTable {
    let Some(path) = path else {
        return fallback();
    };

    match load(path) {
        Ok(table) => {
            tracing::info!(
                path = %path.display(),
                version = table.version(),
                tiers = table.len(),
                "Loaded tier table"
            );
            table
        }
        Err(e) => {
            let unavailable = match e {
                GovernanceError::ConfigurationUnavailable { .. } => e,
                other => GovernanceError::configuration(path.display().to_string(), other.to_string()),
            };
            tracing::warn!(
                path = %path.display(),
                "Tier table unavailable, using embedded defaults: {}",
                unavailable
            );
            fallback()
        }
    }
}
