//! Process configuration.
//!
//! Layers, later wins: built-in defaults, an optional TOML file, `FOREMAN_*`
//! environment variables, then per-run CLI overrides.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `FOREMAN_TIER_CONFIG` | unset | Foreman-domain tier table (JSON or TOML) |
//! | `FOREMAN_BUILDER_TIER_CONFIG` | unset | Builder-domain tier table (JSON or TOML) |
//! | `FOREMAN_AUDIT_LOG` | unset | JSON-lines audit file; in-memory when unset |
//! | `FOREMAN_LOG_JSON` | `false` | Emit logs as JSON |
//! | `FOREMAN_STRICT_EVIDENCE` | `true` | Refuse gate runs with no evidence artifacts |
//!
//! An unset tier table path means the embedded default table is used.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::drift::DriftThresholds;
use crate::escalation::StruggleThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Env: `FOREMAN_TIER_CONFIG`
    pub foreman_tier_config: Option<PathBuf>,
    /// Env: `FOREMAN_BUILDER_TIER_CONFIG`
    pub builder_tier_config: Option<PathBuf>,
    /// Env: `FOREMAN_AUDIT_LOG`
    pub audit_log: Option<PathBuf>,
    /// Env: `FOREMAN_LOG_JSON`
    pub log_json: bool,
    /// Env: `FOREMAN_STRICT_EVIDENCE`
    pub strict_evidence: bool,
    pub drift: DriftThresholds,
    /// Overrides the thresholds read from the builder tier table's rules
    pub struggle: Option<StruggleThresholds>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            foreman_tier_config: None,
            builder_tier_config: None,
            audit_log: None,
            log_json: false,
            strict_evidence: true,
            drift: DriftThresholds::default(),
            struggle: None,
        }
    }
}

/// Per-run overrides. `None` leaves the configured value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub foreman_tier_config: Option<PathBuf>,
    pub builder_tier_config: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
    pub log_json: Option<bool>,
}

impl GovernanceConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// File (if any), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|var| std::env::var(var).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let path = |var: &str| lookup(var).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        if let Some(p) = path("FOREMAN_TIER_CONFIG") {
            self.foreman_tier_config = Some(p);
        }
        if let Some(p) = path("FOREMAN_BUILDER_TIER_CONFIG") {
            self.builder_tier_config = Some(p);
        }
        if let Some(p) = path("FOREMAN_AUDIT_LOG") {
            self.audit_log = Some(p);
        }
        if let Some(v) = lookup("FOREMAN_LOG_JSON") {
            self.log_json = parse_bool_env_value(&v);
        }
        if let Some(v) = lookup("FOREMAN_STRICT_EVIDENCE") {
            self.strict_evidence = parse_bool_env_value(&v);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(p) = &overrides.foreman_tier_config {
            self.foreman_tier_config = Some(p.clone());
        }
        if let Some(p) = &overrides.builder_tier_config {
            self.builder_tier_config = Some(p.clone());
        }
        if let Some(p) = &overrides.audit_log {
            self.audit_log = Some(p.clone());
        }
        if let Some(v) = overrides.log_json {
            self.log_json = v;
        }
    }
}

/// Accepts "1", "true", or "yes" (case-insensitive).
fn parse_bool_env_value(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "1" || v == "true" || v == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GovernanceConfig::default();
        assert!(config.foreman_tier_config.is_none());
        assert!(config.strict_evidence);
        assert!(!config.log_json);
        assert_eq!(config.drift, DriftThresholds::default());
    }

    #[test]
    fn test_env_layer() {
        let env: HashMap<&str, &str> = [
            ("FOREMAN_TIER_CONFIG", "/etc/foreman/tiers.json"),
            ("FOREMAN_AUDIT_LOG", "  "),
            ("FOREMAN_LOG_JSON", "YES"),
            ("FOREMAN_STRICT_EVIDENCE", "0"),
        ]
        .into_iter()
        .collect();
        let mut config = GovernanceConfig::default();
        config.apply_env_with(|var| env.get(var).map(|v| v.to_string()));

        assert_eq!(config.foreman_tier_config, Some(PathBuf::from("/etc/foreman/tiers.json")));
        assert!(config.audit_log.is_none());
        assert!(config.log_json);
        assert!(!config.strict_evidence);
    }

    #[test]
    fn test_parse_bool_env_value() {
        assert!(parse_bool_env_value("1"));
        assert!(parse_bool_env_value(" True "));
        assert!(!parse_bool_env_value("on"));
        assert!(!parse_bool_env_value(""));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
builder_tier_config = "config/builder-tiers.toml"
strict_evidence = false

[drift]
regressive_min_violation_delta = 5

[struggle]
missing_imports = 3
repeated_errors = 4
"#
        )
        .unwrap();

        let config = GovernanceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.builder_tier_config, Some(PathBuf::from("config/builder-tiers.toml")));
        assert!(!config.strict_evidence);
        assert_eq!(config.drift.regressive_min_violation_delta, 5);
        assert_eq!(config.drift.stable_max_churn, 0.05);
        assert_eq!(config.struggle.unwrap().repeated_errors, 4);
    }

    #[test]
    fn test_file_errors() {
        assert!(matches!(
            GovernanceConfig::from_file("/nonexistent/foreman.toml"),
            Err(ConfigError::Read { .. })
        ));
        assert!(matches!(
            GovernanceConfig::from_toml_str("strict_evidence = \"maybe\"", Path::new("x.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = GovernanceConfig::default();
        config.apply_overrides(&ConfigOverrides {
            audit_log: Some(PathBuf::from("audit.jsonl")),
            log_json: Some(true),
            ..Default::default()
        });
        assert_eq!(config.audit_log, Some(PathBuf::from("audit.jsonl")));
        assert!(config.log_json);
        assert!(config.builder_tier_config.is_none());
    }
}
