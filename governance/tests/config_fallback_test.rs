//! Integration tests for tier-table loading and configuration layering
//!
//! A broken or missing tier table must never take the engines down: the
//! embedded defaults are used instead.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use foreman_governance::audit::MemoryAuditSink;
use foreman_governance::config::GovernanceConfig;
use foreman_governance::context::GovernanceContext;
use foreman_governance::escalation::{AttemptDecision, AttemptLedger};
use foreman_governance::tiers::{defaults, loader};

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn context_with_builder_table(path: PathBuf) -> GovernanceContext {
    let config = GovernanceConfig {
        builder_tier_config: Some(path),
        ..Default::default()
    };
    GovernanceContext::with_audit(config, Arc::new(MemoryAuditSink::new()))
}

/// Test: malformed JSON falls back to the embedded table
#[test]
fn test_malformed_json_falls_back() {
    let file = write_temp(".json", "{ \"tiers\": { \"T1\": ");
    let ctx = context_with_builder_table(file.path().to_path_buf());

    assert_eq!(ctx.builder_table().version(), defaults::DEFAULT_VERSION);
    assert_eq!(ctx.builder_table().len(), 3);
    assert_eq!(ctx.engine().table().lowest().name, "T1");
}

/// Test: malformed TOML falls back too
#[test]
fn test_malformed_toml_falls_back() {
    let file = write_temp(".toml", "[tiers.cheap\nmodels = ");
    let table = loader::load_or_fallback(Some(file.path()), defaults::builder_table);
    assert_eq!(table, defaults::builder_table());
}

/// Test: a table that parses but fails validation is rejected
#[test]
fn test_empty_table_rejected() {
    let file = write_temp(".json", r#"{"version": "9", "tiers": {}}"#);
    assert!(loader::load(file.path()).is_err());
    let table = loader::load_or_fallback(Some(file.path()), defaults::builder_table);
    assert_eq!(table.version(), defaults::DEFAULT_VERSION);
}

/// Test: a valid TOML table replaces the defaults and drives the engine
#[test]
fn test_valid_toml_table_drives_engine() {
    let file = write_temp(
        ".toml",
        r#"
version = "2026.06"

[tiers.small]
models = ["local-7b"]
taskTypes = ["docs"]
maxRetries = 1
costMultiplier = 1.0

[tiers.large]
models = ["remote-xl"]
taskTypes = ["architecture"]
maxRetries = 2
costMultiplier = 12.0

[escalationRules.repeatedErrors]
threshold = 5
action = "escalate"
"#,
    );
    let ctx = context_with_builder_table(file.path().to_path_buf());
    assert_eq!(ctx.builder_table().version(), "2026.06");
    assert_eq!(ctx.builder_table().lowest().name, "small");

    let mut ledger = AttemptLedger::new("task-docs");
    ledger.record_failure("local-7b", "small", "timeout");
    match ctx.engine().decide("small", &ledger) {
        AttemptDecision::Escalate { to, resource, .. } => {
            assert_eq!(to, "large");
            assert_eq!(resource, "remote-xl");
        }
        other => panic!("expected escalation, got {other:?}"),
    }
}

/// Test: a TOML configuration file wires tier tables and audit output
#[test]
fn test_config_file_layer() {
    let dir = tempfile::tempdir().unwrap();
    let audit = dir.path().join("audit.jsonl");
    let config_file = write_temp(
        ".toml",
        &format!(
            "audit_log = {:?}\nbuilder_tier_config = \"/nonexistent/tiers.json\"\n\n[drift]\nstable_max_churn = 0.1\n",
            audit.display().to_string()
        ),
    );

    let config = GovernanceConfig::from_file(config_file.path()).unwrap();
    assert_eq!(config.audit_log.as_deref(), Some(audit.as_path()));
    assert_eq!(config.drift.stable_max_churn, 0.1);
    assert!(config.strict_evidence);

    let ctx = GovernanceContext::from_config(config).unwrap();
    assert_eq!(ctx.builder_table().version(), defaults::DEFAULT_VERSION);
    assert_eq!(ctx.drift_classifier().thresholds().stable_max_churn, 0.1);
}
