//! Engines wired together once at startup.
//!
//! Built from a [`GovernanceConfig`] and passed by reference. There are no
//! module-level engine instances anywhere in the crate.

use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::{JsonlAuditSink, NullAuditSink, SharedAuditSink};
use crate::config::GovernanceConfig;
use crate::drift::DriftClassifier;
use crate::error::GovernanceResult;
use crate::escalation::{BuilderPolicy, EscalationEngine, ForemanPolicy, StruggleDetector, TieredSelector};
use crate::pipeline::blueprint::{ArtifactGenerator, Blueprint, PlanSynthesizer};
use crate::pipeline::evidence::{EvidenceStore, HashingEvidenceStore};
use crate::pipeline::gate::Gate;
use crate::tiers::{defaults, loader, TierTable};

pub struct GovernanceContext {
    config: GovernanceConfig,
    foreman_table: Arc<TierTable>,
    builder_table: Arc<TierTable>,
    foreman: TieredSelector<ForemanPolicy>,
    builder: TieredSelector<BuilderPolicy>,
    engine: EscalationEngine,
    audit: SharedAuditSink,
    evidence: Arc<dyn EvidenceStore>,
    drift: DriftClassifier,
}

impl GovernanceContext {
    /// Audit entries go to the configured JSON-lines file, or nowhere.
    pub fn from_config(config: GovernanceConfig) -> GovernanceResult<Self> {
        let audit: SharedAuditSink = match &config.audit_log {
            Some(path) => {
                info!(path = %path.display(), "Audit log opened");
                Arc::new(JsonlAuditSink::open(path)?)
            }
            None => {
                debug!("No audit log configured, audit entries are discarded");
                Arc::new(NullAuditSink)
            }
        };
        Ok(Self::with_audit(config, audit))
    }

    /// Build with an explicit audit sink. Tier tables that fail to load fall
    /// back to the embedded defaults.
    pub fn with_audit(config: GovernanceConfig, audit: SharedAuditSink) -> Self {
        let foreman_table = Arc::new(loader::load_or_fallback(
            config.foreman_tier_config.as_deref(),
            defaults::foreman_table,
        ));
        let builder_table = Arc::new(loader::load_or_fallback(
            config.builder_tier_config.as_deref(),
            defaults::builder_table,
        ));

        let mut engine = EscalationEngine::new(Arc::clone(&builder_table), Arc::clone(&audit));
        if let Some(thresholds) = config.struggle {
            engine = engine.with_detector(StruggleDetector::with_thresholds(thresholds));
        }

        let evidence: Arc<dyn EvidenceStore> = if config.strict_evidence {
            Arc::new(HashingEvidenceStore::strict())
        } else {
            Arc::new(HashingEvidenceStore::new())
        };

        info!(
            foreman_tiers = foreman_table.len(),
            foreman_version = %foreman_table.version(),
            builder_tiers = builder_table.len(),
            builder_version = %builder_table.version(),
            strict_evidence = config.strict_evidence,
            "Governance context ready"
        );

        Self {
            foreman: TieredSelector::new(Arc::clone(&foreman_table), ForemanPolicy::default()),
            builder: TieredSelector::new(Arc::clone(&builder_table), BuilderPolicy),
            drift: DriftClassifier::with_thresholds(config.drift.clone()),
            foreman_table,
            builder_table,
            engine,
            audit,
            evidence,
            config,
        }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn foreman_table(&self) -> &Arc<TierTable> {
        &self.foreman_table
    }

    pub fn builder_table(&self) -> &Arc<TierTable> {
        &self.builder_table
    }

    pub fn foreman_selector(&self) -> &TieredSelector<ForemanPolicy> {
        &self.foreman
    }

    pub fn builder_selector(&self) -> &TieredSelector<BuilderPolicy> {
        &self.builder
    }

    /// Drives builder-domain retries and escalations.
    pub fn engine(&self) -> &EscalationEngine {
        &self.engine
    }

    pub fn audit(&self) -> &SharedAuditSink {
        &self.audit
    }

    pub fn drift_classifier(&self) -> &DriftClassifier {
        &self.drift
    }

    pub fn blueprint(&self, synthesizer: Arc<dyn PlanSynthesizer>, generator: Arc<dyn ArtifactGenerator>) -> Blueprint {
        Blueprint::new(synthesizer, generator, Arc::clone(&self.audit))
    }

    pub fn gate(&self) -> Gate {
        Gate::new(Arc::clone(&self.evidence), Arc::clone(&self.audit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{kinds, MemoryAuditSink};
    use crate::escalation::StruggleThresholds;
    use crate::pipeline::gate::MergeCandidate;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_without_config_files() {
        let ctx = GovernanceContext::with_audit(GovernanceConfig::default(), Arc::new(MemoryAuditSink::new()));
        assert_eq!(ctx.foreman_table().len(), 5);
        assert_eq!(ctx.builder_table().len(), 3);
        assert_eq!(ctx.foreman_selector().table().lowest().name, "basic");
        assert_eq!(ctx.engine().table().highest().name, "T3");
    }

    #[test]
    fn test_missing_tier_file_falls_back() {
        let config = GovernanceConfig {
            builder_tier_config: Some(PathBuf::from("/nonexistent/tiers.json")),
            ..Default::default()
        };
        let ctx = GovernanceContext::with_audit(config, Arc::new(MemoryAuditSink::new()));
        assert_eq!(ctx.builder_table().version(), defaults::DEFAULT_VERSION);
        assert_eq!(ctx.builder_table().lowest().name, "T1");
    }

    #[test]
    fn test_struggle_override_survives() {
        let config = GovernanceConfig {
            struggle: Some(StruggleThresholds {
                missing_imports: 5,
                repeated_errors: 5,
            }),
            ..Default::default()
        };
        let ctx = GovernanceContext::with_audit(config, Arc::new(MemoryAuditSink::new()));
        assert_eq!(ctx.engine().table().len(), 3);
        assert_eq!(ctx.config().struggle.unwrap().missing_imports, 5);
    }

    #[test]
    fn test_gate_shares_audit_sink() {
        let sink = Arc::new(MemoryAuditSink::new());
        let ctx = GovernanceContext::with_audit(GovernanceConfig::default(), sink.clone());
        let verdict = ctx.gate().evaluate(MergeCandidate::default());
        // Strict evidence by default: no artifacts, no gate run.
        assert!(!verdict.merge_allowed);
        assert_eq!(sink.count_kind(kinds::GATE_VERDICT), 1);
    }

    #[test]
    fn test_from_config_opens_jsonl_audit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("log.jsonl");
        let config = GovernanceConfig {
            audit_log: Some(path.clone()),
            ..Default::default()
        };
        let ctx = GovernanceContext::from_config(config).unwrap();
        ctx.gate().evaluate(MergeCandidate::default());
        let entries = JsonlAuditSink::read_all(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, kinds::GATE_VERDICT);
    }
}
