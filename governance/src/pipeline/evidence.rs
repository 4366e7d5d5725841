//! Evidence snapshots: hashed, write-once captures of gate inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{GovernanceError, GovernanceResult, PolicyDenial, Severity};
use crate::pipeline::stage::EvidenceRef;

/// Hex-encoded blake3 digest.
pub fn hash_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Immutable once created; shared as `Arc<EvidenceSnapshot>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceSnapshot {
    pub snapshot_id: String,
    pub timestamp: DateTime<Utc>,
    pub hash_per_artifact: BTreeMap<String, String>,
    /// Digest over every `(path, hash)` pair, in path order
    pub digest: String,
}

impl EvidenceSnapshot {
    pub fn hash_of(&self, artifact: &str) -> Option<&str> {
        self.hash_per_artifact.get(artifact).map(String::as_str)
    }

    pub fn reference(&self, artifact: &str) -> EvidenceRef {
        EvidenceRef {
            snapshot_id: self.snapshot_id.clone(),
            artifact: Some(artifact.to_string()),
            hash: self.hash_of(artifact).map(str::to_string),
        }
    }

    /// Reference to the snapshot as a whole.
    pub fn reference_whole(&self) -> EvidenceRef {
        EvidenceRef {
            snapshot_id: self.snapshot_id.clone(),
            artifact: None,
            hash: Some(self.digest.clone()),
        }
    }

    /// References to every artifact whose path contains one of `needles`.
    pub fn references_matching(&self, needles: &[&str]) -> Vec<EvidenceRef> {
        self.hash_per_artifact
            .keys()
            .filter(|path| {
                let lower = path.to_lowercase();
                needles.iter().any(|n| lower.contains(n))
            })
            .map(|path| self.reference(path))
            .collect()
    }
}

/// Produces evidence snapshots. Gate runs call this exactly once.
pub trait EvidenceStore: Send + Sync {
    fn snapshot(&self, entity_id: &str, artifacts: &BTreeMap<String, String>) -> GovernanceResult<EvidenceSnapshot>;
}

/// Hashes artifact contents in memory.
#[derive(Debug, Default)]
pub struct HashingEvidenceStore {
    taken: AtomicUsize,
    /// Refuse to snapshot an empty artifact set
    require_artifacts: bool,
}

impl HashingEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail closed when no evidence was supplied.
    pub fn strict() -> Self {
        Self {
            taken: AtomicUsize::new(0),
            require_artifacts: true,
        }
    }

    /// Number of snapshots produced so far.
    pub fn snapshots_taken(&self) -> usize {
        self.taken.load(Ordering::SeqCst)
    }
}

impl EvidenceStore for HashingEvidenceStore {
    fn snapshot(&self, entity_id: &str, artifacts: &BTreeMap<String, String>) -> GovernanceResult<EvidenceSnapshot> {
        if self.require_artifacts && artifacts.is_empty() {
            return Err(GovernanceError::PolicyDenial(PolicyDenial::new(
                "INSUFFICIENT_EVIDENCE",
                format!("no evidence artifacts supplied for {entity_id}"),
                Severity::High,
            )));
        }

        let hash_per_artifact: BTreeMap<String, String> = artifacts
            .iter()
            .map(|(path, content)| (path.clone(), hash_hex(content.as_bytes())))
            .collect();

        let mut hasher = blake3::Hasher::new();
        for (path, hash) in &hash_per_artifact {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(hash.as_bytes());
            hasher.update(&[b'\n']);
        }
        let digest = hasher.finalize().to_hex().to_string();

        let timestamp = Utc::now();
        let seq = self.taken.fetch_add(1, Ordering::SeqCst);
        let snapshot_id = format!("snapshot_{}_{seq}_{}", timestamp.timestamp_millis(), &digest[..8]);

        tracing::debug!(
            entity_id,
            snapshot_id = %snapshot_id,
            artifacts = hash_per_artifact.len(),
            "Evidence snapshot captured"
        );

        Ok(EvidenceSnapshot {
            snapshot_id,
            timestamp,
            hash_per_artifact,
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> BTreeMap<String, String> {
        let mut a = BTreeMap::new();
        a.insert("evidence/qa-report.json".to_string(), "{\"passed\":12}".to_string());
        a.insert("evidence/build.log".to_string(), "ok".to_string());
        a
    }

    #[test]
    fn test_snapshot_hashes_each_artifact() {
        let store = HashingEvidenceStore::new();
        let snap = store.snapshot("pr-1", &artifacts()).unwrap();
        assert_eq!(snap.hash_per_artifact.len(), 2);
        assert_eq!(snap.hash_of("evidence/build.log"), Some(hash_hex(b"ok").as_str()));
        assert!(snap.snapshot_id.starts_with("snapshot_"));
        assert!(snap.snapshot_id.ends_with(&snap.digest[..8]));
        assert_eq!(store.snapshots_taken(), 1);
    }

    #[test]
    fn test_digest_is_content_addressed() {
        let store = HashingEvidenceStore::new();
        let a = store.snapshot("pr-1", &artifacts()).unwrap();
        let b = store.snapshot("pr-1", &artifacts()).unwrap();
        assert_eq!(a.digest, b.digest);
        // Same content, same millisecond or not: ids stay distinct.
        assert_ne!(a.snapshot_id, b.snapshot_id);

        let mut changed = artifacts();
        changed.insert("evidence/build.log".to_string(), "tampered".to_string());
        let c = store.snapshot("pr-1", &changed).unwrap();
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_strict_store_refuses_empty_evidence() {
        let err = HashingEvidenceStore::strict()
            .snapshot("pr-1", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, GovernanceError::PolicyDenial(ref d) if d.code == "INSUFFICIENT_EVIDENCE"));
    }

    #[test]
    fn test_references() {
        let snap = HashingEvidenceStore::new().snapshot("pr-1", &artifacts()).unwrap();
        let refs = snap.references_matching(&["qa"]);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].artifact.as_deref(), Some("evidence/qa-report.json"));
        assert_eq!(snap.reference_whole().hash.as_deref(), Some(snap.digest.as_str()));
    }
}
