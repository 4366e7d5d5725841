use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use super::{AuditEntry, AuditError, AuditResult, AuditSink};

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn append(&self, _entry: AuditEntry) -> AuditResult<()> {
        Ok(())
    }
}

/// In-process sink, inspectable after the fact.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Entries for one entity, in append order.
    pub fn entries_for(&self, entity_id: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|e| e.iter().filter(|x| x.entity_id == entity_id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.entries
            .read()
            .map(|e| e.iter().filter(|x| x.kind == kind).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        let mut entries = self.entries.write().map_err(|_| AuditError::LockPoisoned)?;
        entries.push(entry);
        Ok(())
    }
}

/// One JSON object per line, opened in append mode.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back. Lines that fail to parse are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> AuditResult<Vec<AuditEntry>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = self.file.lock().map_err(|_| AuditError::LockPoisoned)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_sink_per_entity_order() {
        let sink = MemoryAuditSink::new();
        sink.append(AuditEntry::new("a", "k1", json!(1))).unwrap();
        sink.append(AuditEntry::new("b", "k1", json!(2))).unwrap();
        sink.append(AuditEntry::new("a", "k2", json!(3))).unwrap();

        let a = sink.entries_for("a");
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].kind, "k1");
        assert_eq!(a[1].kind, "k2");
        assert_eq!(sink.count_kind("k1"), 2);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("trail.jsonl");

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(AuditEntry::new("task-1", "escalation", json!({"to": "T2"})))
            .unwrap();
        sink.append(AuditEntry::new("task-1", "escalation", json!({"to": "T3"})))
            .unwrap();
        drop(sink);

        // Reopening appends rather than truncating.
        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(AuditEntry::new("task-2", "de_escalation", json!({})))
            .unwrap();

        let entries = JsonlAuditSink::read_all(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].payload["to"], "T3");
        assert_eq!(entries[2].entity_id, "task-2");
    }

    #[test]
    fn test_null_sink() {
        assert!(NullAuditSink.append(AuditEntry::new("x", "y", json!(null))).is_ok());
    }
}
