//! Text scanners shared by the blueprint and gate stages.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Paths no builder output or merge may touch.
pub const PROTECTED_PATHS: &[&str] = &[
    ".github/workflows/",
    "BUILD_PHILOSOPHY.md",
    "GOVERNANCE_GATE_CANON.md",
    ".github/foreman/agent-contract.md",
    "foreman/constitution/",
    "foreman/architecture-design-checklist.md",
    "docs/governance/",
];

static SUPPRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eslint-disable|@ts-ignore|@ts-expect-error|@ts-nocheck|prettier-ignore|#!?\[allow\(")
        .expect("SUPPRESSION_RE regex should compile")
});

static INCOMPLETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:TODO|FIXME|HACK)\b|\bunimplemented!\(|\btodo!\(")
        .expect("INCOMPLETE_RE regex should compile")
});

static QA_SOFTENING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:test|it|describe)\.skip\(|#\[ignore\]|disabled failing test")
        .expect("QA_SOFTENING_RE regex should compile")
});

static TEST_SKIPPING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)tests? will be added later|skip(?:ping)? (?:the )?tests")
        .expect("TEST_SKIPPING_RE regex should compile")
});

static EXPORTED_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bpub\s+(?:async\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)|\bexport\s+(?:default\s+)?(?:async\s+)?function\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .expect("EXPORTED_FN_RE regex should compile")
});

static ANY_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*any\b").expect("ANY_TYPE_RE regex should compile"));

static WARNING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bvar\s+[A-Za-z_$]|\bconsole\.log\(|\bdbg!\(").expect("WARNING_RE regex should compile")
});

static BYPASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--no-verify|GOVERNANCE_BYPASS|skip-gate|\[skip ci\]").expect("BYPASS_RE regex should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftKind {
    QaSoftening,
    IncompleteImplementation,
    TestSkipping,
}

impl std::fmt::Display for DriftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QaSoftening => write!(f, "qa-softening"),
            Self::IncompleteImplementation => write!(f, "incomplete-implementation"),
            Self::TestSkipping => write!(f, "test-skipping"),
        }
    }
}

/// A line matching a drift pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftMarker {
    pub kind: DriftKind,
    /// 1-indexed
    pub line: usize,
    pub excerpt: String,
}

/// Exact match for files, prefix match for directories.
pub fn is_protected_path(path: &str) -> bool {
    let path = path.trim_start_matches("./");
    PROTECTED_PATHS.iter().any(|p| {
        if p.ends_with('/') {
            path.starts_with(p)
        } else {
            path == *p
        }
    })
}

fn matching_lines(re: &Regex, content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .map(|(i, line)| (i + 1, line.trim().to_string()))
        .collect()
}

/// Lint or type-check suppressions, as `line: text`.
pub fn find_suppressions(content: &str) -> Vec<String> {
    matching_lines(&SUPPRESSION_RE, content)
        .into_iter()
        .map(|(n, l)| format!("{n}: {l}"))
        .collect()
}

/// Attempts to bypass hooks or gates, as `line: text`.
pub fn find_bypass_attempts(content: &str) -> Vec<String> {
    matching_lines(&BYPASS_RE, content)
        .into_iter()
        .map(|(n, l)| format!("{n}: {l}"))
        .collect()
}

/// Drift markers in source order. QA softening is reported before an
/// incomplete-implementation marker on the same line.
pub fn find_drift_markers(content: &str) -> Vec<DriftMarker> {
    let mut markers = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let kind = if QA_SOFTENING_RE.is_match(line) {
            Some(DriftKind::QaSoftening)
        } else if INCOMPLETE_RE.is_match(line) {
            Some(DriftKind::IncompleteImplementation)
        } else if TEST_SKIPPING_RE.is_match(line) {
            Some(DriftKind::TestSkipping)
        } else {
            None
        };
        if let Some(kind) = kind {
            markers.push(DriftMarker {
                kind,
                line: idx + 1,
                excerpt: line.trim().to_string(),
            });
        }
    }
    markers
}

/// Names of exported functions (`pub fn`, `export function`).
pub fn exported_functions(content: &str) -> Vec<String> {
    EXPORTED_FN_RE
        .captures_iter(content)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Lines declaring an `any`-typed value.
pub fn untyped_any(content: &str) -> Vec<String> {
    matching_lines(&ANY_TYPE_RE, content)
        .into_iter()
        .map(|(n, l)| format!("{n}: {l}"))
        .collect()
}

/// Lines a linter would warn about.
pub fn warning_markers(content: &str) -> Vec<String> {
    matching_lines(&WARNING_RE, content)
        .into_iter()
        .map(|(n, l)| format!("{n}: {l}"))
        .collect()
}
