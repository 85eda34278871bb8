//! Pull request feature extraction
//!
//! Turns a unified diff into a [`FeatureVector`]. The canonical order in
//! [`FEATURE_NAMES`] is what the selector model and its persisted weights are
//! keyed on, so it only ever grows together with [`FEATURE_SCHEMA_VERSION`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Bumped whenever a feature is added, removed or reordered
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Number of features in a vector
pub const FEATURE_COUNT: usize = 14;

/// Feature names in canonical order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "num_lines",
    "num_files",
    "additions",
    "deletions",
    "net_changes",
    "has_comments",
    "has_functions",
    "has_imports",
    "has_test",
    "has_docs",
    "has_config",
    "is_python",
    "is_js",
    "is_java",
];

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#|//|(?s)/\*.*?\*/").expect("comment pattern is valid"));

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)def\s+\w+|\bfunction\b|\bfunc\b|\bfn\s+\w+").expect("function pattern is valid")
});

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[+\- ]?(?:import\s|from\s|#include|use\s)").expect("import pattern is valid")
});

static TEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)test|spec|unittest").expect("test pattern is valid"));

static DOCS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)readme|doc|comment|documentation").expect("docs pattern is valid")
});

static CONFIG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\.json$|\.yml$|\.yaml$|\.xml$|\.conf").expect("config pattern is valid")
});

static PYTHON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\.py$").expect("python pattern is valid"));

static JS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\.js$|\.ts$").expect("js pattern is valid"));

static JAVA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\.java$").expect("java pattern is valid"));

/// Numeric description of a pull request diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub num_lines: u64,
    pub num_files: u64,
    pub additions: u64,
    pub deletions: u64,
    /// `additions - deletions`, the only signed feature
    pub net_changes: i64,
    pub has_comments: bool,
    pub has_functions: bool,
    pub has_imports: bool,
    pub has_test: bool,
    pub has_docs: bool,
    pub has_config: bool,
    pub is_python: bool,
    pub is_js: bool,
    pub is_java: bool,
}

impl FeatureVector {
    /// Canonical-order numeric row, flags encoded as 0/1
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.num_lines as f64,
            self.num_files as f64,
            self.additions as f64,
            self.deletions as f64,
            self.net_changes as f64,
            flag(self.has_comments),
            flag(self.has_functions),
            flag(self.has_imports),
            flag(self.has_test),
            flag(self.has_docs),
            flag(self.has_config),
            flag(self.is_python),
            flag(self.is_js),
            flag(self.is_java),
        ]
    }

    /// `(name, value)` pairs in canonical order
    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.to_array()).collect()
    }

    /// True for the vector produced by empty input
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Extract features from a unified diff
///
/// Whitespace-only input yields the all-zero vector; callers treat that as
/// "nothing to review".
pub fn extract_features(diff: &str) -> FeatureVector {
    if diff.trim().is_empty() {
        return FeatureVector::default();
    }

    let counts = count_lines(diff);

    FeatureVector {
        num_lines: diff.split('\n').count() as u64,
        num_files: counts.files,
        additions: counts.additions,
        deletions: counts.deletions,
        net_changes: counts.additions as i64 - counts.deletions as i64,
        has_comments: COMMENT_RE.is_match(diff),
        has_functions: FUNCTION_RE.is_match(diff),
        has_imports: IMPORT_RE.is_match(diff),
        has_test: TEST_RE.is_match(diff),
        has_docs: DOCS_RE.is_match(diff),
        has_config: CONFIG_RE.is_match(diff),
        is_python: PYTHON_RE.is_match(diff),
        is_js: JS_RE.is_match(diff),
        is_java: JAVA_RE.is_match(diff),
    }
}

#[derive(Debug, Default)]
struct LineCounts {
    files: u64,
    additions: u64,
    deletions: u64,
}

/// Count file blocks and changed lines
///
/// `+++`/`---` lines before the first hunk of a file block are headers and
/// are not counted as changes.
fn count_lines(diff: &str) -> LineCounts {
    let mut counts = LineCounts::default();
    let mut in_hunk = false;

    for line in diff.lines() {
        if line.starts_with("diff --git") {
            counts.files += 1;
            in_hunk = false;
            continue;
        }
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if !in_hunk && (line.starts_with("+++") || line.starts_with("---")) {
            continue;
        }

        if line.starts_with('+') {
            counts.additions += 1;
        } else if line.starts_with('-') {
            counts.deletions += 1;
        }
    }

    counts
}
