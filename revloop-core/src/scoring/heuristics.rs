//! Cheap, local review-quality signals

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::round2;

/// Sections a well-formed review is expected to cover
pub const EXPECTED_SECTIONS: [&str; 9] = [
    "summary",
    "bugs",
    "errors",
    "code quality",
    "suggestions",
    "improvements",
    "tests",
    "positive",
    "final review",
];

/// Word-count band that earns the full length score
pub const IDEAL_WORDS: std::ops::RangeInclusive<usize> = 80..=800;

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-•*]\s+").expect("bullet pattern is valid"));

static BUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bbug\b|\berror\b|\bfail\b|\bissue\b").expect("bug pattern is valid")
});

static SUGGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsuggest\b|\brecommend\b|\bconsider\b|\bfix\b|\baction\b")
        .expect("suggest pattern is valid")
});

/// Heuristic measurements of a review text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicMetrics {
    pub length_chars: usize,
    pub length_words: usize,
    pub bullet_points: usize,
    pub mentions_bug: bool,
    pub mentions_suggest: bool,
    pub sections_presence: BTreeMap<String, bool>,
}

impl HeuristicMetrics {
    /// Fraction of [`EXPECTED_SECTIONS`] present
    pub fn section_fraction(&self) -> f64 {
        if self.sections_presence.is_empty() {
            return 0.0;
        }
        let present = self.sections_presence.values().filter(|v| **v).count();
        present as f64 / self.sections_presence.len() as f64
    }
}

/// Measure a review
pub fn heuristic_metrics(review: &str) -> HeuristicMetrics {
    let lowered = review.to_lowercase();

    HeuristicMetrics {
        length_chars: review.chars().count(),
        length_words: review.split_whitespace().count(),
        bullet_points: BULLET_RE.find_iter(review).count(),
        mentions_bug: BUG_RE.is_match(review),
        mentions_suggest: SUGGEST_RE.is_match(review),
        sections_presence: EXPECTED_SECTIONS
            .iter()
            .map(|s| (s.to_string(), lowered.contains(s)))
            .collect(),
    }
}

/// Length component: 1.0 inside the ideal band, linear decay outside
fn length_score(words: usize) -> f64 {
    if IDEAL_WORDS.contains(&words) {
        1.0
    } else if words < *IDEAL_WORDS.start() {
        words as f64 / *IDEAL_WORDS.start() as f64
    } else {
        (1.0 - (words - IDEAL_WORDS.end()) as f64 / 2000.0).max(0.0)
    }
}

/// Collapse metrics into a 0-10 score
pub fn heuristics_to_score(metrics: &HeuristicMetrics) -> f64 {
    let bullets = metrics.bullet_points.min(10) as f64 / 10.0;
    let bug_bonus = if metrics.mentions_bug { 0.1 } else { 0.0 };
    let suggest_bonus = if metrics.mentions_suggest { 0.1 } else { 0.0 };

    let mix = 0.45 * metrics.section_fraction()
        + 0.25 * bullets
        + 0.25 * length_score(metrics.length_words)
        + bug_bonus
        + suggest_bonus;

    round2(mix.clamp(0.0, 1.0) * 10.0)
}
