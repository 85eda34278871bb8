//! LLM meta-evaluation of generated reviews
//!
//! A second LLM call rates the review on five dimensions. Parsing is lenient:
//! malformed fields fall back to a neutral rating and unusable output turns
//! into an error marker, so the scoring pipeline never aborts here.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::round2;
use crate::llm::{ChatClient, ChatRequest};
use crate::text::{safe_truncate, CONTEXT_LIMIT, DIFF_LIMIT, REVIEW_LIMIT, STATIC_LIMIT};

/// Rating used for missing or malformed dimensions
pub const NEUTRAL_RATING: f64 = 5.0;

/// Dimension weights, summing to 1.0
pub const DIMENSION_WEIGHTS: [(&str, f64); 5] = [
    ("clarity", 0.18),
    ("usefulness", 0.28),
    ("depth", 0.20),
    ("actionability", 0.24),
    ("positivity", 0.10),
];

static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("json object pattern is valid"));

const EVALUATOR_SYSTEM: &str =
    "You are an objective senior software engineer who judges review quality.";

/// Ratings returned by the evaluator, each expected in [1, 10]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaRatings {
    pub clarity: Option<f64>,
    pub usefulness: Option<f64>,
    pub depth: Option<f64>,
    pub actionability: Option<f64>,
    pub positivity: Option<f64>,
    pub explain: Option<String>,
}

impl MetaRatings {
    /// All five dimensions set to the same rating
    pub fn uniform(rating: f64) -> Self {
        Self {
            clarity: Some(rating),
            usefulness: Some(rating),
            depth: Some(rating),
            actionability: Some(rating),
            positivity: Some(rating),
            explain: None,
        }
    }

    fn get(&self, dimension: &str) -> Option<f64> {
        match dimension {
            "clarity" => self.clarity,
            "usefulness" => self.usefulness,
            "depth" => self.depth,
            "actionability" => self.actionability,
            "positivity" => self.positivity,
            _ => None,
        }
    }

    /// Weighted score in [1, 10], rounded to 2 decimals
    pub fn weighted_score(&self) -> f64 {
        let score: f64 = DIMENSION_WEIGHTS
            .iter()
            .map(|(dim, weight)| {
                let rating = self
                    .get(dim)
                    .filter(|r| r.is_finite() && (1.0..=10.0).contains(r))
                    .unwrap_or(NEUTRAL_RATING);
                rating * weight
            })
            .sum();
        round2(score)
    }
}

/// Parsed evaluator result: ratings, or an error marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetaEvaluation {
    Rated(MetaRatings),
    Error { error: String, raw: Option<String> },
}

impl MetaEvaluation {
    pub fn error(message: impl Into<String>) -> Self {
        MetaEvaluation::Error {
            error: message.into(),
            raw: None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MetaEvaluation::Error { .. })
    }

    /// Interpret an already-decoded JSON value
    ///
    /// Objects carrying an `error` key are error markers.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return MetaEvaluation::error("evaluator output is not a JSON object");
        };

        if let Some(err) = object.get("error") {
            let message = err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return MetaEvaluation::error(message);
        }

        MetaEvaluation::Rated(MetaRatings {
            clarity: rating(value, "clarity"),
            usefulness: rating(value, "usefulness"),
            depth: rating(value, "depth"),
            actionability: rating(value, "actionability"),
            positivity: rating(value, "positivity"),
            explain: value
                .get("explain")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Numeric rating, accepting numbers or numeric strings
fn rating(value: &Value, key: &str) -> Option<f64> {
    let field = value.get(key)?;
    field
        .as_f64()
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Parse raw evaluator output
///
/// Tries the whole text as JSON first, then the outermost `{...}` span.
pub fn parse_meta_response(raw: &str) -> MetaEvaluation {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return MetaEvaluation::from_value(&value);
    }

    let with_raw = |error: &str| MetaEvaluation::Error {
        error: error.to_string(),
        raw: Some(raw.to_string()),
    };

    match JSON_OBJECT_RE.find(raw) {
        Some(m) => match serde_json::from_str::<Value>(m.as_str()) {
            Ok(value) => MetaEvaluation::from_value(&value),
            Err(_) => with_raw("could not parse JSON"),
        },
        None => with_raw("no JSON in evaluator output"),
    }
}

/// Weighted meta score, `None` for error markers
pub fn meta_to_score(meta: &MetaEvaluation) -> Option<f64> {
    match meta {
        MetaEvaluation::Rated(ratings) => Some(ratings.weighted_score()),
        MetaEvaluation::Error { .. } => None,
    }
}

/// Rates a generated review
#[async_trait]
pub trait MetaEvaluator: Send + Sync {
    /// Returns the parsed result and the raw evaluator text, if any
    ///
    /// Implementations must not fail: problems become [`MetaEvaluation::Error`].
    async fn meta_evaluate(
        &self,
        diff: &str,
        review: &str,
        static_output: &str,
        context: &str,
    ) -> (MetaEvaluation, Option<String>);
}

/// Meta-evaluator backed by a chat model
pub struct LlmMetaEvaluator {
    chat: Arc<dyn ChatClient>,
}

impl LlmMetaEvaluator {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }
}

/// Build the evaluator prompt
pub fn evaluator_prompt(diff: &str, review: &str, static_output: &str, context: &str) -> String {
    format!(
        "You will evaluate a Pull Request review based on the diff, static analysis, and \
         retrieved context provided.\n\
         Judge if the review properly used the static analysis and context.\n\
         Produce ONLY a JSON object (no extra commentary).\n\n\
         Fields (1-10 integers): clarity, usefulness, depth, actionability, positivity.\n\
         Also include a short `explain` string (1-2 sentences).\n\n\
         Output JSON (exact format):\n\
         {{\n  \"clarity\": <int 1-10>,\n  \"usefulness\": <int 1-10>,\n  \"depth\": <int 1-10>,\n  \
         \"actionability\": <int 1-10>,\n  \"positivity\": <int 1-10>,\n  \"explain\": \"short explanation\"\n}}\n\n\
         PR Diff (truncated):\n{}\n\n\
         Static Analysis Results:\n{}\n\n\
         Retrieved Context:\n{}\n\n\
         Review to evaluate:\n{}\n",
        safe_truncate(diff, DIFF_LIMIT),
        safe_truncate(static_output, STATIC_LIMIT),
        safe_truncate(context, CONTEXT_LIMIT),
        safe_truncate(review, REVIEW_LIMIT),
    )
}

#[async_trait]
impl MetaEvaluator for LlmMetaEvaluator {
    async fn meta_evaluate(
        &self,
        diff: &str,
        review: &str,
        static_output: &str,
        context: &str,
    ) -> (MetaEvaluation, Option<String>) {
        let request = ChatRequest::new(evaluator_prompt(diff, review, static_output, context))
            .with_system(EVALUATOR_SYSTEM);

        match self.chat.complete(request).await {
            Ok(raw) => {
                let parsed = parse_meta_response(&raw);
                debug!(error = parsed.is_error(), "Meta evaluation parsed");
                (parsed, Some(raw))
            }
            Err(e) => {
                warn!(error = %e, "Meta evaluation call failed");
                (
                    MetaEvaluation::error(format!("evaluator invoke failed: {}", e)),
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = DIMENSION_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_clean_json() {
        let raw = r#"{"clarity": 8, "usefulness": 7, "depth": 6, "actionability": 9, "positivity": 5, "explain": "solid"}"#;
        match parse_meta_response(raw) {
            MetaEvaluation::Rated(r) => {
                assert_eq!(r.clarity, Some(8.0));
                assert_eq!(r.explain.as_deref(), Some("solid"));
            }
            other => panic!("expected ratings, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let raw = "Here is my rating:\n```json\n{\"clarity\": 9, \"usefulness\": 9}\n```\nThanks";
        let parsed = parse_meta_response(raw);
        assert!(!parsed.is_error());
    }

    #[test]
    fn test_parse_garbage_is_error_marker() {
        let parsed = parse_meta_response("I refuse to answer in JSON");
        match parsed {
            MetaEvaluation::Error { error, raw } => {
                assert_eq!(error, "no JSON in evaluator output");
                assert!(raw.is_some());
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(parse_meta_response("{not json}").is_error());
        assert!(parse_meta_response("[1, 2]").is_error());
    }

    #[test]
    fn test_error_key_is_error_marker() {
        let parsed = MetaEvaluation::from_value(&serde_json::json!({"error": "x"}));
        assert_eq!(parsed, MetaEvaluation::error("x"));
        assert_eq!(meta_to_score(&parsed), None);
    }

    #[test]
    fn test_all_tens() {
        let meta = MetaEvaluation::Rated(MetaRatings::uniform(10.0));
        assert_eq!(meta_to_score(&meta), Some(10.0));
    }

    #[test]
    fn test_missing_and_malformed_fields_are_neutral() {
        let parsed = MetaEvaluation::from_value(&serde_json::json!({
            "clarity": 10,
            "usefulness": "not a number",
            "depth": 42,
        }));
        // clarity 10, everything else neutral 5
        let expected = round2(10.0 * 0.18 + 5.0 * 0.82);
        assert_eq!(meta_to_score(&parsed), Some(expected));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let parsed = MetaEvaluation::from_value(&serde_json::json!({"clarity": "7"}));
        match parsed {
            MetaEvaluation::Rated(r) => assert_eq!(r.clarity, Some(7.0)),
            other => panic!("expected ratings, got {:?}", other),
        }
    }

    struct FixedChat(std::result::Result<String, String>);

    #[async_trait]
    impl ChatClient for FixedChat {
        async fn complete(&self, _request: ChatRequest) -> Result<String> {
            self.0.clone().map_err(Error::Llm)
        }
    }

    #[tokio::test]
    async fn test_llm_failure_becomes_error_marker() {
        let evaluator = LlmMetaEvaluator::new(Arc::new(FixedChat(Err("503".into()))));
        let (parsed, raw) = evaluator.meta_evaluate("diff", "review", "", "").await;
        assert!(parsed.is_error());
        assert!(raw.is_none());
    }

    #[tokio::test]
    async fn test_llm_success_is_parsed() {
        let evaluator = LlmMetaEvaluator::new(Arc::new(FixedChat(Ok(
            r#"{"clarity": 6, "usefulness": 6, "depth": 6, "actionability": 6, "positivity": 6}"#.into(),
        ))));
        let (parsed, raw) = evaluator.meta_evaluate("diff", "review", "", "").await;
        assert_eq!(meta_to_score(&parsed), Some(6.0));
        assert!(raw.is_some());
    }

    #[test]
    fn test_prompt_truncates_inputs() {
        let long_diff = "+x\n".repeat(5000);
        let prompt = evaluator_prompt(&long_diff, "review", "static", "ctx");
        assert!(prompt.contains("(Output truncated)"));
        assert!(prompt.contains("Review to evaluate:\nreview"));
    }
}
