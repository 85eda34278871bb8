//! Review outcomes and their on-disk records
//!
//! Every reviewed pull request produces a JSON record
//! (`iterative_results_pr{n}_{timestamp}.json`) and a markdown report
//! (`review_pr{n}_{prompt}.md`) in the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::features::FeatureVector;
use crate::scoring::{HeuristicMetrics, MetaEvaluation};
use crate::selector::SelectionReason;
use crate::Result;

/// Result of reviewing one pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub pr_number: u64,
    pub chosen_prompt: String,
    pub selection_reason: SelectionReason,
    pub review_text: String,
    /// Final score in [0, 10]
    pub score: f64,
    pub heuristic_score: f64,
    pub meta_score: Option<f64>,
    pub heuristic_metrics: HeuristicMetrics,
    pub meta_evaluation: MetaEvaluation,
    pub static_output: String,
    pub retrieved_context: String,
    pub elapsed_seconds: f64,
    pub features: FeatureVector,
    /// Selector sample count after this review was learned
    pub training_samples: u64,
    pub timestamp: DateTime<Utc>,
}

/// One row of a batch: an outcome, or the reason there is none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrResult {
    pub pr_number: u64,
    pub outcome: Option<ReviewOutcome>,
    pub failure: Option<String>,
}

impl PrResult {
    pub fn success(outcome: ReviewOutcome) -> Self {
        Self {
            pr_number: outcome.pr_number,
            outcome: Some(outcome),
            failure: None,
        }
    }

    pub fn failed(pr_number: u64, reason: impl Into<String>) -> Self {
        Self {
            pr_number,
            outcome: None,
            failure: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn chosen_prompt(&self) -> Option<&str> {
        self.outcome.as_ref().map(|o| o.chosen_prompt.as_str())
    }

    pub fn score(&self) -> Option<f64> {
        self.outcome.as_ref().map(|o| o.score)
    }
}

/// Prompt name made safe for a file name
pub fn safe_prompt_name(prompt: &str) -> String {
    prompt.replace([' ', '/', '\\'], "_")
}

/// Markdown report for a review
pub fn render_markdown(outcome: &ReviewOutcome) -> String {
    format!(
        "# Review for PR #{} (Prompt: {})\n\
         **Score:** {}/10\n\n---\n\n\
         ## AI Review\n\n{}\n\n---\n\n\
         ## Static Analysis Output\n\n{}\n\n---\n\n\
         ## Retrieved Context\n\n<details><summary>Expand</summary>\n\n```\n{}\n```\n</details>\n",
        outcome.pr_number,
        outcome.chosen_prompt,
        outcome.score,
        outcome.review_text,
        outcome.static_output,
        outcome.retrieved_context,
    )
}

/// Writes outcome files into a directory
#[derive(Debug, Clone)]
pub struct OutcomeStore {
    dir: PathBuf,
}

impl OutcomeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the JSON record and markdown report, returning both paths
    pub fn save(&self, outcome: &ReviewOutcome) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.dir)?;

        let stamp = outcome.timestamp.format("%Y%m%d_%H%M%S");
        let json_path = self.dir.join(format!(
            "iterative_results_pr{}_{}.json",
            outcome.pr_number, stamp
        ));
        fs::write(&json_path, serde_json::to_string_pretty(outcome)?)?;

        let md_path = self.dir.join(format!(
            "review_pr{}_{}.md",
            outcome.pr_number,
            safe_prompt_name(&outcome.chosen_prompt)
        ));
        fs::write(&md_path, render_markdown(outcome))?;

        debug!(
            pr = outcome.pr_number,
            json = %json_path.display(),
            markdown = %md_path.display(),
            "Outcome saved"
        );
        Ok((json_path, md_path))
    }

    /// Write an arbitrary file into the output directory
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scoring::{heuristic_metrics, MetaRatings};
    use tempfile::TempDir;

    pub(crate) fn sample_outcome(pr_number: u64, prompt: &str) -> ReviewOutcome {
        let review = "## Summary\n- fine";
        ReviewOutcome {
            pr_number,
            chosen_prompt: prompt.to_string(),
            selection_reason: SelectionReason::Bootstrap,
            review_text: review.to_string(),
            score: 7.25,
            heuristic_score: 3.5,
            meta_score: Some(8.86),
            heuristic_metrics: heuristic_metrics(review),
            meta_evaluation: MetaEvaluation::Rated(MetaRatings::uniform(9.0)),
            static_output: "clean".to_string(),
            retrieved_context: "ctx".to_string(),
            elapsed_seconds: 1.5,
            features: FeatureVector::default(),
            training_samples: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_pr_result_accessors() {
        let ok = PrResult::success(sample_outcome(3, "structured"));
        assert_eq!(ok.pr_number, 3);
        assert_eq!(ok.chosen_prompt(), Some("structured"));
        assert_eq!(ok.score(), Some(7.25));

        let failed = PrResult::failed(4, "not found");
        assert!(!failed.is_success());
        assert_eq!(failed.chosen_prompt(), None);
        assert_eq!(failed.score(), None);
    }

    #[test]
    fn test_safe_prompt_name() {
        assert_eq!(safe_prompt_name("risk focused/v2"), "risk_focused_v2");
    }

    #[test]
    fn test_save_writes_both_files() {
        let dir = TempDir::new().unwrap();
        let store = OutcomeStore::new(dir.path().join("reviews"));
        let outcome = sample_outcome(12, "senior mentor");

        let (json_path, md_path) = store.save(&outcome).unwrap();

        let name = json_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("iterative_results_pr12_"));
        assert!(name.ends_with(".json"));
        assert_eq!(md_path.file_name().unwrap(), "review_pr12_senior_mentor.md");

        let record: ReviewOutcome =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(record.pr_number, 12);
        assert_eq!(record.chosen_prompt, "senior mentor");

        let markdown = fs::read_to_string(&md_path).unwrap();
        assert!(markdown.starts_with("# Review for PR #12 (Prompt: senior mentor)"));
        assert!(markdown.contains("**Score:** 7.25/10"));
        assert!(markdown.contains("<details><summary>Expand</summary>"));
    }

    #[test]
    fn test_meta_evaluation_serialization() {
        let json = serde_json::to_value(sample_outcome(1, "x")).unwrap();
        assert_eq!(json["meta_evaluation"]["status"], "rated");
        assert_eq!(json["meta_evaluation"]["clarity"], 9.0);
        assert_eq!(json["selection_reason"], "bootstrap");
    }
}
