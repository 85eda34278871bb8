//! Run every prompt against one pull request and compare the scores
//!
//! Benchmarks do not touch the selector state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::host::PullRequestHost;
use crate::outcome::{safe_prompt_name, OutcomeStore};
use crate::prompts::PromptCatalog;
use crate::review::ReviewGenerator;
use crate::scoring::{round2, Scorer};
use crate::{Error, Result};

/// Score of one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub prompt: String,
    pub time_seconds: f64,
    pub heuristic_score: Option<f64>,
    pub meta_score: Option<f64>,
    pub final_score: Option<f64>,
    pub review_text: Option<String>,
    pub static_output: Option<String>,
    pub retrieved_context: Option<String>,
    pub meta_raw: Option<String>,
    pub failure: Option<String>,
}

impl BenchmarkEntry {
    fn failed(prompt: String, failure: String) -> Self {
        Self {
            prompt,
            time_seconds: 0.0,
            heuristic_score: None,
            meta_score: None,
            final_score: None,
            review_text: None,
            static_output: None,
            retrieved_context: None,
            meta_raw: None,
            failure: Some(failure),
        }
    }
}

/// All prompts on one pull request, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub pr_number: u64,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<BenchmarkEntry>,
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Quote a CSV field when it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl BenchmarkReport {
    /// Markdown comparison table
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            format!("# Prompt Comparison Report: PR {}", self.pr_number),
            format!("Generated: {}", self.generated_at.to_rfc3339()),
            String::new(),
            "| Prompt | Time (s) | Heur. Score | Meta Score | Final Score |".to_string(),
            "|---|---:|---:|---:|---:|".to_string(),
        ];
        for e in &self.entries {
            lines.push(format!(
                "| {} | {} | {} | {} | {} |",
                e.prompt,
                e.time_seconds,
                cell(e.heuristic_score),
                cell(e.meta_score),
                cell(e.final_score),
            ));
        }
        lines.join("\n") + "\n"
    }

    /// Score table as CSV; failed prompts have empty score cells
    pub fn to_csv(&self) -> String {
        let score = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        let mut out = String::from("prompt,time_s,heur_score,meta_score,final_score\n");
        for e in &self.entries {
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                csv_field(&e.prompt),
                e.time_seconds,
                score(e.heuristic_score),
                score(e.meta_score),
                score(e.final_score),
            ));
        }
        out
    }

    /// Write the table, the JSON report, the CSV and one review file per prompt
    pub fn save(&self, store: &OutcomeStore) -> Result<()> {
        let base = format!("benchmark_pr{}", self.pr_number);
        store.write_file(&format!("{}.md", base), &self.to_markdown())?;
        store.write_file(&format!("{}.json", base), &serde_json::to_string_pretty(self)?)?;
        store.write_file(
            &format!("review_reports_all_prompts_PR{}.csv", self.pr_number),
            &self.to_csv(),
        )?;

        for e in &self.entries {
            let Some(ref review) = e.review_text else {
                continue;
            };
            let contents = format!(
                "# Review by prompt: {}\n\n{}\n\n\
                 ---\n## Static Analysis Output:\n{}\n\n\
                 ---\n## Retrieved Context:\n{}\n\n\
                 ---\n## Meta Raw:\n{}\n",
                e.prompt,
                review,
                e.static_output.as_deref().unwrap_or(""),
                e.retrieved_context.as_deref().unwrap_or(""),
                e.meta_raw.as_deref().unwrap_or("")
            );
            store.write_file(
                &format!(
                    "review_{}_PR{}.md",
                    safe_prompt_name(&e.prompt),
                    self.pr_number
                ),
                &contents,
            )?;
        }
        Ok(())
    }
}

/// Runs all catalog prompts on a single pull request
pub struct Benchmark {
    host: Arc<dyn PullRequestHost>,
    generator: Arc<dyn ReviewGenerator>,
    scorer: Scorer,
    catalog: PromptCatalog,
    request_timeout: Duration,
    generation_timeout: Duration,
    pause: Duration,
}

impl Benchmark {
    /// Time limits come from `run`: `request_timeout` for the diff fetch and
    /// [`RunConfig::generation_timeout`] for each review
    pub fn new(
        host: Arc<dyn PullRequestHost>,
        generator: Arc<dyn ReviewGenerator>,
        scorer: Scorer,
        catalog: PromptCatalog,
        run: &RunConfig,
    ) -> Self {
        Self {
            host,
            generator,
            scorer,
            catalog,
            request_timeout: run.request_timeout,
            generation_timeout: run.generation_timeout(),
            pause: Duration::from_millis(200),
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub async fn run(&self, pr_number: u64) -> Result<BenchmarkReport> {
        let diff = tokio::time::timeout(self.request_timeout, self.host.fetch_diff(pr_number))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("fetch diff for PR #{}", pr_number),
                limit: self.request_timeout,
            })??;
        if diff.trim().is_empty() {
            return Err(Error::Fetch(format!("PR #{} has an empty diff", pr_number)));
        }

        info!(pr = pr_number, prompts = self.catalog.len(), diff_chars = diff.len(), "Benchmarking prompts");

        let mut entries = Vec::with_capacity(self.catalog.len());
        for (i, candidate) in self.catalog.candidates().into_iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let generated = tokio::time::timeout(
                self.generation_timeout,
                self.generator.generate_review(&diff, &candidate),
            )
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    operation: format!("generate review with '{}'", candidate.name),
                    limit: self.generation_timeout,
                })
            });

            let entry = match generated {
                Ok(review) => {
                    let card = self
                        .scorer
                        .score(
                            &diff,
                            &review.review_text,
                            &review.static_output,
                            &review.retrieved_context,
                        )
                        .await;
                    BenchmarkEntry {
                        prompt: candidate.name,
                        time_seconds: round2(review.elapsed_seconds),
                        heuristic_score: Some(card.score.heuristic_score),
                        meta_score: card.score.meta_score,
                        final_score: Some(card.score.final_score),
                        review_text: Some(review.review_text),
                        static_output: Some(review.static_output),
                        retrieved_context: Some(review.retrieved_context),
                        meta_raw: card.meta_raw,
                        failure: None,
                    }
                }
                Err(e) => {
                    warn!(prompt = %candidate.name, error = %e, "Prompt failed");
                    BenchmarkEntry::failed(candidate.name, e.to_string())
                }
            };
            entries.push(entry);
        }

        // best first; failed prompts last
        entries.sort_by(|a, b| {
            let a = a.final_score.unwrap_or(f64::NEG_INFINITY);
            let b = b.final_score.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });

        Ok(BenchmarkReport {
            pr_number,
            generated_at: Utc::now(),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{FakeEvaluator, FakeGenerator, FakeHost, DIFF};
    use crate::prompts::PromptCandidate;
    use crate::review::GeneratedReview;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Longer reviews for later prompts, failure for `checklist`
    struct UnevenGenerator;

    #[async_trait]
    impl ReviewGenerator for UnevenGenerator {
        async fn generate_review(
            &self,
            _diff: &str,
            candidate: &PromptCandidate,
        ) -> Result<GeneratedReview> {
            if candidate.name == "checklist" {
                return Err(Error::Llm("rate limited".to_string()));
            }
            let bullets = "- consider a fix\n".repeat(candidate.index * 3);
            Ok(GeneratedReview {
                review_text: format!("## Summary\n{}", bullets),
                static_output: "| ruff: no issues found.".to_string(),
                retrieved_context: "Prefer early returns.".to_string(),
                elapsed_seconds: 0.5,
            })
        }
    }

    fn host() -> Arc<FakeHost> {
        let mut host = FakeHost::default();
        host.diffs.insert(7, DIFF.to_string());
        Arc::new(host)
    }

    fn benchmark(generator: Arc<dyn ReviewGenerator>) -> Benchmark {
        Benchmark::new(
            host(),
            generator,
            Scorer::new(Arc::new(FakeEvaluator(6.0)), Duration::from_secs(5)),
            PromptCatalog::builtin(),
            &RunConfig {
                request_timeout: Duration::from_secs(5),
                analyzer_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .with_pause(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_every_prompt_scored() {
        let report = benchmark(Arc::new(FakeGenerator)).run(7).await.unwrap();
        assert_eq!(report.entries.len(), PromptCatalog::builtin().len());
        assert!(report.entries.iter().all(|e| e.final_score.is_some()));
    }

    #[tokio::test]
    async fn test_sorted_best_first_with_failures_last() {
        let report = benchmark(Arc::new(UnevenGenerator)).run(7).await.unwrap();
        let names: Vec<&str> = report.entries.iter().map(|e| e.prompt.as_str()).collect();
        assert_eq!(names, vec!["senior_mentor", "risk_focused", "structured", "checklist"]);
        assert!(report.entries[3].failure.as_deref().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_missing_pr() {
        let err = benchmark(Arc::new(FakeGenerator)).run(99).await.unwrap_err();
        assert!(matches!(err, Error::PrNotFound(99)));
    }

    #[tokio::test]
    async fn test_save_outputs() {
        let dir = TempDir::new().unwrap();
        let store = OutcomeStore::new(dir.path());
        let report = benchmark(Arc::new(UnevenGenerator)).run(7).await.unwrap();
        report.save(&store).unwrap();

        let markdown = std::fs::read_to_string(dir.path().join("benchmark_pr7.md")).unwrap();
        assert!(markdown.contains("| Prompt | Time (s) |"));
        assert!(markdown.contains("| checklist | 0 | N/A | N/A | N/A |"));
        assert!(dir.path().join("benchmark_pr7.json").exists());
        assert!(!dir.path().join("review_checklist_PR7.md").exists());

        let review = std::fs::read_to_string(dir.path().join("review_structured_PR7.md")).unwrap();
        assert!(review.contains("## Static Analysis Output:\n| ruff: no issues found."));
        assert!(review.contains("## Retrieved Context:\nPrefer early returns."));
        assert!(review.contains("## Meta Raw:"));

        let csv =
            std::fs::read_to_string(dir.path().join("review_reports_all_prompts_PR7.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "prompt,time_s,heur_score,meta_score,final_score");
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("senior_mentor,0.5,"));
        assert_eq!(lines[4], "checklist,0,,,");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
