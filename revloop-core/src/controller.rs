//! Batch driver for the prompt selection loop
//!
//! Pull requests are processed strictly in order, one at a time, so every
//! selection sees the model updated by all previous reviews.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::features::extract_features;
use crate::host::PullRequestHost;
use crate::outcome::{OutcomeStore, PrResult, ReviewOutcome};
use crate::review::ReviewGenerator;
use crate::scoring::Scorer;
use crate::selector::{PromptSelector, UpdateOutcome};
use crate::{Error, Result};

/// Prefix of comments posted to pull requests
pub const COMMENT_HEADER: &str = "**AI Review**\n\n";

/// Per-batch behaviour
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Post each review as a PR comment
    pub post_to_github: bool,
    /// Upper bound for fetching a diff and for posting a comment
    pub request_timeout: Duration,
    /// Upper bound for generating a review, analysis included
    pub generation_timeout: Duration,
    /// Pause between pull requests
    pub throttle: Duration,
    /// Where the selector state is saved at batch end; `None` skips saving
    pub state_path: Option<PathBuf>,
}

impl ControllerOptions {
    /// Options taking their time limits from the run configuration
    pub fn from_run_config(run: &RunConfig) -> Self {
        Self {
            post_to_github: false,
            request_timeout: run.request_timeout,
            generation_timeout: run.generation_timeout(),
            throttle: run.throttle,
            state_path: None,
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_run_config(&RunConfig::default())
    }
}

/// Results of a batch, one row per requested pull request
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<PrResult>,
    /// Error from the final state save, if it failed
    pub state_error: Option<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0 && self.state_error.is_none()
    }

    /// `PR #n: prompt -> score` lines
    pub fn summary_lines(&self) -> Vec<String> {
        self.results
            .iter()
            .map(|r| match (&r.outcome, &r.failure) {
                (Some(o), _) => format!("PR #{}: {} -> {:.2}", r.pr_number, o.chosen_prompt, o.score),
                (None, Some(reason)) => format!("PR #{}: failed ({})", r.pr_number, reason),
                (None, None) => format!("PR #{}: no result", r.pr_number),
            })
            .collect()
    }
}

/// Runs pull requests through extract, select, generate, score, update and persist
pub struct SelectorController {
    host: Arc<dyn PullRequestHost>,
    generator: Arc<dyn ReviewGenerator>,
    scorer: Scorer,
    selector: PromptSelector,
    store: OutcomeStore,
    options: ControllerOptions,
}

impl SelectorController {
    pub fn new(
        host: Arc<dyn PullRequestHost>,
        generator: Arc<dyn ReviewGenerator>,
        scorer: Scorer,
        selector: PromptSelector,
        store: OutcomeStore,
        options: ControllerOptions,
    ) -> Self {
        Self {
            host,
            generator,
            scorer,
            selector,
            store,
            options,
        }
    }

    pub fn selector(&self) -> &PromptSelector {
        &self.selector
    }

    /// Process every pull request, then save the selector state
    pub async fn run_batch(&mut self, pr_numbers: &[u64]) -> BatchReport {
        let mut report = BatchReport::default();

        for (i, &pr_number) in pr_numbers.iter().enumerate() {
            if i > 0 && !self.options.throttle.is_zero() {
                tokio::time::sleep(self.options.throttle).await;
            }

            info!(pr = pr_number, position = i + 1, total = pr_numbers.len(), "Processing pull request");

            let result = match self.process_pr(pr_number).await {
                Ok(outcome) => {
                    info!(
                        pr = pr_number,
                        prompt = %outcome.chosen_prompt,
                        score = outcome.score,
                        "Pull request reviewed"
                    );
                    PrResult::success(outcome)
                }
                Err(e) => {
                    warn!(pr = pr_number, error = %e, "Pull request failed");
                    PrResult::failed(pr_number, e.to_string())
                }
            };
            report.results.push(result);
        }

        if let Some(path) = self.options.state_path.clone() {
            match self.selector.save(&path) {
                Ok(()) => info!(
                    path = %path.display(),
                    samples = self.selector.sample_count(),
                    "Saved selector state"
                ),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to save selector state");
                    report.state_error = Some(e.to_string());
                }
            }
        }

        report
    }

    async fn fetch_diff(&self, pr_number: u64) -> Result<String> {
        let timeout = self.options.request_timeout;
        tokio::time::timeout(timeout, self.host.fetch_diff(pr_number))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("fetch diff for PR #{}", pr_number),
                limit: timeout,
            })?
    }

    /// Review one pull request and learn from the result
    pub async fn process_pr(&mut self, pr_number: u64) -> Result<ReviewOutcome> {
        let diff = self.fetch_diff(pr_number).await?;

        let features = extract_features(&diff);
        if features.is_empty() {
            return Err(Error::Fetch(format!("PR #{} has an empty diff", pr_number)));
        }

        let selection = self.selector.select(&features);
        info!(
            pr = pr_number,
            prompt = %selection.candidate.name,
            reason = ?selection.reason,
            "Prompt selected"
        );

        let limit = self.options.generation_timeout;
        let generated = tokio::time::timeout(
            limit,
            self.generator.generate_review(&diff, &selection.candidate),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("generate review for PR #{}", pr_number),
            limit,
        })??;

        let card = self
            .scorer
            .score(
                &diff,
                &generated.review_text,
                &generated.static_output,
                &generated.retrieved_context,
            )
            .await;

        if let UpdateOutcome::Reinitialized { reason } =
            self.selector
                .update(&features, &selection.candidate, card.score.final_score)
        {
            warn!(pr = pr_number, reason = %reason, "Selector model was reinitialized");
        }

        let outcome = ReviewOutcome {
            pr_number,
            chosen_prompt: selection.candidate.name.clone(),
            selection_reason: selection.reason,
            review_text: generated.review_text,
            score: card.score.final_score,
            heuristic_score: card.score.heuristic_score,
            meta_score: card.score.meta_score,
            heuristic_metrics: card.heuristics,
            meta_evaluation: card.meta,
            static_output: generated.static_output,
            retrieved_context: generated.retrieved_context,
            elapsed_seconds: generated.elapsed_seconds,
            features,
            training_samples: self.selector.sample_count(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self.store.save(&outcome) {
            warn!(pr = pr_number, error = %e, "Failed to write outcome files");
        }

        if self.options.post_to_github {
            let body = format!("{}{}", COMMENT_HEADER, outcome.review_text);
            let timeout = self.options.request_timeout;
            match tokio::time::timeout(timeout, self.host.post_comment(pr_number, &body)).await {
                Ok(Ok(())) => info!(pr = pr_number, "Review posted"),
                Ok(Err(e)) => warn!(pr = pr_number, error = %e, "Failed to post review"),
                Err(_) => warn!(pr = pr_number, "Posting review timed out"),
            }
        }

        Ok(outcome)
    }
}
