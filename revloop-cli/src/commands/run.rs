//! Run command - review pull requests with learned prompt selection

use std::process::ExitCode;

use clap::Args;
use revloop_core::{
    BatchReport, Config, ControllerOptions, OutcomeStore, PromptSelector, SelectorController,
};

use crate::pipeline::Pipeline;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Pull request numbers, processed in the given order
    #[arg(required = true)]
    pub prs: Vec<u64>,

    /// Post each review as a comment on its pull request
    #[arg(long)]
    pub post_to_github: bool,

    /// Start from a cold selector instead of the saved state
    #[arg(long)]
    pub no_load_state: bool,
}

impl RunArgs {
    /// Execute the run command
    ///
    /// Startup errors are returned; per-PR failures only change the exit code.
    pub async fn execute(&self, config: &Config) -> anyhow::Result<ExitCode> {
        let pipeline = Pipeline::build(config)?;

        let state_path = config.run.state_path();
        let selector = PromptSelector::load_or_new(
            &state_path,
            !self.no_load_state,
            pipeline.catalog.clone(),
            config.selector.clone(),
        )?;

        tracing::info!(
            prs = ?self.prs,
            samples = selector.sample_count(),
            state = %state_path.display(),
            post = self.post_to_github,
            "Starting review batch"
        );

        let options = ControllerOptions {
            post_to_github: self.post_to_github,
            state_path: Some(state_path),
            ..ControllerOptions::from_run_config(&config.run)
        };
        let mut controller = SelectorController::new(
            pipeline.host,
            pipeline.generator,
            pipeline.scorer,
            selector,
            OutcomeStore::new(&config.run.output_dir),
            options,
        );

        let report = controller.run_batch(&self.prs).await;
        print_report(&report);

        Ok(if report.all_succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

fn print_report(report: &BatchReport) {
    for result in &report.results {
        println!();
        match (&result.outcome, &result.failure) {
            (Some(outcome), _) => {
                println!(
                    "=== PR #{} | prompt: {} | score: {:.2} ===",
                    outcome.pr_number, outcome.chosen_prompt, outcome.score
                );
                println!();
                println!("{}", outcome.review_text);
            }
            (None, failure) => {
                println!("=== PR #{} | failed ===", result.pr_number);
                println!("{}", failure.as_deref().unwrap_or("no result"));
            }
        }
    }

    println!();
    println!("Summary");
    println!("=======");
    for line in report.summary_lines() {
        println!("  {}", line);
    }
    if let Some(ref e) = report.state_error {
        println!();
        println!("Selector state was not saved: {}", e);
    }
}
