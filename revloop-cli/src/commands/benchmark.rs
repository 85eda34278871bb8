//! Benchmark command - compare every prompt on one pull request

use std::process::ExitCode;

use clap::Args;
use revloop_core::benchmark::Benchmark;
use revloop_core::{Config, OutcomeStore};

use crate::pipeline::Pipeline;

/// Arguments for the benchmark command
#[derive(Args, Debug)]
pub struct BenchmarkArgs {
    /// Pull request number
    pub pr: u64,
}

impl BenchmarkArgs {
    /// Execute the benchmark command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<ExitCode> {
        let pipeline = Pipeline::build(config)?;
        let benchmark = Benchmark::new(
            pipeline.host,
            pipeline.generator,
            pipeline.scorer,
            pipeline.catalog,
            &config.run,
        );

        let report = match benchmark.run(self.pr).await {
            Ok(report) => report,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                eprintln!("PR #{}: {}", self.pr, e);
                return Ok(ExitCode::FAILURE);
            }
        };

        let store = OutcomeStore::new(&config.run.output_dir);
        if let Err(e) = report.save(&store) {
            tracing::warn!(error = %e, "Failed to write benchmark files");
        }

        print!("{}", report.to_markdown());
        for entry in report.entries.iter().filter(|e| e.failure.is_some()) {
            println!(
                "{} failed: {}",
                entry.prompt,
                entry.failure.as_deref().unwrap_or_default()
            );
        }
        println!();
        println!("Results written to {}", store.dir().display());

        Ok(ExitCode::SUCCESS)
    }
}
