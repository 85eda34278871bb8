//! State command - show what the selector has learned

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use revloop_core::selector::SelectorState;
use revloop_core::{Config, PromptCatalog};

/// Show the persisted selector state
#[derive(Args, Debug)]
pub struct StateArgs {
    /// State file to inspect (defaults to the configured state path)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl StateArgs {
    /// Execute the state command
    pub fn execute(&self, config: &Config) -> anyhow::Result<ExitCode> {
        let path = self
            .file
            .clone()
            .unwrap_or_else(|| config.run.state_path());

        if !path.exists() {
            println!("No selector state at {}", path.display());
            println!("Run `revloop run <PR>...` to start learning.");
            return Ok(ExitCode::SUCCESS);
        }

        let state = SelectorState::load(&path)?;

        println!("Selector state: {}", path.display());
        println!("  samples: {}", state.sample_count);
        match state.saved_at {
            Some(t) => println!("  saved at: {}", t.to_rfc3339()),
            None => println!("  saved at: (unknown)"),
        }
        println!("  model trained: {}", state.regressor.is_fitted());
        println!();
        println!("{:<20} {:>6} {:>10}", "Prompt", "Uses", "Mean");
        for stats in state.prompt_stats() {
            let mean = stats
                .mean_score
                .map_or_else(|| "-".to_string(), |m| format!("{:.2}", m));
            println!("{:<20} {:>6} {:>10}", stats.prompt, stats.uses, mean);
        }

        if let Err(e) = state.check_compatible(&PromptCatalog::builtin().names()) {
            println!();
            println!("Warning: this state cannot be resumed by this build: {}", e);
        }

        Ok(ExitCode::SUCCESS)
    }
}
