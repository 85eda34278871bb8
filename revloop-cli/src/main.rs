//! Revloop CLI - Command line interface for revloop
//!
//! Reviews pull requests with a learned choice of review prompt.

mod commands;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use revloop_core::{Config, ConfigOverrides};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{BenchmarkArgs, ConfigArgs, RunArgs, StateArgs};

/// Exit code for configuration and startup errors
const EXIT_STARTUP: u8 = 2;

/// Revloop: iterative prompt selection for automated pull request reviews
#[derive(Parser, Debug)]
#[command(name = "revloop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository as owner/repo or a GitHub URL (overrides config and env)
    #[arg(long, global = true, env = "REVLOOP_REPOSITORY")]
    repo: Option<String>,

    /// Chat model to use (overrides config and env)
    #[arg(long, global = true, env = "REVLOOP_MODEL")]
    model: Option<String>,

    /// Directory receiving result files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Selector state file
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    /// Pause between pull requests, e.g. `2s`, `500ms` or plain seconds
    #[arg(long, global = true, value_parser = parse_throttle)]
    throttle: Option<Duration>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Review pull requests in order, learning which prompt works best
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Compare every prompt on a single pull request
    #[command(visible_alias = "bench")]
    Benchmark(BenchmarkArgs),

    /// Show what the selector has learned so far
    State(StateArgs),

    /// Show current configuration
    Config(ConfigArgs),
}

fn parse_throttle(value: &str) -> Result<Duration, String> {
    if let Ok(seconds) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string());
    }
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            repository: self.repo.clone(),
            model: self.model.clone(),
            output_dir: self.output_dir.clone(),
            state_path: self.state_path.clone(),
            throttle: self.throttle,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.overrides())?;

    if cli.verbose {
        tracing::debug!(
            repository = ?config.github.repository,
            model = %config.llm.model,
            output_dir = %config.run.output_dir.display(),
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("revloop {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run(args)) => args.execute(&config).await,
        Some(Commands::Benchmark(args)) => args.execute(&config).await,
        Some(Commands::State(args)) => args.execute(&config),
        Some(Commands::Config(args)) => {
            args.execute(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("Revloop - learned prompt selection for pull request reviews");
            println!();
            println!("Use --help for usage information");
            Ok(ExitCode::SUCCESS)
        }
    }
}
