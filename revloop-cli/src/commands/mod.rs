//! CLI command implementations

pub mod benchmark;
pub mod run;
pub mod state;

pub use benchmark::BenchmarkArgs;
pub use run::RunArgs;
pub use state::StateArgs;

use clap::Args;
use revloop_core::{Config, Secrets};

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Create an empty secrets file (mode 0600) to fill in
    #[arg(long)]
    pub init_secrets: bool,
}

impl ConfigArgs {
    /// Execute the config command
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if self.init_secrets {
            let path = Secrets::create_template()?;
            println!("Created {}", path.display());
            return Ok(());
        }
        print_config(config)
    }
}

/// Print the effective configuration and where it came from
fn print_config(config: &Config) -> anyhow::Result<()> {
    println!("Revloop Configuration");
    println!("=====================");
    println!();
    println!("{}", toml::to_string_pretty(config)?);
    println!("Selector state: {}", config.run.state_path().display());
    println!();

    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }

    if let Some(path) = Secrets::default_secrets_path() {
        println!("Secrets file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using environment)");
        }
    }

    Ok(())
}
