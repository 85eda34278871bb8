//! Revloop Core - learning prompt selection for automated pull request reviews
//!
//! This crate extracts features from pull request diffs, generates reviews
//! with a chosen prompt, scores them, and learns online which prompt works
//! best for which kind of change.

pub mod analysis;
pub mod benchmark;
pub mod config;
pub mod controller;
pub mod error;
pub mod features;
pub mod host;
pub mod llm;
pub mod outcome;
pub mod prompts;
pub mod retrieval;
pub mod review;
pub mod scoring;
pub mod secrets;
pub mod selector;
pub mod text;

pub use config::{Config, ConfigOverrides};
pub use controller::{BatchReport, ControllerOptions, SelectorController};
pub use error::{Error, Result};
pub use features::{extract_features, FeatureVector};
pub use host::PullRequestHost;
pub use outcome::{OutcomeStore, PrResult, ReviewOutcome};
pub use prompts::{PromptCandidate, PromptCatalog};
pub use secrets::Secrets;
pub use selector::PromptSelector;
