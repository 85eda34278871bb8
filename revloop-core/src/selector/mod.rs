//! Online prompt selection
//!
//! A linear model predicts the review score of each prompt for a pull request
//! and the best one is chosen. The first decisions are round robin, and while
//! few samples exist a random fraction of decisions explores instead of
//! exploiting. After each scored review the model takes one SGD step.

pub mod regressor;
pub mod scaler;
pub mod state;

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use regressor::{ModelUpdateError, SgdRegressor};
pub use scaler::{NormalizerFitError, StandardScaler};
pub use state::{PromptStats, SelectorState, TrainingExample};

use crate::config::SelectorConfig;
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::prompts::{PromptCandidate, PromptCatalog};
use crate::{Error, Result};

/// Why a candidate was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Cold start round robin
    Bootstrap,
    /// Highest predicted score
    Greedy,
    /// Round robin override during the exploration window
    Explore,
}

/// Predicted score for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prompt: String,
    pub score: f64,
}

/// Result of [`PromptSelector::select`]
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidate: PromptCandidate,
    pub reason: SelectionReason,
    /// Successful predictions in catalog order; empty during bootstrap
    pub predictions: Vec<Prediction>,
}

/// Result of [`PromptSelector::update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The step failed and the regressor was reset to an untrained model
    Reinitialized { reason: String },
}

/// Learns which prompt to use for which pull request
pub struct PromptSelector {
    catalog: PromptCatalog,
    config: SelectorConfig,
    state: SelectorState,
    rng: StdRng,
}

impl std::fmt::Debug for PromptSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptSelector")
            .field("prompts", &self.catalog.names())
            .field("sample_count", &self.state.sample_count)
            .finish_non_exhaustive()
    }
}

impl PromptSelector {
    /// Cold selector over `catalog`
    pub fn new(catalog: PromptCatalog, config: SelectorConfig) -> Result<Self> {
        let state = SelectorState::cold(catalog.names(), &config);
        Self::from_state(catalog, config, state)
    }

    /// Selector resuming from previously saved state
    pub fn from_state(
        catalog: PromptCatalog,
        config: SelectorConfig,
        state: SelectorState,
    ) -> Result<Self> {
        if catalog.is_empty() {
            return Err(Error::Config("prompt catalog is empty".to_string()));
        }
        state.check_compatible(&catalog.names())?;

        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            catalog,
            config,
            state,
            rng,
        })
    }

    /// Resume from `path` when `load` is set and the file exists, else start cold
    pub fn load_or_new(
        path: &Path,
        load: bool,
        catalog: PromptCatalog,
        config: SelectorConfig,
    ) -> Result<Self> {
        if load && path.exists() {
            let state = SelectorState::load(path)?;
            info!(
                path = %path.display(),
                samples = state.sample_count,
                "Loaded selector state"
            );
            return Self::from_state(catalog, config, state);
        }
        Self::new(catalog, config)
    }

    /// Persist the current state
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.state.save(path)
    }

    pub fn state(&self) -> &SelectorState {
        &self.state
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    pub fn sample_count(&self) -> u64 {
        self.state.sample_count
    }

    fn round_robin(&self) -> usize {
        (self.state.sample_count % self.catalog.len() as u64) as usize
    }

    fn candidate(&self, index: usize) -> PromptCandidate {
        self.catalog.candidate(index).unwrap_or_else(|| PromptCandidate {
            index,
            name: format!("prompt_{}", index),
        })
    }

    /// Features as the model sees them: normalized when possible, raw otherwise
    fn model_input(&self, row: &[f64]) -> Vec<f64> {
        if self.state.normalizer_is_fitted {
            if let Ok(scaled) = self.state.normalizer.transform(row) {
                return scaled;
            }
        }
        row.to_vec()
    }

    fn predict(&self, input: &[f64], index: usize) -> std::result::Result<f64, ModelUpdateError> {
        let mut x = Vec::with_capacity(input.len() + 1);
        x.extend_from_slice(input);
        x.push(index as f64);
        self.state.regressor.predict(&x)
    }

    /// Choose a prompt for a pull request
    pub fn select(&mut self, features: &FeatureVector) -> Selection {
        self.select_row(&features.to_array())
    }

    /// Choose a prompt for an already-encoded feature row
    pub fn select_row(&mut self, row: &[f64]) -> Selection {
        let n = self.catalog.len();
        let sample_count = self.state.sample_count;

        if sample_count < self.config.bootstrap_samples as u64 {
            let index = self.round_robin();
            debug!(index, sample_count, "Bootstrap selection");
            return Selection {
                candidate: self.candidate(index),
                reason: SelectionReason::Bootstrap,
                predictions: Vec::new(),
            };
        }

        let input = self.model_input(row);
        let mut predictions = Vec::with_capacity(n);
        let mut best: Option<(usize, f64)> = None;

        for index in 0..n {
            match self.predict(&input, index) {
                Ok(score) => {
                    let candidate = self.candidate(index);
                    debug!(prompt = %candidate.name, predicted = score, "Predicted score");
                    predictions.push(Prediction {
                        prompt: candidate.name,
                        score,
                    });
                    if best.is_none_or(|(_, b)| score > b) {
                        best = Some((index, score));
                    }
                }
                Err(e) => debug!(index, error = %e, "Prediction skipped"),
            }
        }

        let greedy = best.map(|(i, _)| i).unwrap_or(0);

        let window = self.config.exploration_multiplier as u64 * n as u64;
        if sample_count < window && self.rng.random::<f64>() < self.config.exploration_rate {
            let explore = self.round_robin();
            debug!(explore, greedy, "Exploring instead of greedy choice");
            return Selection {
                candidate: self.candidate(explore),
                reason: SelectionReason::Explore,
                predictions,
            };
        }

        Selection {
            candidate: self.candidate(greedy),
            reason: SelectionReason::Greedy,
            predictions,
        }
    }

    /// Learn from the observed score of a review
    pub fn update(
        &mut self,
        features: &FeatureVector,
        candidate: &PromptCandidate,
        score: f64,
    ) -> UpdateOutcome {
        self.learn(&features.to_array(), candidate.index, score)
    }

    /// Learn from an already-encoded feature row
    ///
    /// Never fails: a failed step resets the regressor and is reported.
    /// A row of the wrong width also resets it, and is not added to the
    /// history so the normalizer can still be fitted later.
    pub fn learn(&mut self, row: &[f64], prompt_index: usize, score: f64) -> UpdateOutcome {
        if row.len() != FEATURE_COUNT {
            let reason = format!(
                "feature row has {} values, expected {}",
                row.len(),
                FEATURE_COUNT
            );
            warn!(reason = %reason, "Skipping feature row, reinitializing regressor");
            self.state.regressor = self.state.regressor.reinitialized();
            return UpdateOutcome::Reinitialized { reason };
        }

        self.state.record(&TrainingExample {
            features: row.to_vec(),
            prompt_index,
            score,
        });

        if !self.state.normalizer_is_fitted && self.state.feature_history.len() >= 2 {
            match self.state.normalizer.fit(&self.state.feature_history) {
                Ok(()) => {
                    self.state.normalizer_is_fitted = true;
                    debug!(rows = self.state.feature_history.len(), "Normalizer fitted");
                }
                Err(e) => warn!(error = %e, "Normalizer fit failed"),
            }
        }

        let input = if self.state.normalizer_is_fitted {
            match self.state.normalizer.transform(row) {
                Ok(scaled) => scaled,
                Err(_) => self.refit_and_transform(row),
            }
        } else {
            row.to_vec()
        };

        self.step(input, prompt_index, score)
    }

    /// One SGD step on a prepared row
    fn step(&mut self, mut x: Vec<f64>, prompt_index: usize, score: f64) -> UpdateOutcome {
        x.push(prompt_index as f64);

        match self.state.regressor.partial_fit(&x, score) {
            Ok(()) => {
                debug!(
                    prompt_index,
                    score,
                    samples = self.state.sample_count,
                    "Model updated"
                );
                UpdateOutcome::Updated
            }
            Err(e) => {
                warn!(error = %e, "Model update failed, reinitializing regressor");
                self.state.regressor = self.state.regressor.reinitialized();
                UpdateOutcome::Reinitialized {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn refit_and_transform(&mut self, row: &[f64]) -> Vec<f64> {
        let refit = self
            .state
            .normalizer
            .fit(&self.state.feature_history)
            .and_then(|()| self.state.normalizer.transform(row));

        match refit {
            Ok(scaled) => scaled,
            Err(e) => {
                warn!(error = %e, "Normalizer refit failed, using raw features");
                row.to_vec()
            }
        }
    }
}
