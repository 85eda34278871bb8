//! Persisted selector state

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::regressor::SgdRegressor;
use super::scaler::StandardScaler;
use crate::config::SelectorConfig;
use crate::features::{FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
use crate::{Error, Result};

/// One processed pull request as seen by the model
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: Vec<f64>,
    pub prompt_index: usize,
    pub score: f64,
}

/// Usage and mean score of one prompt in the history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptStats {
    pub prompt: String,
    pub uses: usize,
    pub mean_score: Option<f64>,
}

/// Everything the selector learns, in serializable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorState {
    pub schema_version: u32,
    pub feature_names: Vec<String>,
    pub prompt_names: Vec<String>,
    pub regressor: SgdRegressor,
    pub normalizer: StandardScaler,
    pub normalizer_is_fitted: bool,
    pub sample_count: u64,
    pub feature_history: Vec<Vec<f64>>,
    pub prompt_history: Vec<usize>,
    pub score_history: Vec<f64>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl SelectorState {
    /// Cold state for the given prompt names
    pub fn cold(prompt_names: Vec<String>, config: &SelectorConfig) -> Self {
        Self {
            schema_version: FEATURE_SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            prompt_names,
            regressor: SgdRegressor::new(config.learning_rate, config.alpha),
            normalizer: StandardScaler::new(),
            normalizer_is_fitted: false,
            sample_count: 0,
            feature_history: Vec::new(),
            prompt_history: Vec::new(),
            score_history: Vec::new(),
            saved_at: None,
        }
    }

    /// Append a training example to the history
    pub fn record(&mut self, example: &TrainingExample) {
        self.feature_history.push(example.features.clone());
        self.prompt_history.push(example.prompt_index);
        self.score_history.push(example.score);
        self.sample_count += 1;
    }

    /// Training examples in insertion order
    pub fn examples(&self) -> impl Iterator<Item = TrainingExample> + '_ {
        self.feature_history
            .iter()
            .zip(&self.prompt_history)
            .zip(&self.score_history)
            .map(|((features, prompt_index), score)| TrainingExample {
                features: features.clone(),
                prompt_index: *prompt_index,
                score: *score,
            })
    }

    /// Per-prompt usage, in catalog order
    pub fn prompt_stats(&self) -> Vec<PromptStats> {
        self.prompt_names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let scores: Vec<f64> = self
                    .prompt_history
                    .iter()
                    .zip(&self.score_history)
                    .filter(|(p, _)| **p == index)
                    .map(|(_, s)| *s)
                    .collect();
                let mean_score = (!scores.is_empty())
                    .then(|| scores.iter().sum::<f64>() / scores.len() as f64);
                PromptStats {
                    prompt: name.clone(),
                    uses: scores.len(),
                    mean_score,
                }
            })
            .collect()
    }

    /// Reject state written for another feature schema or prompt catalog
    pub fn check_compatible(&self, prompt_names: &[String]) -> Result<()> {
        if self.schema_version != FEATURE_SCHEMA_VERSION {
            return Err(Error::StateMismatch(format!(
                "feature schema version {} (expected {})",
                self.schema_version, FEATURE_SCHEMA_VERSION
            )));
        }

        if !self
            .feature_names
            .iter()
            .map(String::as_str)
            .eq(FEATURE_NAMES.iter().copied())
        {
            return Err(Error::StateMismatch(format!(
                "feature names {:?} differ from the current feature set",
                self.feature_names
            )));
        }

        if self.prompt_names != prompt_names {
            return Err(Error::StateMismatch(format!(
                "prompt catalog {:?} differs from the current catalog {:?}",
                self.prompt_names, prompt_names
            )));
        }

        let rows = self.feature_history.len();
        if self.prompt_history.len() != rows || self.score_history.len() != rows {
            return Err(Error::StateMismatch(
                "history lengths are inconsistent".to_string(),
            ));
        }

        if let Some((row, values)) = self
            .feature_history
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != FEATURE_NAMES.len())
        {
            return Err(Error::StateMismatch(format!(
                "feature history row {} has {} values (expected {})",
                row,
                values.len(),
                FEATURE_NAMES.len()
            )));
        }

        Ok(())
    }

    /// Load state from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read selector state {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            Error::StateMismatch(format!(
                "Failed to parse selector state {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Save state to a JSON file, stamping `saved_at`
    ///
    /// The file is written next to its destination and renamed into place.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        self.saved_at = Some(Utc::now());
        let contents = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;

        debug!(
            path = %path.display(),
            samples = self.sample_count,
            "Selector state saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn example(score: f64) -> TrainingExample {
        TrainingExample {
            features: vec![1.0; FEATURE_NAMES.len()],
            prompt_index: 1,
            score,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = SelectorState::cold(names(), &SelectorConfig::default());
        state.record(&example(6.5));
        state.record(&example(7.5));
        state.save(&path).unwrap();

        let loaded = SelectorState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.saved_at.is_some());
        assert_eq!(loaded.examples().count(), 2);
        loaded.check_compatible(&names()).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_prompt_stats() {
        let mut state = SelectorState::cold(names(), &SelectorConfig::default());
        state.record(&example(6.0));
        state.record(&example(8.0));

        let stats = state.prompt_stats();
        assert_eq!(stats[0].uses, 0);
        assert_eq!(stats[0].mean_score, None);
        assert_eq!(stats[1].prompt, "b");
        assert_eq!(stats[1].uses, 2);
        assert_eq!(stats[1].mean_score, Some(7.0));
    }

    #[test]
    fn test_prompt_mismatch() {
        let state = SelectorState::cold(names(), &SelectorConfig::default());
        let err = state
            .check_compatible(&["a".to_string(), "c".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch(_)));
    }

    #[test]
    fn test_schema_mismatch() {
        let mut state = SelectorState::cold(names(), &SelectorConfig::default());
        state.schema_version += 1;
        assert!(state.check_compatible(&names()).is_err());

        let mut state = SelectorState::cold(names(), &SelectorConfig::default());
        state.feature_names.swap(0, 1);
        assert!(state.check_compatible(&names()).is_err());
    }

    #[test]
    fn test_ragged_history_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut state = SelectorState::cold(names(), &SelectorConfig::default());
        state.record(&example(6.0));
        state.record(&TrainingExample {
            features: vec![1.0, 2.0, 3.0],
            prompt_index: 0,
            score: 4.0,
        });
        state.save(&path).unwrap();

        let err = SelectorState::load(&path)
            .unwrap()
            .check_compatible(&names())
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch(ref m) if m.contains("row 1 has 3 values")));
    }

    #[test]
    fn test_corrupt_file_is_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{\"schema_version\": 1").unwrap();

        let err = SelectorState::load(&path).unwrap_err();
        assert!(err.is_fatal());
    }
}
