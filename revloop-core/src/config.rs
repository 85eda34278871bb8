//! Configuration management for revloop
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (REVLOOP_*)
//! 3. Config file (~/.config/revloop/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Repository the batch runs against
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Repository as `owner/repo` or a GitHub URL
    pub repository: Option<String>,
}

/// LLM endpoint configuration (any OpenAI-compatible API)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL including the version prefix, e.g. `https://api.groq.com/openai/v1`
    pub base_url: String,

    /// Chat model used for review generation and meta-evaluation
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token cap
    pub max_tokens: u32,

    /// Base URL for the embeddings endpoint (defaults to `base_url`)
    pub embedding_base_url: Option<String>,

    /// Embedding model used for retrieval queries
    pub embedding_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.25,
            max_tokens: 2048,
            embedding_base_url: None,
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Online prompt selector hyperparameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Decisions made by pure round robin before predictions are used
    pub bootstrap_samples: usize,

    /// Probability of overriding the greedy choice during the exploration window
    pub exploration_rate: f64,

    /// Exploration stays active while `sample_count < exploration_multiplier * candidates`
    pub exploration_multiplier: usize,

    /// Constant SGD step size
    pub learning_rate: f64,

    /// L2 regularization strength
    pub alpha: f64,

    /// Fixed seed for the exploration RNG
    pub random_seed: Option<u64>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            bootstrap_samples: 2,
            exploration_rate: 0.3,
            exploration_multiplier: 2,
            learning_rate: 0.01,
            alpha: 0.0001,
            random_seed: None,
        }
    }
}

/// Vector store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Pinecone index host, e.g. `https://my-index-abc123.svc.pinecone.io`
    pub pinecone_host: Option<String>,

    /// Pinecone namespace
    pub namespace: Option<String>,

    /// Number of chunks retrieved per query
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pinecone_host: None,
            namespace: None,
            top_k: 4,
        }
    }
}

/// Batch run settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory receiving per-PR result files
    pub output_dir: PathBuf,

    /// Selector state file (defaults to the data directory)
    pub state_path: Option<PathBuf>,

    /// Pause between PRs
    #[serde(with = "humantime_serde")]
    pub throttle: Duration,

    /// Upper bound for each network call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Local checkout the static analyzers run in
    pub static_analysis_dir: Option<PathBuf>,

    /// Upper bound for the whole static analysis step, shared by all tools
    #[serde(with = "humantime_serde")]
    pub analyzer_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reviews"),
            state_path: None,
            throttle: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
            static_analysis_dir: None,
            analyzer_timeout: Duration::from_secs(120),
        }
    }
}

/// Network calls made while generating one review: embedding, vector query, chat
const GENERATION_REQUESTS: u32 = 3;

impl RunConfig {
    /// Upper bound for generating one review
    ///
    /// Covers the analysis budget plus one `request_timeout` per network call,
    /// so a slow analyzer cannot use up the time the LLM call needs.
    pub fn generation_timeout(&self) -> Duration {
        self.analyzer_timeout + self.request_timeout * GENERATION_REQUESTS
    }

    /// Effective selector state path
    pub fn state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .or_else(|| dirs::data_dir().map(|p| p.join("revloop").join("selector_state.json")))
            .unwrap_or_else(|| PathBuf::from("selector_state.json"))
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Repository configuration
    pub github: GitHubConfig,

    /// LLM configuration
    pub llm: LlmConfig,

    /// Selector hyperparameters
    pub selector: SelectorConfig,

    /// Retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Batch run configuration
    pub run: RunConfig,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub repository: Option<String>,
    pub model: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
    pub throttle: Option<Duration>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/revloop/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("revloop").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - REVLOOP_REPOSITORY: `owner/repo`
    /// - REVLOOP_MODEL: chat model
    /// - REVLOOP_LLM_BASE_URL: OpenAI-compatible base URL
    /// - REVLOOP_PINECONE_HOST: Pinecone index host
    /// - REVLOOP_OUTPUT_DIR: result directory
    /// - REVLOOP_STATE_PATH: selector state file
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(repository) = std::env::var("REVLOOP_REPOSITORY") {
            self.github.repository = Some(repository);
        }

        if let Ok(model) = std::env::var("REVLOOP_MODEL") {
            self.llm.model = model;
        }

        if let Ok(base_url) = std::env::var("REVLOOP_LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }

        if let Ok(host) = std::env::var("REVLOOP_PINECONE_HOST") {
            self.retrieval.pinecone_host = Some(host);
        }

        if let Ok(dir) = std::env::var("REVLOOP_OUTPUT_DIR") {
            self.run.output_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("REVLOOP_STATE_PATH") {
            self.run.state_path = Some(PathBuf::from(path));
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(repository) = overrides.repository {
            self.github.repository = Some(repository);
        }

        if let Some(model) = overrides.model {
            self.llm.model = model;
        }

        if let Some(dir) = overrides.output_dir {
            self.run.output_dir = dir;
        }

        if let Some(path) = overrides.state_path {
            self.run.state_path = Some(path);
        }

        if let Some(throttle) = overrides.throttle {
            self.run.throttle = throttle;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(overrides: ConfigOverrides) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(overrides))
    }

    /// Check the settings a batch run cannot start without
    pub fn validate(&self) -> Result<()> {
        match self.github.repository.as_deref() {
            Some(r) if !r.trim().is_empty() => {}
            _ => {
                return Err(Error::Config(
                    "No repository configured. Set [github] repository, REVLOOP_REPOSITORY \
                     or pass --repo owner/repo"
                        .to_string(),
                ))
            }
        }

        let selector = &self.selector;
        if !(0.0..=1.0).contains(&selector.exploration_rate) {
            return Err(Error::Config(format!(
                "selector.exploration_rate must be within [0, 1], got {}",
                selector.exploration_rate
            )));
        }
        if selector.learning_rate <= 0.0 || !selector.learning_rate.is_finite() {
            return Err(Error::Config(format!(
                "selector.learning_rate must be positive, got {}",
                selector.learning_rate
            )));
        }
        if selector.alpha < 0.0 || !selector.alpha.is_finite() {
            return Err(Error::Config(format!(
                "selector.alpha must be non-negative, got {}",
                selector.alpha
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.repository.is_none());
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.selector.bootstrap_samples, 2);
        assert_eq!(config.selector.exploration_rate, 0.3);
        assert_eq!(config.run.throttle, Duration::from_secs(1));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(ConfigOverrides {
            repository: Some("octo/widgets".to_string()),
            model: Some("llama-3.1-8b-instant".to_string()),
            throttle: Some(Duration::from_millis(250)),
            ..Default::default()
        });

        assert_eq!(config.github.repository.as_deref(), Some("octo/widgets"));
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.run.throttle, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[github]
repository = "octo/widgets"

[selector]
exploration_rate = 0.1
random_seed = 7

[run]
throttle = "500ms"
request_timeout = "30s"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.github.repository.as_deref(), Some("octo/widgets"));
        assert_eq!(config.selector.exploration_rate, 0.1);
        assert_eq!(config.selector.random_seed, Some(7));
        // untouched fields keep their defaults
        assert_eq!(config.selector.exploration_multiplier, 2);
        assert_eq!(config.run.throttle, Duration::from_millis(500));
        assert_eq!(config.run.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_generation_timeout_covers_analysis_and_requests() {
        let run = RunConfig {
            request_timeout: Duration::from_millis(300),
            analyzer_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        assert_eq!(run.generation_timeout(), Duration::from_millis(1200));
        assert!(RunConfig::default().generation_timeout() > RunConfig::default().analyzer_timeout);
    }

    #[test]
    fn test_validate_requires_repository() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("repository"));
    }

    #[test]
    fn test_validate_rejects_bad_exploration_rate() {
        let mut config = Config::default();
        config.github.repository = Some("octo/widgets".into());
        config.selector.exploration_rate = 1.5;
        assert!(config.validate().is_err());

        config.selector.exploration_rate = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_state_path() {
        let run = RunConfig {
            state_path: Some(PathBuf::from("/tmp/state.json")),
            ..Default::default()
        };
        assert_eq!(run.state_path(), PathBuf::from("/tmp/state.json"));
    }
}
