//! Wiring of the review pipeline from configuration and secrets

use std::sync::Arc;

use anyhow::Context;
use revloop_core::analysis::CommandAnalyzer;
use revloop_core::llm::{ChatClient, Embedder, OpenAiCompatClient};
use revloop_core::retrieval::{ContextRetriever, NoopRetriever, PineconeRetriever};
use revloop_core::review::{RagReviewGenerator, ReviewGenerator};
use revloop_core::scoring::{LlmMetaEvaluator, Scorer};
use revloop_core::{Config, Error, PromptCatalog, PullRequestHost, Secrets};
use revloop_github::GitHubClient;
use tracing::{info, warn};

/// Collaborators shared by the `run` and `benchmark` commands
pub struct Pipeline {
    pub host: Arc<dyn PullRequestHost>,
    pub generator: Arc<dyn ReviewGenerator>,
    pub scorer: Scorer,
    pub catalog: PromptCatalog,
}

impl Pipeline {
    /// Build every collaborator, failing before any pull request is touched
    pub fn build(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let secrets = Secrets::load()?;

        let repository = config
            .github
            .repository
            .as_deref()
            .ok_or_else(|| Error::Config("No repository configured".to_string()))?;
        let host = GitHubClient::from_secrets(repository, &secrets)
            .map_err(revloop_core::Error::from)
            .context("Failed to set up GitHub access")?;

        let api_key = secrets.llm_api_key().ok_or_else(|| {
            Error::Config(
                "LLM API key not found. Set REVLOOP_LLM_API_KEY or GROQ_API_KEY, \
                 or add [llm] token to ~/.config/revloop/secrets.toml"
                    .to_string(),
            )
        })?;
        let request_timeout = config.run.request_timeout;
        let llm = Arc::new(OpenAiCompatClient::new(&config.llm, api_key, request_timeout));
        info!(model = %llm.model(), base_url = %config.llm.base_url, "LLM client ready");

        let retriever = build_retriever(config, &secrets, llm.clone())?;
        let analyzer = Arc::new(CommandAnalyzer::new(
            config.run.static_analysis_dir.clone(),
            config.run.analyzer_timeout,
        ));

        let catalog = PromptCatalog::builtin();
        let chat: Arc<dyn ChatClient> = llm;
        let generator = Arc::new(RagReviewGenerator::new(
            chat.clone(),
            retriever,
            analyzer,
            catalog.clone(),
        ));
        let scorer = Scorer::new(Arc::new(LlmMetaEvaluator::new(chat)), request_timeout);

        Ok(Self {
            host: Arc::new(host),
            generator,
            scorer,
            catalog,
        })
    }
}

fn build_retriever(
    config: &Config,
    secrets: &Secrets,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<Arc<dyn ContextRetriever>> {
    if config.retrieval.pinecone_host.is_none() {
        warn!("retrieval.pinecone_host not set, reviewing without retrieved context");
        return Ok(Arc::new(NoopRetriever));
    }

    let api_key = secrets.pinecone_api_key().ok_or_else(|| {
        Error::Config(
            "Pinecone API key not found. Set PINECONE_API_KEY \
             or add [pinecone] token to ~/.config/revloop/secrets.toml"
                .to_string(),
        )
    })?;

    let retriever = PineconeRetriever::new(
        &config.retrieval,
        api_key,
        embedder,
        config.run.request_timeout,
    )?;
    Ok(Arc::new(retriever))
}
