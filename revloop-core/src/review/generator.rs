//! Retrieval-augmented review generator

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::StaticAnalyzer;
use crate::llm::{ChatClient, ChatRequest};
use crate::prompts::{render_template, PromptCandidate, PromptCatalog, PromptContext};
use crate::retrieval::{ContextRetriever, CHUNK_SEPARATOR};
use crate::text::{safe_truncate, CONTEXT_LIMIT, DIFF_LIMIT, STATIC_LIMIT};
use crate::{Error, Result};

/// Budget for each part of the retrieval query
const QUERY_PART_LIMIT: usize = 1000;

const REVIEWER_SYSTEM: &str =
    "You are a meticulous senior software engineer writing pull request reviews.";

/// A review and the material it was generated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReview {
    pub review_text: String,
    pub static_output: String,
    pub retrieved_context: String,
    pub elapsed_seconds: f64,
}

/// Writes a review for a diff using one prompt template
#[async_trait]
pub trait ReviewGenerator: Send + Sync {
    async fn generate_review(
        &self,
        diff: &str,
        candidate: &PromptCandidate,
    ) -> Result<GeneratedReview>;
}

/// Static analysis, vector retrieval and an LLM call
pub struct RagReviewGenerator {
    chat: Arc<dyn ChatClient>,
    retriever: Arc<dyn ContextRetriever>,
    analyzer: Arc<dyn StaticAnalyzer>,
    catalog: PromptCatalog,
}

impl RagReviewGenerator {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        retriever: Arc<dyn ContextRetriever>,
        analyzer: Arc<dyn StaticAnalyzer>,
        catalog: PromptCatalog,
    ) -> Self {
        Self {
            chat,
            retriever,
            analyzer,
            catalog,
        }
    }

    /// Query sent to the retriever
    pub fn retrieval_query(diff: &str, static_output: &str) -> String {
        format!(
            "How to review this code?\nDiff: {}\nStatic: {}",
            safe_truncate(diff, QUERY_PART_LIMIT),
            safe_truncate(static_output, QUERY_PART_LIMIT)
        )
    }

    /// Retrieved chunks joined into one block; retrieval errors yield no context
    async fn context_for(&self, diff: &str, static_output: &str) -> String {
        let query = Self::retrieval_query(diff, static_output);
        match self.retriever.retrieve(&query).await {
            Ok(chunks) => chunks.join(CHUNK_SEPARATOR),
            Err(e) => {
                warn!(error = %e, "Context retrieval failed, continuing without context");
                String::new()
            }
        }
    }
}

#[async_trait]
impl ReviewGenerator for RagReviewGenerator {
    async fn generate_review(
        &self,
        diff: &str,
        candidate: &PromptCandidate,
    ) -> Result<GeneratedReview> {
        let template = self
            .catalog
            .template(candidate)
            .ok_or_else(|| Error::Other(format!("Unknown prompt '{}'", candidate.name)))?;

        let start = Instant::now();

        let static_output = self.analyzer.analyze(diff).await;
        let retrieved_context = self.context_for(diff, &static_output).await;

        let context = PromptContext::new()
            .with_diff(safe_truncate(diff, DIFF_LIMIT))
            .with_static(safe_truncate(&static_output, STATIC_LIMIT))
            .with_context(safe_truncate(&retrieved_context, CONTEXT_LIMIT));
        let prompt = render_template(template, &context);

        debug!(
            prompt = %candidate.name,
            prompt_chars = prompt.len(),
            "Generating review"
        );

        let review_text = self
            .chat
            .complete(ChatRequest::new(prompt).with_system(REVIEWER_SYSTEM))
            .await?;

        if review_text.trim().is_empty() {
            return Err(Error::Llm("Model returned an empty review".to_string()));
        }

        Ok(GeneratedReview {
            review_text,
            static_output,
            retrieved_context,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn complete(&self, request: ChatRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.user);
            Ok(self.reply.clone())
        }
    }

    struct FixedRetriever(Result<Vec<String>>);

    #[async_trait]
    impl ContextRetriever for FixedRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<String>> {
            match &self.0 {
                Ok(chunks) => Ok(chunks.clone()),
                Err(e) => Err(Error::Retrieval(e.to_string())),
            }
        }
    }

    struct FixedAnalyzer;

    #[async_trait]
    impl StaticAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _diff: &str) -> String {
            "ruff: E501 line too long".to_string()
        }
    }

    fn generator(chat: Arc<RecordingChat>, retriever: FixedRetriever) -> RagReviewGenerator {
        RagReviewGenerator::new(
            chat,
            Arc::new(retriever),
            Arc::new(FixedAnalyzer),
            PromptCatalog::builtin(),
        )
    }

    #[tokio::test]
    async fn test_prompt_includes_all_inputs() {
        let chat = Arc::new(RecordingChat {
            reply: "## Summary\nLooks fine".to_string(),
            ..Default::default()
        });
        let gen = generator(
            chat.clone(),
            FixedRetriever(Ok(vec!["Prefer early returns".into(), "Avoid panics".into()])),
        );

        let candidate = PromptCatalog::builtin().candidate(0).unwrap();
        let review = gen.generate_review("+fn main() {}", &candidate).await.unwrap();

        assert_eq!(review.review_text, "## Summary\nLooks fine");
        assert_eq!(review.static_output, "ruff: E501 line too long");
        assert_eq!(review.retrieved_context, "Prefer early returns\n---\nAvoid panics");
        assert!(review.elapsed_seconds >= 0.0);

        let prompts = chat.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("+fn main() {}"));
        assert!(prompts[0].contains("E501"));
        assert!(prompts[0].contains("Avoid panics"));
        assert!(!prompts[0].contains("{{"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_not_fatal() {
        let chat = Arc::new(RecordingChat {
            reply: "review".to_string(),
            ..Default::default()
        });
        let gen = generator(chat, FixedRetriever(Err(Error::Other("down".into()))));

        let candidate = PromptCatalog::builtin().candidate(1).unwrap();
        let review = gen.generate_review("+x", &candidate).await.unwrap();
        assert!(review.retrieved_context.is_empty());
    }

    #[tokio::test]
    async fn test_empty_review_is_error() {
        let chat = Arc::new(RecordingChat {
            reply: "  \n".to_string(),
            ..Default::default()
        });
        let gen = generator(chat, FixedRetriever(Ok(Vec::new())));

        let candidate = PromptCatalog::builtin().candidate(0).unwrap();
        let err = gen.generate_review("+x", &candidate).await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_error() {
        let chat = Arc::new(RecordingChat::default());
        let gen = generator(chat.clone(), FixedRetriever(Ok(Vec::new())));

        let stale = PromptCandidate {
            index: 9,
            name: "gone".to_string(),
        };
        assert!(gen.generate_review("+x", &stale).await.is_err());
        assert!(chat.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_retrieval_query_truncates() {
        let query = RagReviewGenerator::retrieval_query(&"a".repeat(3000), "clean");
        assert!(query.starts_with("How to review this code?\nDiff: "));
        assert!(query.contains("(Output truncated)"));
        assert!(query.ends_with("Static: clean"));
    }
}
