//! Context retrieval from a vector store
//!
//! The retriever is built once per run and handed to the review generator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::llm::Embedder;
use crate::{Error, Result};

/// Separator between retrieved chunks when joined into one context block
pub const CHUNK_SEPARATOR: &str = "\n---\n";

/// Source of reference text related to a query
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Chunks most relevant to `query`, best first
    async fn retrieve(&self, query: &str) -> Result<Vec<String>>;
}

/// Retriever that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRetriever;

#[async_trait]
impl ContextRetriever for NoopRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Pinecone index queried with embeddings from an [`Embedder`]
///
/// Chunk text is read from the `text` metadata field.
pub struct PineconeRetriever {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
    top_k: usize,
    timeout: Duration,
    embedder: Arc<dyn Embedder>,
}

impl PineconeRetriever {
    pub fn new(
        config: &RetrievalConfig,
        api_key: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        timeout: Duration,
    ) -> Result<Self> {
        let host = config
            .pinecone_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::Config("retrieval.pinecone_host is not set".to_string()))?;

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };

        Ok(Self {
            client: reqwest::Client::new(),
            host,
            api_key: api_key.into(),
            namespace: config.namespace.clone(),
            top_k: config.top_k,
            timeout,
            embedder,
        })
    }

    fn query_body(&self, vector: &[f32]) -> serde_json::Value {
        let mut body = json!({
            "vector": vector,
            "topK": self.top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(ref namespace) = self.namespace {
            body["namespace"] = json!(namespace);
        }
        body
    }
}

impl std::fmt::Debug for PineconeRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeRetriever")
            .field("host", &self.host)
            .field("namespace", &self.namespace)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

fn chunk_texts(response: QueryResponse) -> Vec<String> {
    response
        .matches
        .into_iter()
        .filter_map(|m| {
            m.metadata?
                .get("text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
        })
        .collect()
}

#[async_trait]
impl ContextRetriever for PineconeRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>> {
        let vector = self.embedder.embed(query).await?;
        let url = format!("{}/query", self.host);

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .timeout(self.timeout)
            .json(&self.query_body(&vector))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        operation: "vector store query".to_string(),
                        limit: self.timeout,
                    }
                } else {
                    Error::Retrieval(format!("Query to {} failed: {}", url, e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Retrieval(format!(
                "Vector store returned HTTP {}: {}",
                status, text
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Retrieval(format!("Failed to parse query response: {}", e)))?;

        let best = parsed.matches.first().and_then(|m| m.score);
        let chunks = chunk_texts(parsed);
        debug!(chunks = chunks.len(), best_score = ?best, "Retrieved context");
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ZeroEmbedder;

    #[async_trait]
    impl Embedder for ZeroEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
    }

    fn config(host: Option<&str>) -> RetrievalConfig {
        RetrievalConfig {
            pinecone_host: host.map(str::to_string),
            namespace: Some("guides".to_string()),
            top_k: 3,
        }
    }

    #[tokio::test]
    async fn test_noop_retriever() {
        assert!(NoopRetriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[test]
    fn test_host_required() {
        let err = PineconeRetriever::new(&config(None), "k", Arc::new(ZeroEmbedder), Duration::from_secs(1))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_host_normalized() {
        let retriever = PineconeRetriever::new(
            &config(Some("idx-123.svc.pinecone.io/")),
            "k",
            Arc::new(ZeroEmbedder),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(retriever.host, "https://idx-123.svc.pinecone.io");
    }

    #[test]
    fn test_query_body() {
        let retriever = PineconeRetriever::new(
            &config(Some("https://idx")),
            "k",
            Arc::new(ZeroEmbedder),
            Duration::from_secs(1),
        )
        .unwrap();
        let body = retriever.query_body(&[0.5, 0.25]);
        assert_eq!(body["topK"], 3);
        assert_eq!(body["includeMetadata"], true);
        assert_eq!(body["namespace"], "guides");
    }

    #[test]
    fn test_chunk_texts_skips_matches_without_text() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"matches": [
                {"id": "1", "score": 0.9, "metadata": {"text": "Prefer early returns", "source": "style.md"}},
                {"id": "2", "score": 0.8},
                {"id": "3", "score": 0.7, "metadata": {"source": "empty.md"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(chunk_texts(response), vec!["Prefer early returns".to_string()]);
    }
}
