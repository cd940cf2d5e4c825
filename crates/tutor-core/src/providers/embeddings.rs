//! Gemini embedContent client. Documents and queries use asymmetric task
//! types so retrieval quality matches the provider's recommendation.

use crate::config::ProviderConfig;
use crate::ports::EmbeddingProvider;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub struct GeminiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.llm_api_key.clone(),
            model: config.embedding_model.clone(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            dimension: config.embedding_dimension,
        }
    }

    async fn embed_with_task(&self, text: &str, task_type: &str) -> anyhow::Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "content": {"parts": [{"text": text}]},
            "taskType": task_type,
            "outputDimensionality": self.dimension,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("embedding request returned {status}: {detail}"));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .context("embedding response was not valid JSON")?;
        if parsed.embedding.values.is_empty() {
            return Err(anyhow!("embedding response had no values"));
        }
        Ok(parsed.embedding.values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_with_task(text, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_with_task(text, "RETRIEVAL_QUERY").await
    }
}
