//! Gemini generateContent client.

use crate::config::ProviderConfig;
use crate::ports::LanguageModel;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("llm request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("llm request returned {status}: {detail}"));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("llm response was not valid JSON")?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow!("llm response had no candidates"))?;

        Ok(text)
    }
}
