//! Serverless vector index client. Index creation tolerates the concurrent
//! -create race (409 is not an error) and polls readiness with a timeout
//! before handing the index out.

use crate::config::ProviderConfig;
use crate::ports::{VectorIndex, VectorIndexProvider, VectorMatch, VectorQuery, VectorRecord};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ServerlessIndexProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    cloud: String,
    region: String,
    dimension: usize,
    ready_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl ServerlessIndexProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.vector_api_key.clone(),
            base_url: config.vector_base_url.trim_end_matches('/').to_string(),
            cloud: config.vector_cloud.clone(),
            region: config.vector_region.clone(),
            dimension: config.embedding_dimension,
            ready_timeout: Duration::from_secs_f64(config.index_ready_timeout_seconds),
        }
    }

    async fn create_index(&self, index_name: &str) -> anyhow::Result<()> {
        let body = json!({
            "name": index_name,
            "dimension": self.dimension,
            "metric": "cosine",
            "spec": {"serverless": {"cloud": self.cloud, "region": self.region}}
        });

        let response = self
            .http
            .post(format!("{}/indexes", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("index create request failed")?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Another process created the index concurrently.
            StatusCode::CONFLICT => {
                tracing::info!(index_name, "index already created by another process");
                Ok(())
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(anyhow!("index create returned {status}: {detail}"))
            }
        }
    }

    async fn describe_index(&self, index_name: &str) -> anyhow::Result<DescribeIndexResponse> {
        let response = self
            .http
            .get(format!("{}/indexes/{}", self.base_url, index_name))
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .context("index describe request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("index describe returned {status}"));
        }
        response
            .json()
            .await
            .context("index describe response was not valid JSON")
    }

    async fn wait_until_ready(&self, index_name: &str) -> anyhow::Result<String> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            match self.describe_index(index_name).await {
                Ok(info) if info.status.ready && !info.host.is_empty() => return Ok(info.host),
                Ok(_) => {
                    tracing::debug!(index_name, "index not ready yet");
                }
                Err(err) => {
                    tracing::warn!(index_name, error = %err, "index readiness probe failed");
                }
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "index {index_name} did not become ready within {:?}",
                    self.ready_timeout
                ));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl VectorIndexProvider for ServerlessIndexProvider {
    async fn open_index(&self, index_name: &str) -> anyhow::Result<Arc<dyn VectorIndex>> {
        self.create_index(index_name).await?;
        let host = self.wait_until_ready(index_name).await?;
        tracing::info!(index_name, host, "vector index ready");
        Ok(Arc::new(ServerlessIndex {
            http: self.http.clone(),
            api_key: self.api_key.clone(),
            host,
        }))
    }
}

pub struct ServerlessIndex {
    http: reqwest::Client,
    api_key: String,
    host: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl ServerlessIndex {
    fn url(&self, path: &str) -> String {
        format!("https://{}/{}", self.host, path)
    }

    async fn post(&self, path: &str, body: Value) -> anyhow::Result<reqwest::Response> {
        let response = self
            .http
            .post(self.url(path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("vector {path} request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("vector {path} returned {status}: {detail}"));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for ServerlessIndex {
    async fn query(&self, query: VectorQuery) -> anyhow::Result<Vec<VectorMatch>> {
        let mut filter = Map::new();
        filter.insert("learner_id".into(), json!({"$eq": query.learner_id}));
        if let Some(excluded) = &query.exclude_session_id {
            filter.insert("session_id".into(), json!({"$ne": excluded}));
        }

        let body = json!({
            "vector": query.vector,
            "topK": query.top_k,
            "namespace": query.namespace,
            "filter": filter,
            "includeMetadata": true,
        });

        let response = self.post("query", body).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .context("vector query response was not valid JSON")?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn upsert(&self, namespace: &str, record: VectorRecord) -> anyhow::Result<()> {
        let body = json!({
            "vectors": [{
                "id": record.id,
                "values": record.values,
                "metadata": record.metadata,
            }],
            "namespace": namespace,
        });
        self.post("vectors/upsert", body).await?;
        Ok(())
    }

    async fn update_metadata(
        &self,
        namespace: &str,
        id: &str,
        metadata: Map<String, Value>,
    ) -> anyhow::Result<()> {
        let body = json!({
            "id": id,
            "setMetadata": metadata,
            "namespace": namespace,
        });
        self.post("vectors/update", body).await?;
        Ok(())
    }
}
