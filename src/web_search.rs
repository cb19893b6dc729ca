//! Web search fallback client.
//!
//! Queries an external search API with `GET {endpoint}?q=<query>&num=<n>` and
//! bearer authentication, and returns the `snippet` of each entry in the
//! response's `results` array.
//!
//! A non-success HTTP status is not an error: it yields `Ok(None)` so the
//! orchestrator can leave the prompt unaugmented instead of feeding a
//! placeholder string to the model.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::WebSearchConfig;

/// Shown to users when a search has nothing to offer. Never injected into
/// prompts.
pub const NO_RESULTS: &str = "No results found.";

#[derive(Debug, Error)]
pub enum WebSearchError {
    #[error("web search request failed: {0}")]
    Request(String),
    #[error("invalid web search response: {0}")]
    InvalidResponse(String),
    #[error("web search timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of web snippets for the fallback pass.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Up to `num_results` snippets for `query`, or `None` when the search
    /// service answered with a non-success status.
    async fn search(
        &self,
        query: &str,
        num_results: usize,
    ) -> Result<Option<Vec<String>>, WebSearchError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    snippet: String,
}

/// [`WebSearcher`] backed by an HTTP search API.
pub struct HttpWebSearch {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpWebSearch {
    pub fn new(config: &WebSearchConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        if api_key.is_none() {
            tracing::warn!("SERPAPI_API_KEY not set; web search fallback will be unauthenticated");
        }
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            timeout,
            client,
        })
    }

    /// Build from config, reading the key from `SERPAPI_API_KEY`.
    pub fn from_env(config: &WebSearchConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("SERPAPI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(config, api_key)
    }
}

#[async_trait]
impl WebSearcher for HttpWebSearch {
    async fn search(
        &self,
        query: &str,
        num_results: usize,
    ) -> Result<Option<Vec<String>>, WebSearchError> {
        let mut req = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query.to_string()), ("num", num_results.to_string())]);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                WebSearchError::Timeout(self.timeout)
            } else {
                WebSearchError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "web search returned non-success status");
            return Ok(None);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| WebSearchError::InvalidResponse(e.to_string()))?;
        Ok(Some(body.results.into_iter().map(|r| r.snippet).collect()))
    }
}
