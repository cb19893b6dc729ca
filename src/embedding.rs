//! Embedding backends and vector utilities.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: always fails with [`EmbeddingError::Unavailable`].
//! - **[`HttpEmbedder`]**: calls the OpenAI `/embeddings` or Ollama `/api/embed`
//!   endpoint with retry and backoff.
//! - **`LocalEmbedder`**: runs a sentence-embedding model in-process via
//!   fastembed. The model is loaded once, on first use, and the handle is
//!   shared by every later call.
//!
//! Also provides [`cosine_similarity`], the metric the knowledge store ranks by.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the backend named by
//! `embedding.provider`:
//!
//! ```rust,no_run
//! # use ragchat::config::EmbeddingConfig;
//! # use ragchat::embedding::create_embedder;
//! let config = EmbeddingConfig { provider: "disabled".into(), ..Default::default() };
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! The HTTP backends use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::EmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding backend returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),
}

/// A text embedding backend.
///
/// `embed` returns one vector per input, in input order. Every vector a given
/// backend produces has the same dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed a single query text.
///
/// Convenience wrapper around [`Embedder::embed`] for the retrieval path.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let results = embedder.embed(&[text.to_string()]).await?;
    let got = results.len();
    results
        .into_iter()
        .next()
        .ok_or(EmbeddingError::CountMismatch { expected: 1, got })
}

fn check_count(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            got: vectors.len(),
        });
    }
    Ok(vectors)
}

// ============ Disabled ============

/// A backend that refuses to embed anything.
///
/// Used when `embedding.provider = "disabled"`. Ingestion and retrieval over a
/// non-empty store fail with [`EmbeddingError::Unavailable`].
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Unavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ HTTP (OpenAI / Ollama) ============

/// Wire format spoken by an [`HttpEmbedder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpApi {
    /// `POST {base}/embeddings`, bearer auth, `data[].embedding`.
    OpenAi,
    /// `POST {base}/api/embed`, no auth, `embeddings[]`.
    Ollama,
}

/// Embedding backend for hosted or local HTTP embedding APIs.
pub struct HttpEmbedder {
    api: HttpApi,
    model: String,
    dims: usize,
    base_url: String,
    api_key: Option<String>,
    batch_size: usize,
    max_retries: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(
        api: HttpApi,
        model: impl Into<String>,
        dims: usize,
        base_url: impl Into<String>,
        api_key: Option<String>,
        config: &EmbeddingConfig,
    ) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api,
            model: model.into(),
            dims,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        match self.api {
            HttpApi::OpenAi => format!("{}/embeddings", self.base_url),
            HttpApi::Ollama => format!("{}/api/embed", self.base_url),
        }
    }

    fn label(&self) -> &'static str {
        match self.api {
            HttpApi::OpenAi => "OpenAI",
            HttpApi::Ollama => "Ollama",
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

impl HttpEmbedder {
    /// One request of at most `batch_size` inputs, retried on 429/5xx.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = self.endpoint();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body);
            if let Some(key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {}", key));
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
                        let vectors = match self.api {
                            HttpApi::OpenAi => parse_openai_response(&json)?,
                            HttpApi::Ollama => parse_ollama_response(&json)?,
                        };
                        return check_count(texts.len(), vectors);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = EmbeddingError::Request(format!(
                        "{} API error {}: {}",
                        self.label(),
                        status,
                        body_text
                    ));

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::debug!(attempt, %status, "retrying embedding request");
                        last_err = Some(err);
                        continue;
                    }

                    // Client error (not 429), no retry
                    return Err(err);
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(EmbeddingError::Timeout(self.timeout));
                }
                Err(e) if e.is_connect() => {
                    last_err = Some(EmbeddingError::Unavailable(format!(
                        "{} connection error (is it reachable at {}?): {}",
                        self.label(),
                        self.base_url,
                        e
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbeddingError::Request(e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EmbeddingError::Request("embedding failed after retries".to_string())
        }))
    }
}

/// Extract `data[].embedding` arrays in order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing data array".to_string()))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(|e| e.as_array())
                .map(|arr| to_f32_vec(arr))
                .ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding".to_string()))
        })
        .collect()
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing embeddings array".to_string()))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding.as_array().map(|arr| to_f32_vec(arr)).ok_or_else(|| {
                EmbeddingError::InvalidResponse("embedding is not an array".to_string())
            })
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Local (fastembed) ============

/// In-process sentence-embedding model.
///
/// Models are downloaded on first use from Hugging Face and cached. After the
/// initial download no network calls are needed.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    timeout: Duration,
    model: tokio::sync::OnceCell<Arc<std::sync::Mutex<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        // Reject unknown names up front rather than on the first upload.
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            timeout: Duration::from_secs(config.timeout_secs),
            model: tokio::sync::OnceCell::new(),
        })
    }

    async fn handle(
        &self,
    ) -> Result<Arc<std::sync::Mutex<fastembed::TextEmbedding>>, EmbeddingError> {
        let handle = self
            .model
            .get_or_try_init(|| async {
                let kind = config_to_fastembed_model(&self.model_name)
                    .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
                tracing::info!(model = %self.model_name, "loading local embedding model");
                let model = tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(kind).with_show_download_progress(false),
                    )
                })
                .await
                .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?
                .map_err(|e| {
                    EmbeddingError::Unavailable(format!(
                        "failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                Ok::<_, EmbeddingError>(Arc::new(std::sync::Mutex::new(model)))
            })
            .await?;
        Ok(Arc::clone(handle))
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.handle().await?;
        let batch_size = self.batch_size;
        let owned = texts.to_vec();

        let task = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| {
                EmbeddingError::Unavailable("local embedding model lock poisoned".to_string())
            })?;
            model
                .embed(owned, Some(batch_size))
                .map_err(|e| EmbeddingError::Request(format!("local embedding failed: {}", e)))
        });

        let vectors = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))?
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))??;
        check_count(texts.len(), vectors)
    }
}

#[cfg(feature = "local-embeddings")]
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    }
}

/// Create the [`Embedder`] named by the configuration.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`HttpEmbedder`] (`OPENAI_API_KEY` required) |
/// | `"ollama"` | [`HttpEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings`) |
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => {
            let model = config
                .model
                .clone()
                .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
            let dims = config
                .dims
                .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
            let url = config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(Arc::new(HttpEmbedder::new(
                HttpApi::OpenAi,
                model,
                dims,
                url,
                Some(api_key),
                config,
            )?))
        }
        "ollama" => {
            let model = config
                .model
                .clone()
                .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
            let dims = config
                .dims
                .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
            let url = config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Arc::new(HttpEmbedder::new(
                HttpApi::Ollama,
                model,
                dims,
                url,
                None,
                config,
            )?))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
