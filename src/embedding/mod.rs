//! Embedding oracles.
//!
//! Concrete implementations of [`EmbeddingOracle`] selected by
//! `[embedding] provider`:
//! - **[`DisabledOracle`]**: every call fails; used when embeddings are off.
//! - **[`OpenAIOracle`]**: `POST /v1/embeddings` with retry and backoff.
//! - **[`OllamaOracle`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalOracle`]**: on-device inference via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//! - **[`HashOracle`]**: deterministic feature hashing. Offline, instant, and
//!   good enough to exercise the pipeline in tests and demos.
//!
//! Any failure is surfaced as [`Error::OracleUnavailable`] so callers can
//! tell "the oracle is down" apart from storage problems.
//!
//! # Retry Strategy
//!
//! The HTTP oracles use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

use inbox_lens_core::embedding::{l2_normalize, EmbeddingOracle};
use inbox_lens_core::lexical::tokenize;
use inbox_lens_core::{Error, Result};

use crate::config::EmbeddingConfig;

fn unavailable(err: anyhow::Error) -> Error {
    Error::OracleUnavailable(format!("{err:#}"))
}

// ============ Disabled ============

/// Oracle used when `embedding.provider = "disabled"`.
pub struct DisabledOracle;

#[async_trait]
impl EmbeddingOracle for DisabledOracle {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::OracleUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ HTTP retry loop ============

/// POST `body` to `url`, retrying transient failures with exponential backoff.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> anyhow::Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(service, attempt, delay_secs = delay.as_secs(), "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, "transient embedding API error");
                    last_err = Some(anyhow!("{} API error {}: {}", service, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", service, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", service)))
}

fn parse_vector(value: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    Ok(value
        .as_array()
        .ok_or_else(|| anyhow!("embedding is not an array"))?
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

fn http_client(config: &EmbeddingConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ============ OpenAI ============

pub struct OpenAIOracle {
    model: String,
    dims: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIOracle {
    /// Requires `model`, `dims` and the `OPENAI_API_KEY` environment variable.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            api_key,
            client: http_client(config)?,
        })
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, parse_vector(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl EmbeddingOracle for OpenAIOracle {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(unavailable)?;
        parse_openai_response(&json).map_err(unavailable)
    }
}

// ============ Ollama ============

/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaOracle {
    model: String,
    dims: usize,
    max_retries: u32,
    url: String,
    client: reqwest::Client,
}

impl OllamaOracle {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            url: url.trim_end_matches('/').to_string(),
            client: http_client(config)?,
        })
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(parse_vector)
        .collect()
}

#[async_trait]
impl EmbeddingOracle for OllamaOracle {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(unavailable)?;
        parse_ollama_response(&json).map_err(unavailable)
    }
}

// ============ Local (fastembed) ============

fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

/// On-device oracle. The model is downloaded from Hugging Face on first use,
/// then loaded once and kept for the lifetime of the oracle.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalOracle {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalOracle {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Default::default(),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingOracle for LocalOracle {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model_name = self.model_name.clone();
        let batch_size = self.batch_size;
        let slot = self.model.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Vec<f32>>> {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let fastembed_model = config_to_fastembed_model(&model_name)?;
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model not loaded"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await
        .map_err(|e| unavailable(e.into()))?
        .map_err(unavailable)
    }
}

// ============ Hash ============

/// Deterministic bag-of-words embedder.
///
/// Each token (and each adjacent token pair) is hashed with SHA-256 into one
/// of `dims` buckets with a hash-derived sign. Texts sharing vocabulary get
/// similar vectors; identical texts get identical vectors.
pub struct HashOracle {
    model: String,
    dims: usize,
}

impl HashOracle {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims: dims.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let tokens = tokenize(text);
        let bigrams = tokens.windows(2).map(|w| format!("{} {}", w[0], w[1]));
        for (feature, weight) in tokens
            .iter()
            .cloned()
            .map(|t| (t, 1.0f32))
            .chain(bigrams.map(|b| (b, 0.5f32)))
        {
            let digest = Sha256::digest(feature.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) % self.dims as u64;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket as usize] += sign * weight;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingOracle for HashOracle {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Create the oracle named by `config.provider`.
///
/// | Config Value | Oracle |
/// |-------------|--------|
/// | `"disabled"` | [`DisabledOracle`] |
/// | `"openai"` | [`OpenAIOracle`] |
/// | `"ollama"` | [`OllamaOracle`] |
/// | `"local"` | `LocalOracle` (feature `local-embeddings-fastembed`) |
/// | `"hash"` | [`HashOracle`] |
pub fn create_oracle(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingOracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledOracle)),
        "openai" => Ok(Box::new(OpenAIOracle::new(config)?)),
        "ollama" => Ok(Box::new(OllamaOracle::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalOracle::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => {
            let (model, _) = resolve_local_model(config);
            bail!(
                "Local embedding model '{}' requires --features local-embeddings-fastembed",
                model
            )
        }
        "hash" => {
            let (model, dims) = resolve_local_model(config);
            Ok(Box::new(HashOracle::new(model, dims)))
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// SHA-256 of the text sent to the oracle, used to detect stale vectors.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inbox_lens_core::embedding::{cosine_similarity, is_unit_norm};

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.5]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.5]]);
        assert!(parse_ollama_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_hash_oracle_is_deterministic_and_unit() {
        let oracle = HashOracle::new("hash", 64);
        let a = oracle.embed_one("quarterly invoice reminder");
        let b = oracle.embed_one("quarterly invoice reminder");
        assert_eq!(a, b);
        assert!(is_unit_norm(&a));
    }

    #[test]
    fn test_hash_oracle_shared_vocabulary_is_closer() {
        let oracle = HashOracle::new("hash", 256);
        let base = oracle.embed_one("invoice payment overdue");
        let near = oracle.embed_one("invoice payment reminder");
        let far = oracle.embed_one("hiking trip photos");
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_disabled_oracle_is_unavailable() {
        let err = DisabledOracle.embed("hello").await.unwrap_err();
        assert!(matches!(err, Error::OracleUnavailable(_)));
    }

    #[test]
    fn test_create_oracle_hash() {
        let config = EmbeddingConfig {
            provider: "hash".to_string(),
            model: Some("hash-64".to_string()),
            dims: Some(64),
            ..Default::default()
        };
        let oracle = create_oracle(&config).unwrap();
        assert_eq!(oracle.model_name(), "hash-64");
        assert_eq!(oracle.dims(), 64);
    }

    #[test]
    fn test_hash_text_is_hex_sha256() {
        assert_eq!(hash_text("").len(), 64);
        assert_ne!(hash_text("a"), hash_text("b"));
    }
}
