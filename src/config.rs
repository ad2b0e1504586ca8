//! TOML configuration.
//!
//! Every section is optional and falls back to serde defaults, so an empty
//! file is a valid configuration. [`load_config`] parses and validates.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use inbox_lens_core::cluster::ClusterParams;
use inbox_lens_core::search::SearchParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/lens.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Texts are truncated to this many characters before embedding.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_text_chars: default_max_text_chars(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_text_chars() -> usize {
    2048
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    #[serde(default = "default_eps")]
    pub eps: f32,
    #[serde(default = "default_min_pts")]
    pub min_pts: usize,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_pts: default_min_pts(),
            min_cluster_size: default_min_cluster_size(),
        }
    }
}

fn default_eps() -> f32 {
    0.6
}
fn default_min_pts() -> usize {
    2
}
fn default_min_cluster_size() -> usize {
    10
}

impl ClusteringConfig {
    pub fn params(&self) -> ClusterParams {
        ClusterParams {
            eps: self.eps,
            min_pts: self.min_pts,
            min_cluster_size: self.min_cluster_size,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
    /// When nothing passes the threshold, show this many top-scoring emails.
    /// `0` disables the fallback.
    #[serde(default)]
    pub fallback_top_n: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
            fallback_top_n: 0,
        }
    }
}

fn default_threshold() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_candidate_limit")]
    pub sparse_limit: usize,
    #[serde(default = "default_candidate_limit")]
    pub dense_limit: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_body_index_chars")]
    pub body_index_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            sparse_limit: default_candidate_limit(),
            dense_limit: default_candidate_limit(),
            final_limit: default_final_limit(),
            body_index_chars: default_body_index_chars(),
        }
    }
}

fn default_rrf_k() -> f64 {
    60.0
}
fn default_candidate_limit() -> usize {
    30
}
fn default_final_limit() -> usize {
    20
}
fn default_body_index_chars() -> usize {
    5000
}

impl SearchConfig {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            rrf_k: self.rrf_k,
            sparse_limit: self.sparse_limit,
            dense_limit: self.dense_limit,
            body_index_chars: self.body_index_chars,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hash.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_text_chars == 0 {
        bail!("embedding.max_text_chars must be > 0");
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama" | "hash") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate clustering
    if config.clustering.eps.is_nan() || config.clustering.eps <= 0.0 {
        bail!("clustering.eps must be > 0");
    }
    if config.clustering.min_pts < 1 {
        bail!("clustering.min_pts must be >= 1");
    }

    // Validate prompt
    if !(0.0..=1.0).contains(&config.prompt.default_threshold) {
        bail!("prompt.default_threshold must be in [0.0, 1.0]");
    }

    // Validate search
    if config.search.final_limit < 1 {
        bail!("search.final_limit must be >= 1");
    }
    if config.search.rrf_k.is_nan() || config.search.rrf_k < 0.0 {
        bail!("search.rrf_k must be >= 0");
    }

    Ok(config)
}
