//! Storage abstraction for Inbox Lens.
//!
//! Five narrow traits cover the persisted state: emails, embeddings, the
//! density-cluster snapshot, prompt clusters, and the projection snapshot.
//! [`Store`] is implemented for any type providing all five, so engines can
//! take a single generic parameter.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. A
//! missing value (`Ok(None)`) means "not computed yet", never an error.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Categories, EmbeddingMap, Email};
use crate::projection::ProjectionSnapshot;
use crate::prompt::PromptCluster;

/// A stored embedding and the provenance needed to detect staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub email_id: String,
    pub vector: Vec<f32>,
    pub model: String,
    /// SHA-256 hex of the text the vector was computed from.
    pub content_hash: String,
}

/// Provenance of a stored embedding, without the vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingStamp {
    pub model: String,
    pub content_hash: String,
}

#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Insert or update emails by id. Returns how many were written.
    async fn upsert_emails(&self, emails: &[Email]) -> Result<usize>;

    /// All emails in first-insertion order.
    async fn list_emails(&self) -> Result<Vec<Email>>;

    async fn get_email(&self, id: &str) -> Result<Option<Email>>;

    async fn count_emails(&self) -> Result<usize>;
}

#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Write a batch of embeddings atomically, replacing existing rows by id.
    async fn put_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()>;

    /// Replace every stored embedding with `records` atomically.
    async fn replace_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()>;

    async fn load_embeddings(&self) -> Result<EmbeddingMap>;

    /// `emailId -> stamp` for every stored embedding.
    async fn embedding_stamps(&self) -> Result<BTreeMap<String, EmbeddingStamp>>;

    async fn count_embeddings(&self) -> Result<usize>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn load_categories(&self) -> Result<Option<Categories>>;

    /// Replace the whole snapshot in one step; readers never see a mix.
    async fn replace_categories(&self, categories: &Categories) -> Result<()>;
}

#[async_trait]
pub trait PromptClusterStore: Send + Sync {
    /// Every prompt cluster keyed by slug.
    async fn list_prompt_clusters(&self) -> Result<BTreeMap<String, PromptCluster>>;

    async fn get_prompt_cluster(&self, slug: &str) -> Result<Option<PromptCluster>>;

    async fn put_prompt_cluster(&self, slug: &str, cluster: &PromptCluster) -> Result<()>;

    /// Returns `false` when the slug did not exist.
    async fn delete_prompt_cluster(&self, slug: &str) -> Result<bool>;
}

#[async_trait]
pub trait ProjectionStore: Send + Sync {
    async fn load_projection(&self) -> Result<Option<ProjectionSnapshot>>;

    async fn save_projection(&self, snapshot: &ProjectionSnapshot) -> Result<()>;
}

/// Every storage concern in one bound.
pub trait Store:
    EmailStore + EmbeddingStore + CategoryStore + PromptClusterStore + ProjectionStore
{
}

impl<T> Store for T where
    T: EmailStore + EmbeddingStore + CategoryStore + PromptClusterStore + ProjectionStore
{
}
