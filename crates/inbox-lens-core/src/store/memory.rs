//! In-memory [`Store`](super::Store) implementation for tests.
//!
//! Every collection sits behind its own `std::sync::RwLock`. Replacement
//! operations swap the whole collection under a single write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Categories, EmbeddingMap, Email};
use crate::projection::ProjectionSnapshot;
use crate::prompt::PromptCluster;

use super::{
    CategoryStore, EmailStore, EmbeddingRecord, EmbeddingStamp, EmbeddingStore,
    ProjectionStore, PromptClusterStore,
};

#[derive(Default)]
struct EmailTable {
    order: Vec<String>,
    by_id: HashMap<String, Email>,
}

/// In-memory store for tests and embedding in other hosts.
#[derive(Default)]
pub struct InMemoryStore {
    emails: RwLock<EmailTable>,
    embeddings: RwLock<BTreeMap<String, EmbeddingRecord>>,
    categories: RwLock<Option<Categories>>,
    prompt_clusters: RwLock<BTreeMap<String, PromptCluster>>,
    projection: RwLock<Option<ProjectionSnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl EmailStore for InMemoryStore {
    async fn upsert_emails(&self, emails: &[Email]) -> Result<usize> {
        let mut table = write(&self.emails)?;
        for email in emails {
            if !table.by_id.contains_key(&email.id) {
                table.order.push(email.id.clone());
            }
            table.by_id.insert(email.id.clone(), email.clone());
        }
        Ok(emails.len())
    }

    async fn list_emails(&self) -> Result<Vec<Email>> {
        let table = read(&self.emails)?;
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect())
    }

    async fn get_email(&self, id: &str) -> Result<Option<Email>> {
        Ok(read(&self.emails)?.by_id.get(id).cloned())
    }

    async fn count_emails(&self) -> Result<usize> {
        Ok(read(&self.emails)?.order.len())
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryStore {
    async fn put_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let mut stored = write(&self.embeddings)?;
        for r in records {
            stored.insert(r.email_id.clone(), r.clone());
        }
        Ok(())
    }

    async fn replace_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let fresh: BTreeMap<String, EmbeddingRecord> = records
            .iter()
            .map(|r| (r.email_id.clone(), r.clone()))
            .collect();
        *write(&self.embeddings)? = fresh;
        Ok(())
    }

    async fn load_embeddings(&self) -> Result<EmbeddingMap> {
        Ok(read(&self.embeddings)?
            .iter()
            .map(|(id, r)| (id.clone(), r.vector.clone()))
            .collect())
    }

    async fn embedding_stamps(&self) -> Result<BTreeMap<String, EmbeddingStamp>> {
        Ok(read(&self.embeddings)?
            .iter()
            .map(|(id, r)| {
                (
                    id.clone(),
                    EmbeddingStamp {
                        model: r.model.clone(),
                        content_hash: r.content_hash.clone(),
                    },
                )
            })
            .collect())
    }

    async fn count_embeddings(&self) -> Result<usize> {
        Ok(read(&self.embeddings)?.len())
    }
}

#[async_trait]
impl CategoryStore for InMemoryStore {
    async fn load_categories(&self) -> Result<Option<Categories>> {
        Ok(read(&self.categories)?.clone())
    }

    async fn replace_categories(&self, categories: &Categories) -> Result<()> {
        *write(&self.categories)? = Some(categories.clone());
        Ok(())
    }
}

#[async_trait]
impl PromptClusterStore for InMemoryStore {
    async fn list_prompt_clusters(&self) -> Result<BTreeMap<String, PromptCluster>> {
        Ok(read(&self.prompt_clusters)?.clone())
    }

    async fn get_prompt_cluster(&self, slug: &str) -> Result<Option<PromptCluster>> {
        Ok(read(&self.prompt_clusters)?.get(slug).cloned())
    }

    async fn put_prompt_cluster(&self, slug: &str, cluster: &PromptCluster) -> Result<()> {
        write(&self.prompt_clusters)?.insert(slug.to_string(), cluster.clone());
        Ok(())
    }

    async fn delete_prompt_cluster(&self, slug: &str) -> Result<bool> {
        Ok(write(&self.prompt_clusters)?.remove(slug).is_some())
    }
}

#[async_trait]
impl ProjectionStore for InMemoryStore {
    async fn load_projection(&self) -> Result<Option<ProjectionSnapshot>> {
        Ok(read(&self.projection)?.clone())
    }

    async fn save_projection(&self, snapshot: &ProjectionSnapshot) -> Result<()> {
        *write(&self.projection)? = Some(snapshot.clone());
        Ok(())
    }
}
