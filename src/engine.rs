//! Application engine.
//!
//! [`Engine`] wires a [`Store`], an [`EmbeddingOracle`] and the configuration
//! to the core algorithms. Each class of long operation holds a lease for its
//! duration; a second concurrent request of the same class fails fast with
//! [`Error::Busy`]. Results are persisted only after a run succeeds, so a
//! failed run leaves stored state untouched.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::info;

use inbox_lens_core::embedding::{text_for_embedding, EmbedItem, EmbeddingOracle};
use inbox_lens_core::error::Operation;
use inbox_lens_core::models::{Categories, Email, Thread};
use inbox_lens_core::pipeline::{compute_embeddings, run_clustering};
use inbox_lens_core::progress::{ProgressEvent, ProgressSink};
use inbox_lens_core::projection::{fit_projection_with_progress, project_map, ProjectionSnapshot};
use inbox_lens_core::prompt::{score_against_prompt_with_progress, unique_slug, PromptCluster};
use inbox_lens_core::search::{HybridSearchEngine, SearchResult};
use inbox_lens_core::store::{EmbeddingRecord, Store};
use inbox_lens_core::thread::build_threads;
use inbox_lens_core::Error;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_oracle, hash_text, DisabledOracle};
use crate::progress::{ChannelProgress, ProgressMode};
use crate::sqlite_store::SqliteStore;

/// One lease per class of long operation.
#[derive(Default)]
struct Leases {
    embedding: Mutex<()>,
    clustering: Mutex<()>,
    projection: Mutex<()>,
    prompt_scoring: Mutex<()>,
    search: Mutex<()>,
}

impl Leases {
    fn acquire(&self, op: Operation) -> Result<MutexGuard<'_, ()>, Error> {
        let lock = match op {
            Operation::Embedding => &self.embedding,
            Operation::Clustering => &self.clustering,
            Operation::Projection => &self.projection,
            Operation::PromptScoring => &self.prompt_scoring,
            Operation::Search => &self.search,
        };
        lock.try_lock().map_err(|_| Error::Busy(op))
    }
}

/// Outcome of an embedding run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    /// Emails whose vector is missing or stale (before `limit`).
    pub pending: usize,
    pub embedded: usize,
}

/// Outcome of `project update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectUpdate {
    pub projected: usize,
    pub total_points: usize,
}

pub struct Engine<S: Store> {
    store: S,
    oracle: Box<dyn EmbeddingOracle>,
    config: Config,
    search: Mutex<HybridSearchEngine>,
    leases: Leases,
    progress: ChannelProgress,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S, oracle: Box<dyn EmbeddingOracle>, config: Config) -> Self {
        let search = HybridSearchEngine::new(config.search.params());
        Self {
            store,
            oracle,
            config,
            search: Mutex::new(search),
            leases: Leases::default(),
            progress: ChannelProgress::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn oracle(&self) -> &dyn EmbeddingOracle {
        self.oracle.as_ref()
    }

    /// Latest progress tick of whichever operation is running.
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<ProgressEvent>> {
        self.progress.subscribe()
    }

    fn sink(&self) -> &dyn ProgressSink {
        &self.progress
    }

    // ============ Emails & threads ============

    pub async fn import(&self, emails: &[Email]) -> Result<usize> {
        let n = self.store.upsert_emails(emails).await?;
        info!(imported = n, "emails imported");
        Ok(n)
    }

    pub async fn threads(&self) -> Result<Vec<Thread>> {
        let emails = self.store.list_emails().await?;
        Ok(build_threads(&emails))
    }

    // ============ Embeddings ============

    fn embed_item(&self, email: &Email) -> (EmbedItem, String) {
        let text = text_for_embedding(email, self.config.embedding.max_text_chars);
        let hash = hash_text(&text);
        (
            EmbedItem {
                id: email.id.clone(),
                text,
            },
            hash,
        )
    }

    /// Embed emails whose vector is missing, was made by another model, or
    /// was made from different text.
    pub async fn embed_pending(
        &self,
        limit: Option<usize>,
        batch_size: Option<usize>,
        dry_run: bool,
    ) -> Result<EmbedReport> {
        let _lease = self.leases.acquire(Operation::Embedding)?;
        let model = self.oracle.model_name().to_string();
        let stamps = self.store.embedding_stamps().await?;
        let emails = self.store.list_emails().await?;

        let mut pending: Vec<(EmbedItem, String)> = emails
            .iter()
            .map(|e| self.embed_item(e))
            .filter(|(item, hash)| match stamps.get(&item.id) {
                Some(stamp) => stamp.model != model || &stamp.content_hash != hash,
                None => true,
            })
            .collect();
        let report_pending = pending.len();
        if let Some(limit) = limit {
            pending.truncate(limit);
        }

        if dry_run || pending.is_empty() {
            return Ok(EmbedReport {
                pending: report_pending,
                embedded: 0,
            });
        }

        let records = self.compute_records(&pending, batch_size).await?;
        self.store
            .put_embeddings(&records)
            .await
            .context("Failed to store embeddings")?;
        info!(embedded = records.len(), model = %model, "embeddings stored");
        Ok(EmbedReport {
            pending: report_pending,
            embedded: records.len(),
        })
    }

    /// Recompute every embedding. Existing vectors stay in place until the
    /// full new set has been computed, then are replaced in one step.
    pub async fn embed_rebuild(&self, batch_size: Option<usize>) -> Result<EmbedReport> {
        let _lease = self.leases.acquire(Operation::Embedding)?;
        let emails = self.store.list_emails().await?;
        let items: Vec<(EmbedItem, String)> = emails.iter().map(|e| self.embed_item(e)).collect();

        let records = self.compute_records(&items, batch_size).await?;
        self.store
            .replace_embeddings(&records)
            .await
            .context("Failed to replace embeddings")?;
        info!(embedded = records.len(), "embeddings rebuilt");
        Ok(EmbedReport {
            pending: items.len(),
            embedded: records.len(),
        })
    }

    async fn compute_records(
        &self,
        items: &[(EmbedItem, String)],
        batch_size: Option<usize>,
    ) -> Result<Vec<EmbeddingRecord>> {
        let batch_size = batch_size.unwrap_or(self.config.embedding.batch_size);
        let embed_items: Vec<EmbedItem> = items.iter().map(|(item, _)| item.clone()).collect();
        let mut vectors =
            compute_embeddings(self.oracle.as_ref(), &embed_items, batch_size, self.sink()).await?;

        let model = self.oracle.model_name();
        Ok(items
            .iter()
            .filter_map(|(item, hash)| {
                vectors.remove(&item.id).map(|vector| EmbeddingRecord {
                    email_id: item.id.clone(),
                    vector,
                    model: model.to_string(),
                    content_hash: hash.clone(),
                })
            })
            .collect())
    }

    // ============ Density clusters ============

    /// Recluster thread representatives and replace the stored assignments.
    pub async fn recluster(&self) -> Result<Categories> {
        let _lease = self.leases.acquire(Operation::Clustering)?;
        let emails = self.store.list_emails().await?;
        let embeddings = self.store.load_embeddings().await?;
        let categories = run_clustering(
            &emails,
            &embeddings,
            &self.config.clustering.params(),
            self.sink(),
        );
        self.store
            .replace_categories(&categories)
            .await
            .context("Failed to store cluster assignments")?;
        Ok(categories)
    }

    pub async fn categories(&self) -> Result<Option<Categories>> {
        Ok(self.store.load_categories().await?)
    }

    // ============ Prompt clusters ============

    /// Score `prompt` against every stored embedding and persist the cluster
    /// under a fresh slug derived from `label`.
    pub async fn create_prompt_cluster(
        &self,
        label: &str,
        prompt: &str,
        threshold: Option<f32>,
    ) -> Result<(String, PromptCluster)> {
        let threshold = threshold.unwrap_or(self.config.prompt.default_threshold);
        inbox_lens_core::prompt::validate_threshold(threshold)?;

        let _lease = self.leases.acquire(Operation::PromptScoring)?;
        let existing = self.store.list_prompt_clusters().await?;
        let embeddings = self.store.load_embeddings().await?;
        let scored =
            score_against_prompt_with_progress(self.oracle.as_ref(), prompt, &embeddings, self.sink())
                .await?;

        let order = existing
            .values()
            .map(|c| c.order + 1)
            .max()
            .unwrap_or(0);
        let cluster = PromptCluster::new(label, prompt, threshold, scored, order)?;
        let slug = unique_slug(label, |s| existing.contains_key(s));
        self.store.put_prompt_cluster(&slug, &cluster).await?;
        info!(slug = %slug, members = cluster.members().len(), "prompt cluster created");
        Ok((slug, cluster))
    }

    pub async fn prompt_cluster(&self, slug: &str) -> Result<PromptCluster> {
        self.store
            .get_prompt_cluster(slug)
            .await?
            .ok_or_else(|| Error::NotFound(format!("prompt cluster '{}'", slug)).into())
    }

    pub async fn prompt_clusters(&self) -> Result<BTreeMap<String, PromptCluster>> {
        Ok(self.store.list_prompt_clusters().await?)
    }

    /// Members of `slug`, honouring `[prompt] fallback_top_n`.
    pub async fn prompt_members(&self, slug: &str) -> Result<BTreeSet<String>> {
        let cluster = self.prompt_cluster(slug).await?;
        Ok(cluster.members_with_fallback(self.config.prompt.fallback_top_n))
    }

    /// Change the threshold without touching the oracle.
    ///
    /// Edits share the prompt-scoring lease, so an edit issued while a
    /// rescore is in flight fails with [`Error::Busy`] instead of being
    /// overwritten when the rescore writes back.
    pub async fn set_prompt_threshold(&self, slug: &str, threshold: f32) -> Result<PromptCluster> {
        let _lease = self.leases.acquire(Operation::PromptScoring)?;
        let mut cluster = self.prompt_cluster(slug).await?;
        cluster.set_threshold(threshold)?;
        self.store.put_prompt_cluster(slug, &cluster).await?;
        Ok(cluster)
    }

    pub async fn set_prompt_override(
        &self,
        slug: &str,
        email_id: &str,
        state: Option<bool>,
    ) -> Result<PromptCluster> {
        let _lease = self.leases.acquire(Operation::PromptScoring)?;
        let mut cluster = self.prompt_cluster(slug).await?;
        cluster.set_override(email_id, state);
        self.store.put_prompt_cluster(slug, &cluster).await?;
        Ok(cluster)
    }

    /// Re-embed the prompt and rescore against the current embeddings.
    pub async fn rescore_prompt_cluster(&self, slug: &str) -> Result<PromptCluster> {
        let _lease = self.leases.acquire(Operation::PromptScoring)?;
        let mut cluster = self.prompt_cluster(slug).await?;
        let embeddings = self.store.load_embeddings().await?;
        let scored = score_against_prompt_with_progress(
            self.oracle.as_ref(),
            &cluster.prompt,
            &embeddings,
            self.sink(),
        )
        .await?;
        cluster.rescore(scored);
        self.store.put_prompt_cluster(slug, &cluster).await?;
        Ok(cluster)
    }

    pub async fn delete_prompt_cluster(&self, slug: &str) -> Result<()> {
        let _lease = self.leases.acquire(Operation::PromptScoring)?;
        if !self.store.delete_prompt_cluster(slug).await? {
            return Err(Error::NotFound(format!("prompt cluster '{}'", slug)).into());
        }
        Ok(())
    }

    // ============ Projection ============

    /// Fit a fresh projection over every stored embedding and persist it.
    pub async fn project_fit(&self) -> Result<ProjectionSnapshot> {
        let _lease = self.leases.acquire(Operation::Projection)?;
        let embeddings = self.store.load_embeddings().await?;
        let snapshot = fit_projection_with_progress(&embeddings, self.sink())?;
        self.store.save_projection(&snapshot).await?;
        info!(points = snapshot.points.len(), "projection fitted");
        Ok(snapshot)
    }

    /// Project embeddings that have no point yet through the stored model.
    pub async fn project_update(&self) -> Result<ProjectUpdate> {
        let _lease = self.leases.acquire(Operation::Projection)?;
        let mut snapshot = self
            .store
            .load_projection()
            .await?
            .unwrap_or_default();
        let Some(model) = snapshot.model.as_ref() else {
            return Err(Error::NotFound(
                "projection model (run `lens project fit` first)".to_string(),
            )
            .into());
        };

        let mut embeddings = self.store.load_embeddings().await?;
        embeddings.retain(|id, _| !snapshot.points.contains_key(id));
        let fresh = project_map(model, &embeddings)?;
        let projected = fresh.len();
        snapshot.points.extend(fresh);
        self.store.save_projection(&snapshot).await?;
        Ok(ProjectUpdate {
            projected,
            total_points: snapshot.points.len(),
        })
    }

    pub async fn projection(&self) -> Result<Option<ProjectionSnapshot>> {
        Ok(self.store.load_projection().await?)
    }

    // ============ Search ============

    /// Hybrid lexical + semantic search over every stored email.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let _lease = self.leases.acquire(Operation::Search)?;
        let emails = self.store.list_emails().await?;
        let embeddings = self.store.load_embeddings().await?;
        let oracle = self
            .config
            .embedding
            .is_enabled()
            .then_some(self.oracle.as_ref());

        let mut engine = self.search.lock().await;
        Ok(engine
            .search_with_progress(oracle, query, &emails, &embeddings, self.sink())
            .await)
    }
}

/// A SQLite-backed engine plus the task rendering its progress, as used by
/// one CLI command.
pub struct Session {
    pub engine: Engine<SqliteStore>,
    renderer: Option<tokio::task::JoinHandle<()>>,
}

impl Session {
    /// Connect to the database. Commands that never embed pass
    /// `needs_oracle = false` and get a [`DisabledOracle`], so provider
    /// credentials are only required where they are used.
    pub async fn open(config: &Config, mode: ProgressMode, needs_oracle: bool) -> Result<Self> {
        let oracle: Box<dyn EmbeddingOracle> = if needs_oracle {
            create_oracle(&config.embedding)?
        } else {
            Box::new(DisabledOracle)
        };
        let pool = db::connect(config).await?;
        let engine = Engine::new(SqliteStore::new(pool), oracle, config.clone());
        let renderer = mode.spawn(engine.subscribe_progress());
        Ok(Self { engine, renderer })
    }

    /// Close the pool and wait for the renderer to drain the last tick.
    pub async fn finish(self) {
        let Session { engine, renderer } = self;
        engine.store.close().await;
        drop(engine);
        if let Some(handle) = renderer {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::embedding::{DisabledOracle, HashOracle};
    use async_trait::async_trait;
    use inbox_lens_core::models::NOISE;
    use inbox_lens_core::store::memory::InMemoryStore;
    use inbox_lens_core::store::{CategoryStore, EmbeddingStore, PromptClusterStore};
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn hash_config() -> Config {
        parse_config(
            "[embedding]\nprovider = \"hash\"\nmodel = \"hash-128\"\ndims = 128\n\
             [clustering]\nmin_cluster_size = 2\n",
        )
        .unwrap()
    }

    fn engine() -> Engine<InMemoryStore> {
        Engine::new(
            InMemoryStore::new(),
            Box::new(HashOracle::new("hash-128", 128)),
            hash_config(),
        )
    }

    fn mail(id: &str, subject: &str, body: &str) -> Email {
        let mut e = Email::new(id, subject);
        e.body = Some(body.to_string());
        e.message_id = format!("<{id}@test>");
        e
    }

    fn corpus() -> Vec<Email> {
        vec![
            mail("inv1", "Invoice 1001 overdue", "payment invoice overdue reminder"),
            mail("inv2", "Invoice 1002 overdue", "payment invoice overdue reminder"),
            mail("inv3", "Invoice 1003 overdue", "payment invoice overdue reminder"),
            mail("hike", "Weekend hiking trip", "trail photos from the mountain"),
        ]
    }

    #[tokio::test]
    async fn embed_pending_skips_fresh_vectors() {
        let engine = engine();
        engine.import(&corpus()).await.unwrap();

        let first = engine.embed_pending(None, None, false).await.unwrap();
        assert_eq!(first, EmbedReport { pending: 4, embedded: 4 });

        let second = engine.embed_pending(None, None, false).await.unwrap();
        assert_eq!(second, EmbedReport { pending: 0, embedded: 0 });

        let mut edited = corpus()[0].clone();
        edited.subject = "Invoice 1001 paid".into();
        engine.import(&[edited]).await.unwrap();
        let third = engine.embed_pending(None, None, true).await.unwrap();
        assert_eq!(third, EmbedReport { pending: 1, embedded: 0 });
    }

    #[tokio::test]
    async fn failing_oracle_leaves_embeddings_untouched() {
        let store = InMemoryStore::new();
        store
            .put_embeddings(&[EmbeddingRecord {
                email_id: "inv1".into(),
                vector: vec![1.0, 0.0],
                model: "old".into(),
                content_hash: "x".into(),
            }])
            .await
            .unwrap();
        let engine = Engine::new(store, Box::new(DisabledOracle), hash_config());
        engine.import(&corpus()).await.unwrap();

        let err = engine.embed_rebuild(None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::OracleUnavailable(_))
        ));
        let stored = engine.store().load_embeddings().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored["inv1"], vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn recluster_replaces_previous_assignments() {
        let engine = engine();
        let mut stale = Categories::default();
        stale.assignments.insert("gone".into(), "cluster-9".into());
        engine.store().replace_categories(&stale).await.unwrap();

        engine.import(&corpus()).await.unwrap();
        engine.embed_pending(None, None, false).await.unwrap();
        let cats = engine.recluster().await.unwrap();

        assert!(!cats.assignments.contains_key("gone"));
        assert_eq!(cats.assignments["inv1"], cats.assignments["inv2"]);
        assert_ne!(cats.assignments["inv1"], NOISE);
        assert_eq!(cats.cluster_of("hike"), NOISE);
        assert_eq!(engine.categories().await.unwrap(), Some(cats));
    }

    #[tokio::test]
    async fn prompt_cluster_lifecycle() {
        let engine = engine();
        engine.import(&corpus()).await.unwrap();
        engine.embed_pending(None, None, false).await.unwrap();

        let (slug, cluster) = engine
            .create_prompt_cluster("Bills", "payment invoice overdue reminder", Some(0.5))
            .await
            .unwrap();
        assert_eq!(slug, "bills");
        assert!(cluster.members().contains("inv1"));
        assert!(!cluster.members().contains("hike"));

        engine
            .set_prompt_override(&slug, "hike", Some(true))
            .await
            .unwrap();
        assert!(engine.prompt_members(&slug).await.unwrap().contains("hike"));

        let (second, _) = engine
            .create_prompt_cluster("Bills", "invoice", None)
            .await
            .unwrap();
        assert_eq!(second, "bills-2");

        let err = engine.set_prompt_threshold(&slug, 2.0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidThreshold(_))
        ));

        engine.delete_prompt_cluster(&slug).await.unwrap();
        let err = engine.prompt_cluster(&slug).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn project_update_requires_fit() {
        let engine = engine();
        engine.import(&corpus()).await.unwrap();
        engine.embed_pending(None, None, false).await.unwrap();
        assert!(engine.project_update().await.is_err());

        let snapshot = engine.project_fit().await.unwrap();
        assert_eq!(snapshot.points.len(), 4);

        engine
            .import(&[mail("new", "Invoice 1004", "payment invoice")])
            .await
            .unwrap();
        engine.embed_pending(None, None, false).await.unwrap();
        let update = engine.project_update().await.unwrap();
        assert_eq!(update, ProjectUpdate { projected: 1, total_points: 5 });
        let stored = engine.projection().await.unwrap().unwrap();
        assert!(stored.points.contains_key("new"));
    }

    #[tokio::test]
    async fn search_ranks_matching_subject_first() {
        let engine = engine();
        engine.import(&corpus()).await.unwrap();
        engine.embed_pending(None, None, false).await.unwrap();
        let results = engine.search("hiking").await.unwrap();
        assert_eq!(results[0].id, "hike");
        assert!(results[0].sparse_score.is_some());
    }

    /// Oracle that parks inside `embed_texts` until released.
    struct GateOracle {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl EmbeddingOracle for GateOracle {
        fn model_name(&self) -> &str {
            "gate"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> inbox_lens_core::Result<Vec<Vec<f32>>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn concurrent_embedding_run_is_busy() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let engine = Arc::new(Engine::new(
            InMemoryStore::new(),
            Box::new(GateOracle {
                entered: entered.clone(),
                release: release.clone(),
            }),
            hash_config(),
        ));
        engine.import(&corpus()).await.unwrap();

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.embed_pending(None, None, false).await })
        };
        entered.notified().await;

        let err = engine.embed_pending(None, None, false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Busy(Operation::Embedding))
        ));
        // Other operation classes are not blocked.
        assert!(engine.threads().await.is_ok());

        release.notify_one();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.embedded, 4);
    }

    #[tokio::test]
    async fn recluster_while_clustering_is_busy() {
        let engine = engine();
        engine.import(&corpus()).await.unwrap();
        engine.embed_pending(None, None, false).await.unwrap();

        let held = engine.leases.acquire(Operation::Clustering).unwrap();
        let err = engine.recluster().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Busy(Operation::Clustering))
        ));
        drop(held);
        assert!(engine.recluster().await.is_ok());
    }

    #[tokio::test]
    async fn prompt_edits_during_rescore_are_rejected() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let engine = Arc::new(Engine::new(
            InMemoryStore::new(),
            Box::new(GateOracle {
                entered: entered.clone(),
                release: release.clone(),
            }),
            hash_config(),
        ));
        let cluster = PromptCluster::new("Bills", "invoice", 0.3, Vec::new(), 0).unwrap();
        engine
            .store()
            .put_prompt_cluster("bills", &cluster)
            .await
            .unwrap();

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.rescore_prompt_cluster("bills").await })
        };
        entered.notified().await;

        let err = engine.set_prompt_threshold("bills", 0.9).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Busy(Operation::PromptScoring))
        ));
        let err = engine
            .set_prompt_override("bills", "inv1", Some(true))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Busy(_))));

        release.notify_one();
        running.await.unwrap().unwrap();

        engine.set_prompt_threshold("bills", 0.9).await.unwrap();
        let stored = engine.prompt_cluster("bills").await.unwrap();
        assert_eq!(stored.threshold, 0.9);
    }

    #[tokio::test]
    async fn prompt_order_stays_unique_after_delete() {
        let engine = engine();
        engine.import(&corpus()).await.unwrap();
        engine.embed_pending(None, None, false).await.unwrap();

        let (a, _) = engine.create_prompt_cluster("A", "invoice", None).await.unwrap();
        engine.create_prompt_cluster("B", "hiking", None).await.unwrap();
        engine.delete_prompt_cluster(&a).await.unwrap();
        let (_, c) = engine.create_prompt_cluster("C", "trail", None).await.unwrap();

        let orders: BTreeSet<u32> = engine
            .prompt_clusters()
            .await
            .unwrap()
            .values()
            .map(|p| p.order)
            .collect();
        assert_eq!(orders.len(), 2);
        assert_eq!(c.order, 2);
    }
}
