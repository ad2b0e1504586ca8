//! Composite operations that chain the core algorithms.
//!
//! These are pure with respect to storage: callers load inputs from a store,
//! run an operation, and persist the result only when it succeeded.

use tracing::{debug, info};

use crate::cluster::{expand_categories, ClusterParams, DensityClusterer};
use crate::embedding::{l2_normalize, EmbedItem, EmbeddingOracle};
use crate::error::{Error, Result};
use crate::models::{Categories, EmbeddingMap, Email, ThreadMembership};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::thread::{build_threads, thread_membership};

/// Embed `items` in batches of `batch_size`, returning unit-length vectors.
///
/// All or nothing: the first oracle failure aborts the whole run and no
/// partial map is returned. Every vector must share one dimensionality.
pub async fn compute_embeddings(
    oracle: &dyn EmbeddingOracle,
    items: &[EmbedItem],
    batch_size: usize,
    progress: &dyn ProgressSink,
) -> Result<EmbeddingMap> {
    let batch_size = batch_size.max(1);
    let total = items.len();
    let mut out = EmbeddingMap::new();
    let mut dims: Option<usize> = None;

    progress.report(ProgressEvent::new(Phase::Embedding, 0, total));
    for (batch_idx, batch) in items.chunks(batch_size).enumerate() {
        let vectors = oracle.embed_batch(batch).await?;
        for (id, mut v) in vectors {
            let expected = *dims.get_or_insert(v.len());
            if v.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: v.len(),
                });
            }
            l2_normalize(&mut v);
            out.insert(id, v);
        }
        let done = (batch_idx * batch_size + batch.len()).min(total);
        progress.report(ProgressEvent::new(Phase::Embedding, done, total));
        debug!(batch = batch_idx, done, total, "embedding batch complete");
    }
    Ok(out)
}

/// Thread the emails, cluster one vector per thread, and fan the result out.
///
/// Only threads whose representative has an embedding take part; members of
/// other threads stay unassigned.
pub fn run_clustering(
    emails: &[Email],
    embeddings: &EmbeddingMap,
    params: &ClusterParams,
    progress: &dyn ProgressSink,
) -> Categories {
    let threads = build_threads(emails);
    let membership: ThreadMembership = thread_membership(&threads)
        .into_iter()
        .filter(|(rep, _)| embeddings.contains_key(rep))
        .collect();
    let reps: EmbeddingMap = membership
        .keys()
        .filter_map(|rep| embeddings.get(rep).map(|v| (rep.clone(), v.clone())))
        .collect();

    let rep_categories = DensityClusterer::new(*params).cluster_with_progress(&reps, progress);
    let categories = expand_categories(rep_categories, &membership);

    info!(
        threads = threads.len(),
        representatives = reps.len(),
        clusters = categories.meta.len(),
        assigned = categories.assignments.len(),
        "clustering complete"
    );
    categories
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::is_unit_norm;
    use crate::models::NOISE;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScaledOracle;

    #[async_trait]
    impl EmbeddingOracle for ScaledOracle {
        fn model_name(&self) -> &str {
            "scaled"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 3.0])
                .collect())
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl EmbeddingOracle for FailingOracle {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::OracleUnavailable("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn items(n: usize) -> Vec<EmbedItem> {
        (0..n)
            .map(|i| EmbedItem {
                id: format!("e{i}"),
                text: "x".repeat(i + 1),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_vectors_are_unit_norm() {
        let map = compute_embeddings(&ScaledOracle, &items(5), 2, &NoProgress)
            .await
            .unwrap();
        assert_eq!(map.len(), 5);
        assert!(map.values().all(|v| is_unit_norm(v)));
    }

    #[tokio::test]
    async fn test_progress_reaches_total() {
        let recorder = Recorder::default();
        compute_embeddings(&ScaledOracle, &items(5), 2, &recorder)
            .await
            .unwrap();
        let events = recorder.0.lock().unwrap();
        let currents: Vec<u64> = events.iter().map(|e| e.current).collect();
        assert_eq!(currents, vec![0, 2, 4, 5]);
        assert!(events.last().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_oracle_failure_is_hard_error() {
        let err = compute_embeddings(&FailingOracle, &items(3), 8, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OracleUnavailable(_)));
    }

    #[test]
    fn test_run_clustering_expands_to_threads() {
        let mut emails = Vec::new();
        let mut embeddings = EmbeddingMap::new();
        for i in 0..10 {
            let mut root = Email::new(format!("root{i}"), format!("topic {i}"));
            root.message_id = format!("<r{i}>");
            root.date = Some(format!("2024-01-{:02}T00:00:00Z", i + 1));
            let mut reply = Email::new(format!("reply{i}"), format!("Re: topic {i}"));
            reply.in_reply_to = format!("<r{i}>");
            reply.date = Some(format!("2024-02-{:02}T00:00:00Z", i + 1));
            emails.push(root);
            emails.push(reply);
            let mut v = vec![1.0f32, 0.01 * i as f32];
            l2_normalize(&mut v);
            embeddings.insert(format!("reply{i}"), v);
        }
        let orphan = Email::new("orphan", "no vector");
        emails.push(orphan);

        let cats = run_clustering(&emails, &embeddings, &ClusterParams::default(), &NoProgress);
        assert_eq!(cats.assignments["root3"], "cluster-0");
        assert_eq!(cats.assignments["reply3"], "cluster-0");
        assert!(!cats.assignments.contains_key("orphan"));
        assert_eq!(cats.cluster_of("orphan"), NOISE);
        assert!(!cats.meta.contains_key(NOISE));
    }
}
