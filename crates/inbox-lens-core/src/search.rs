//! Hybrid retrieval: BM25 + dense similarity, fused with Reciprocal Rank Fusion.
//!
//! # Algorithm
//!
//! 1. Build (or reuse) the [`LexicalIndex`] for the ordered email list and
//!    take the top `sparse_limit` BM25 hits.
//! 2. When embeddings exist and an oracle is available, embed the query and
//!    rank embedded emails by cosine similarity, keeping positive scores and
//!    the top `dense_limit`.
//! 3. Fuse: `score(d) = Σ 1 / (k + rank + 1)` over the lists containing `d`,
//!    with 0-based ranks. With only one list this preserves its order.
//! 4. With no hits from either signal, fall back to a case-insensitive
//!    substring match over subject and body, in input order.
//! 5. Annotate every result with whichever dense and sparse scores it has.
//!
//! An oracle failure is not an error here: search degrades to lexical only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::{cosine_similarity, plain_body, EmbeddingOracle};
use crate::lexical::{LexicalIndexCache, DEFAULT_BODY_INDEX_CHARS};
use crate::models::{EmbeddingMap, Email};
use crate::progress::{NoProgress, Phase, ProgressEvent, ProgressSink};

/// Default RRF constant.
pub const RRF_K: f64 = 60.0;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub rrf_k: f64,
    /// Number of BM25 candidates fused.
    pub sparse_limit: usize,
    /// Number of dense candidates fused.
    pub dense_limit: usize,
    /// Bodies are truncated to this many characters before indexing.
    pub body_index_chars: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            rrf_k: RRF_K,
            sparse_limit: 30,
            dense_limit: 30,
            body_index_chars: DEFAULT_BODY_INDEX_CHARS,
        }
    }
}

/// One ranked hit. `rank` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub rank: usize,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f64>,
}

/// Fuse ranked id lists with Reciprocal Rank Fusion.
///
/// Returns `(id, score)` sorted by score descending; equal scores are
/// ordered by id.
pub fn rrf_fuse(lists: &[Vec<String>], k: f64) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        }
    }
    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

/// Case-insensitive substring match over subject and body, in input order.
pub fn substring_matches<'a>(query: &str, emails: &'a [Email]) -> Vec<&'a Email> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    emails
        .iter()
        .filter(|e| {
            e.subject.to_lowercase().contains(&needle)
                || plain_body(e).to_lowercase().contains(&needle)
        })
        .collect()
}

/// Search engine owning the lexical index cache.
#[derive(Debug, Default)]
pub struct HybridSearchEngine {
    params: SearchParams,
    cache: LexicalIndexCache,
}

impl HybridSearchEngine {
    pub fn new(params: SearchParams) -> Self {
        Self {
            params,
            cache: LexicalIndexCache::new(),
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Number of lexical index builds so far.
    pub fn index_builds(&self) -> usize {
        self.cache.build_count()
    }

    pub async fn search(
        &mut self,
        oracle: Option<&dyn EmbeddingOracle>,
        query: &str,
        emails: &[Email],
        embeddings: &EmbeddingMap,
    ) -> Vec<SearchResult> {
        self.search_with_progress(oracle, query, emails, embeddings, &NoProgress)
            .await
    }

    pub async fn search_with_progress(
        &mut self,
        oracle: Option<&dyn EmbeddingOracle>,
        query: &str,
        emails: &[Email],
        embeddings: &EmbeddingMap,
        progress: &dyn ProgressSink,
    ) -> Vec<SearchResult> {
        if query.trim().is_empty() || emails.is_empty() {
            return Vec::new();
        }
        let params = self.params;

        progress.report(ProgressEvent::new(Phase::Indexing, 0, 1));
        let index = self.cache.get_or_build(emails, params.body_index_chars);
        progress.report(ProgressEvent::new(Phase::Indexing, 1, 1));

        // All positive BM25 scores; the top `sparse_limit` are fused.
        let all_sparse = index.search(query, index.len());
        let sparse_ids: Vec<String> = all_sparse
            .iter()
            .take(params.sparse_limit)
            .map(|(id, _)| id.clone())
            .collect();
        let sparse_by_id: HashMap<&str, f64> = all_sparse
            .iter()
            .map(|(id, score)| (id.as_str(), *score))
            .collect();

        progress.report(ProgressEvent::new(Phase::Searching, 0, 2));
        let query_vec = match oracle {
            Some(oracle) if !embeddings.is_empty() => match oracle.embed(query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "query embedding failed; using lexical ranking only");
                    None
                }
            },
            _ => None,
        };

        let dense_by_id: HashMap<&str, f32> = match &query_vec {
            Some(q) => emails
                .iter()
                .filter_map(|e| {
                    embeddings
                        .get(&e.id)
                        .map(|v| (e.id.as_str(), cosine_similarity(q, v)))
                })
                .collect(),
            None => HashMap::new(),
        };
        let dense_ids: Vec<String> = {
            let mut ranked: Vec<(usize, &str, f32)> = emails
                .iter()
                .enumerate()
                .filter_map(|(idx, e)| {
                    dense_by_id
                        .get(e.id.as_str())
                        .filter(|sim| **sim > 0.0)
                        .map(|sim| (idx, e.id.as_str(), *sim))
                })
                .collect();
            ranked.sort_by(|a, b| {
                b.2.partial_cmp(&a.2)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
            ranked
                .into_iter()
                .take(params.dense_limit)
                .map(|(_, id, _)| id.to_string())
                .collect()
        };
        progress.report(ProgressEvent::new(Phase::Searching, 1, 2));

        let ordered: Vec<String> = match (dense_ids.is_empty(), sparse_ids.is_empty()) {
            (true, true) => substring_matches(query, emails)
                .into_iter()
                .map(|e| e.id.clone())
                .collect(),
            (false, true) => dense_ids.clone(),
            (true, false) => sparse_ids.clone(),
            (false, false) => rrf_fuse(&[dense_ids.clone(), sparse_ids.clone()], params.rrf_k)
                .into_iter()
                .map(|(id, _)| id)
                .collect(),
        };

        let results: Vec<SearchResult> = ordered
            .into_iter()
            .enumerate()
            .map(|(i, id)| SearchResult {
                dense_score: dense_by_id.get(id.as_str()).copied(),
                sparse_score: sparse_by_id.get(id.as_str()).copied(),
                rank: i + 1,
                id,
            })
            .collect();
        progress.report(ProgressEvent::new(Phase::Searching, 2, 2));

        debug!(
            query_len = query.len(),
            sparse = sparse_ids.len(),
            dense = dense_ids.len(),
            results = results.len(),
            "hybrid search complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn email(id: &str, subject: &str, body: &str) -> Email {
        let mut e = Email::new(id, subject);
        e.body = Some(body.to_string());
        e
    }

    /// Maps any text to a fixed vector.
    struct FixedOracle(Vec<f32>);

    #[async_trait]
    impl EmbeddingOracle for FixedOracle {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.0.len()
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct DownOracle;

    #[async_trait]
    impl EmbeddingOracle for DownOracle {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::OracleUnavailable("offline".into()))
        }
    }

    #[test]
    fn test_rrf_scores() {
        let both = rrf_fuse(&[ids(&["P"]), ids(&["P"])], RRF_K);
        assert!((both[0].1 - 2.0 / 61.0).abs() < 1e-12);

        let lexical_only = rrf_fuse(&[Vec::new(), ids(&["Q"])], RRF_K);
        assert!((lexical_only[0].1 - 1.0 / 61.0).abs() < 1e-12);

        let fused = rrf_fuse(&[ids(&["P"]), ids(&["P", "Q"])], RRF_K);
        assert_eq!(fused[0].0, "P");
        assert_eq!(fused[1].0, "Q");
    }

    #[test]
    fn test_rrf_single_list_keeps_order() {
        let fused = rrf_fuse(&[ids(&["c", "a", "b"])], RRF_K);
        let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_query() {
        let mut engine = HybridSearchEngine::default();
        let emails = vec![email("1", "hello", "")];
        let out = engine
            .search(None, "   ", &emails, &EmbeddingMap::new())
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_lexical_only_ranks_and_annotates() {
        let mut engine = HybridSearchEngine::new(SearchParams::default());
        let emails = vec![
            email("a", "Weekly sync", "agenda attached"),
            email("b", "Invoice March", "see the invoice"),
            email("c", "Re: lunch", "invoice question"),
        ];
        let out = engine
            .search(None, "invoice", &emails, &EmbeddingMap::new())
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "b");
        assert_eq!(out[0].rank, 1);
        assert_eq!(out[1].rank, 2);
        assert!(out.iter().all(|r| r.sparse_score.is_some()));
        assert!(out.iter().all(|r| r.dense_score.is_none()));
    }

    #[tokio::test]
    async fn test_substring_fallback() {
        let mut engine = HybridSearchEngine::default();
        let emails = vec![
            email("1", "Your invoices are ready", ""),
            email("2", "Holiday plans", ""),
            email("3", "RE: INVOICES overdue", ""),
        ];
        // "invoice" is a substring of "invoices" but not a BM25 token match.
        let out = engine
            .search(None, "invoice", &emails, &EmbeddingMap::new())
            .await;
        let got: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["1", "3"]);
        assert_eq!(out[1].rank, 2);
    }

    #[tokio::test]
    async fn test_dense_and_sparse_fused() {
        let mut engine = HybridSearchEngine::default();
        let emails = vec![
            email("p", "budget review", ""),
            email("q", "budget", "numbers"),
            email("r", "travel", ""),
        ];
        let mut vectors = EmbeddingMap::new();
        vectors.insert("p".into(), vec![1.0, 0.0]);
        vectors.insert("q".into(), vec![-1.0, 0.0]);
        vectors.insert("r".into(), vec![0.6, 0.8]);
        let oracle = FixedOracle(vec![1.0, 0.0]);

        let out = engine
            .search(Some(&oracle), "budget", &emails, &vectors)
            .await;
        let got: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        // p: dense #1 + sparse; r: dense #2 only; q: sparse only.
        assert_eq!(got[0], "p");
        assert_eq!(out.len(), 3);
        let q = out.iter().find(|r| r.id == "q").unwrap();
        assert!(q.sparse_score.is_some());
        assert_eq!(q.dense_score, Some(-1.0));
        let r = out.iter().find(|r| r.id == "r").unwrap();
        assert!(r.sparse_score.is_none());
        assert!((r.dense_score.unwrap() - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_oracle_failure_degrades_to_lexical() {
        let mut engine = HybridSearchEngine::default();
        let emails = vec![email("1", "invoice", ""), email("2", "other", "")];
        let mut vectors = EmbeddingMap::new();
        vectors.insert("1".into(), vec![1.0, 0.0]);
        let out = engine
            .search(Some(&DownOracle), "invoice", &emails, &vectors)
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "1");
        assert!(out[0].dense_score.is_none());
    }

    #[tokio::test]
    async fn test_index_reused_across_queries() {
        let mut engine = HybridSearchEngine::default();
        let emails = vec![email("1", "alpha", ""), email("2", "beta", "")];
        let none = EmbeddingMap::new();
        engine.search(None, "alpha", &emails, &none).await;
        engine.search(None, "beta", &emails, &none).await;
        assert_eq!(engine.index_builds(), 1);
        engine.search(None, "alpha", &emails[..1], &none).await;
        assert_eq!(engine.index_builds(), 2);
    }
}
