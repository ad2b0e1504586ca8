//! In-memory BM25 index over email subjects and bodies.
//!
//! Subjects and bodies are indexed as two fields; a field's term frequency
//! and length are multiplied by its weight before the BM25 formula is
//! applied, so a subject hit counts twice as much as a body hit.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::embedding::plain_body;
use crate::models::Email;

/// Weight of subject terms relative to body terms.
pub const SUBJECT_WEIGHT: f64 = 2.0;
pub const BODY_WEIGHT: f64 = 1.0;

/// Bodies are truncated to this many characters before indexing.
pub const DEFAULT_BODY_INDEX_CHARS: usize = 5000;

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").expect("static regex"))
}

/// Lowercase, split on non-word characters, drop single-character tokens.
///
/// ```rust
/// use inbox_lens_core::lexical::tokenize;
///
/// assert_eq!(tokenize("Re: Q3 invoice #42, a"), vec!["re", "q3", "invoice", "42"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    non_word()
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// BM25 free parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug)]
struct IndexedDoc {
    /// Field-weighted term frequencies.
    tf: HashMap<String, f64>,
    /// Field-weighted length.
    len: f64,
}

/// A BM25 index built once over an ordered email list.
#[derive(Debug)]
pub struct LexicalIndex {
    ids: Vec<String>,
    docs: Vec<IndexedDoc>,
    df: HashMap<String, usize>,
    avg_len: f64,
    params: Bm25Params,
}

impl LexicalIndex {
    pub fn build(emails: &[Email], body_chars: usize) -> Self {
        Self::build_with_params(emails, body_chars, Bm25Params::default())
    }

    pub fn build_with_params(emails: &[Email], body_chars: usize, params: Bm25Params) -> Self {
        let mut ids = Vec::with_capacity(emails.len());
        let mut docs = Vec::with_capacity(emails.len());
        let mut df: HashMap<String, usize> = HashMap::new();

        for email in emails {
            let body: String = plain_body(email).chars().take(body_chars).collect();
            let subject_tokens = tokenize(&email.subject);
            let body_tokens = tokenize(&body);

            let mut tf: HashMap<String, f64> = HashMap::new();
            for t in &subject_tokens {
                *tf.entry(t.clone()).or_insert(0.0) += SUBJECT_WEIGHT;
            }
            for t in &body_tokens {
                *tf.entry(t.clone()).or_insert(0.0) += BODY_WEIGHT;
            }
            for term in tf.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }

            let len = SUBJECT_WEIGHT * subject_tokens.len() as f64
                + BODY_WEIGHT * body_tokens.len() as f64;
            ids.push(email.id.clone());
            docs.push(IndexedDoc { tf, len });
        }

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(|d| d.len).sum::<f64>() / docs.len() as f64
        };

        debug!(docs = docs.len(), terms = df.len(), "lexical index built");
        Self {
            ids,
            docs,
            df,
            avg_len,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.df.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score every document against `query`, best first, at most `limit`
    /// hits. Documents with no matching term are omitted; ties keep index
    /// order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let Bm25Params { k1, b } = self.params;
        let idfs: Vec<f64> = terms.iter().map(|t| self.idf(t)).collect();

        let mut hits: Vec<(usize, f64)> = self
            .docs
            .iter()
            .enumerate()
            .filter_map(|(idx, doc)| {
                let norm = if self.avg_len > 0.0 {
                    1.0 - b + b * doc.len / self.avg_len
                } else {
                    1.0
                };
                let score: f64 = terms
                    .iter()
                    .zip(&idfs)
                    .filter_map(|(t, idf)| {
                        doc.tf
                            .get(t)
                            .map(|&tf| idf * tf * (k1 + 1.0) / (tf + k1 * norm))
                    })
                    .sum();
                (score > 0.0).then_some((idx, score))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(limit);
        hits.into_iter()
            .map(|(idx, score)| (self.ids[idx].clone(), score))
            .collect()
    }
}

/// Owns one [`LexicalIndex`] and rebuilds it only when the ordered id list
/// of the indexed emails changes.
#[derive(Debug, Default)]
pub struct LexicalIndexCache {
    key: Vec<String>,
    index: Option<LexicalIndex>,
    builds: usize,
}

impl LexicalIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(&mut self, emails: &[Email], body_chars: usize) -> &LexicalIndex {
        let fresh = self.index.is_some()
            && self.key.len() == emails.len()
            && self.key.iter().zip(emails).all(|(k, e)| *k == e.id);
        if !fresh {
            self.key = emails.iter().map(|e| e.id.clone()).collect();
            self.builds += 1;
            self.index = Some(LexicalIndex::build(emails, body_chars));
        }
        self.index.get_or_insert_with(|| LexicalIndex::build(emails, body_chars))
    }

    /// How many times the index has been (re)built.
    pub fn build_count(&self) -> usize {
        self.builds
    }

    pub fn invalidate(&mut self) {
        self.index = None;
        self.key.clear();
    }
}
