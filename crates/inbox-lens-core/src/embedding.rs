//! Embedding oracle trait and vector utilities.
//!
//! Defines the [`EmbeddingOracle`] trait that every embedding backend
//! implements, plus pure helpers for similarity, normalization, neighbor
//! lookup, blob serialization, and deriving the text an email is embedded
//! from.
//!
//! Concrete oracles (OpenAI, Ollama, fastembed, hashing) live in the
//! `inbox-lens` app crate.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::models::{EmbeddingMap, Email, Scored};

/// Tolerance used when deciding whether a vector already has unit length.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// Text handed to the oracle, keyed by the id its vector should be stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedItem {
    pub id: String,
    pub text: String,
}

/// An opaque text → vector model.
///
/// Implementations return unit-normalized vectors of a fixed length and map
/// any backend failure to [`Error::OracleUnavailable`](crate::Error::OracleUnavailable).
/// Callers truncate inputs before passing them in.
#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_texts(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| {
            crate::Error::OracleUnavailable("empty embedding response".to_string())
        })
    }

    /// Embed keyed items, returning `id -> vector`.
    async fn embed_batch(&self, items: &[EmbedItem]) -> Result<EmbeddingMap> {
        let texts: Vec<String> = items.iter().map(|i| i.text.clone()).collect();
        let vectors = self.embed_texts(&texts).await?;
        if vectors.len() != items.len() {
            return Err(crate::Error::OracleUnavailable(format!(
                "oracle returned {} vectors for {} inputs",
                vectors.len(),
                items.len()
            )));
        }
        Ok(items
            .iter()
            .zip(vectors)
            .map(|(item, v)| (item.id.clone(), v))
            .collect::<BTreeMap<_, _>>())
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use inbox_lens_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Whether `v` has unit length within [`UNIT_NORM_TOLERANCE`].
pub fn is_unit_norm(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Unit-norm inputs reduce to a plain dot
/// product; anything else is normalized on the fly. Returns `0.0` for empty
/// vectors, zero vectors, or vectors of different lengths.
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

    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    let unit = (norm_a - 1.0).abs() <= UNIT_NORM_TOLERANCE
        && (norm_b - 1.0).abs() <= UNIT_NORM_TOLERANCE;
    let sim = if unit {
        dot
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    };
    sim.clamp(-1.0, 1.0)
}

/// Score every vector against `query`, most similar first. Ties break by id.
pub fn rank_by_similarity(query: &[f32], vectors: &EmbeddingMap) -> Vec<Scored> {
    let mut scored: Vec<Scored> = vectors
        .iter()
        .map(|(id, v)| Scored {
            id: id.clone(),
            sim: cosine_similarity(query, v),
        })
        .collect();
    scored.sort_by(|a, b| {
        b.sim
            .partial_cmp(&a.sim)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored
}

/// The `k` vectors most similar to `query`.
pub fn nearest(query: &[f32], vectors: &EmbeddingMap, k: usize) -> Vec<Scored> {
    let mut ranked = rank_by_similarity(query, vectors);
    ranked.truncate(k);
    ranked
}

/// The `k` vectors least similar to `query`, least similar first.
pub fn furthest(query: &[f32], vectors: &EmbeddingMap, k: usize) -> Vec<Scored> {
    let mut ranked = rank_by_similarity(query, vectors);
    ranked.reverse();
    ranked.truncate(k);
    ranked
}

/// Render width handed to `html2text`; wide enough that paragraphs are not
/// wrapped before whitespace is collapsed.
const HTML_RENDER_WIDTH: usize = 10_000;

fn script_blocks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("static regex")
    })
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Render an HTML body to a single line of plain text, entities decoded.
pub fn strip_html(html: &str) -> String {
    let without_blocks = script_blocks().replace_all(html, "");
    let text = html2text::from_read_with_decorator(
        without_blocks.as_bytes(),
        HTML_RENDER_WIDTH,
        html2text::render::text_renderer::TrivialDecorator::new(),
    );
    whitespace().replace_all(&text, " ").trim().to_string()
}

/// Plain-text body of an email, HTML stripped when flagged.
pub fn plain_body(email: &Email) -> String {
    match email.body.as_deref() {
        Some(body) if email.body_is_html => strip_html(body),
        Some(body) => body.to_string(),
        None => String::new(),
    }
}

/// Text an email is embedded from: subject + plain body, truncated to
/// `max_chars` characters. Never empty.
pub fn text_for_embedding(email: &Email, max_chars: usize) -> String {
    let subject = email.subject.split_whitespace().collect::<Vec<_>>().join(" ");
    let combined = format!("{} {}", subject, plain_body(email));
    let text: String = combined.trim().chars().take(max_chars).collect();
    if text.is_empty() {
        "(no content)".to_string()
    } else {
        text
    }
}
