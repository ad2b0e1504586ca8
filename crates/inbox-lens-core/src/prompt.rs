//! Prompt-defined "soft" clusters.
//!
//! A prompt cluster embeds a free-text prompt once, scores every stored
//! vector against it, and keeps the full scored list. Membership is derived
//! on read from the threshold and the manual overrides, so adjusting either
//! never needs another oracle call.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{rank_by_similarity, EmbeddingOracle};
use crate::error::{Error, Result};
use crate::models::{EmbeddingMap, Scored};
use crate::progress::{NoProgress, Phase, ProgressEvent, ProgressSink};

/// Threshold used when the caller does not pick one.
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// Embed `prompt` and score it against every vector, most similar first.
///
/// No filtering happens here; an empty vector set yields an empty list.
pub async fn score_against_prompt(
    oracle: &dyn EmbeddingOracle,
    prompt: &str,
    vectors: &EmbeddingMap,
) -> Result<Vec<Scored>> {
    score_against_prompt_with_progress(oracle, prompt, vectors, &NoProgress).await
}

pub async fn score_against_prompt_with_progress(
    oracle: &dyn EmbeddingOracle,
    prompt: &str,
    vectors: &EmbeddingMap,
    progress: &dyn ProgressSink,
) -> Result<Vec<Scored>> {
    progress.report(ProgressEvent::new(Phase::Scoring, 0, vectors.len()));
    let query = oracle.embed(prompt).await?;
    let scored = rank_by_similarity(&query, vectors);
    progress.report(ProgressEvent::new(
        Phase::Scoring,
        vectors.len(),
        vectors.len(),
    ));
    debug!(scored = scored.len(), "prompt scored");
    Ok(scored)
}

/// Ids that belong to the cluster at `threshold`.
///
/// An id is a member when its override is `true`, or when it has no override
/// and `sim >= threshold`. An explicit `false` always excludes. Ids that are
/// forced in by an override are members even if they are missing from
/// `scored`.
pub fn members_at_threshold(
    scored: &[Scored],
    threshold: f32,
    overrides: &BTreeMap<String, bool>,
) -> BTreeSet<String> {
    let mut members: BTreeSet<String> = scored
        .iter()
        .filter(|s| match overrides.get(&s.id) {
            Some(&forced) => forced,
            None => s.sim >= threshold,
        })
        .map(|s| s.id.clone())
        .collect();
    members.extend(
        overrides
            .iter()
            .filter(|(_, &forced)| forced)
            .map(|(id, _)| id.clone()),
    );
    members
}

/// Reject thresholds outside `[0, 1]` (NaN included).
pub fn validate_threshold(threshold: f32) -> Result<f32> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(Error::InvalidThreshold(threshold))
    }
}

/// A user-defined cluster keyed by prompt text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCluster {
    pub label: String,
    pub prompt: String,
    pub threshold: f32,
    /// Every vector's similarity to the prompt, descending.
    pub scored: Vec<Scored>,
    #[serde(default)]
    pub overrides: BTreeMap<String, bool>,
    pub order: u32,
    pub created_at: DateTime<Utc>,
}

impl PromptCluster {
    pub fn new(
        label: impl Into<String>,
        prompt: impl Into<String>,
        threshold: f32,
        scored: Vec<Scored>,
        order: u32,
    ) -> Result<Self> {
        Ok(Self {
            label: label.into(),
            prompt: prompt.into(),
            threshold: validate_threshold(threshold)?,
            scored,
            overrides: BTreeMap::new(),
            order,
            created_at: Utc::now(),
        })
    }

    pub fn set_threshold(&mut self, threshold: f32) -> Result<()> {
        self.threshold = validate_threshold(threshold)?;
        Ok(())
    }

    /// Force an id in (`Some(true)`), out (`Some(false)`), or clear (`None`).
    pub fn set_override(&mut self, id: &str, state: Option<bool>) {
        match state {
            Some(forced) => {
                self.overrides.insert(id.to_string(), forced);
            }
            None => {
                self.overrides.remove(id);
            }
        }
    }

    /// Replace the scored list, keeping threshold and overrides.
    pub fn rescore(&mut self, scored: Vec<Scored>) {
        self.scored = scored;
    }

    pub fn members(&self) -> BTreeSet<String> {
        members_at_threshold(&self.scored, self.threshold, &self.overrides)
    }

    /// Members, or when nothing passes, the `top_n` best-scoring ids that are
    /// not explicitly excluded. `top_n == 0` disables the fallback.
    pub fn members_with_fallback(&self, top_n: usize) -> BTreeSet<String> {
        let members = self.members();
        if !members.is_empty() || top_n == 0 {
            return members;
        }
        self.scored
            .iter()
            .filter(|s| self.overrides.get(&s.id) != Some(&false))
            .take(top_n)
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn similarity_of(&self, id: &str) -> Option<f32> {
        self.scored.iter().find(|s| s.id == id).map(|s| s.sim)
    }
}

/// Lowercase ASCII alphanumerics joined by `-`.
///
/// ```rust
/// use inbox_lens_core::prompt::slugify;
///
/// assert_eq!(slugify("  Travel & Flights!"), "travel-flights");
/// ```
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_dash = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "cluster".to_string()
    } else {
        slug
    }
}

/// [`slugify`] the label, appending `-2`, `-3`, … until it is not taken.
pub fn unique_slug<F>(label: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let base = slugify(label);
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(pairs: &[(&str, f32)]) -> Vec<Scored> {
        pairs
            .iter()
            .map(|(id, sim)| Scored {
                id: id.to_string(),
                sim: *sim,
            })
            .collect()
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let s = scored(&[("a", 0.5), ("b", 0.3), ("c", 0.29)]);
        let members = members_at_threshold(&s, 0.3, &BTreeMap::new());
        assert_eq!(members.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_include_override_beats_threshold() {
        let s = scored(&[("x", 0.1)]);
        let mut overrides = BTreeMap::new();
        overrides.insert("x".to_string(), true);
        assert!(members_at_threshold(&s, 0.3, &overrides).contains("x"));
    }

    #[test]
    fn test_exclude_override_always_wins() {
        let s = scored(&[("x", 0.99)]);
        let mut overrides = BTreeMap::new();
        overrides.insert("x".to_string(), false);
        assert!(members_at_threshold(&s, 0.0, &overrides).is_empty());
    }

    #[test]
    fn test_included_id_outside_scored_list() {
        let mut overrides = BTreeMap::new();
        overrides.insert("late".to_string(), true);
        let members = members_at_threshold(&[], 0.3, &overrides);
        assert!(members.contains("late"));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(matches!(
            validate_threshold(1.5),
            Err(Error::InvalidThreshold(_))
        ));
        assert!(validate_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_edit_without_rescoring() {
        let mut pc =
            PromptCluster::new("Travel", "flights", 0.5, scored(&[("a", 0.6), ("b", 0.4)]), 0)
                .unwrap();
        assert_eq!(pc.members().len(), 1);
        pc.set_threshold(0.35).unwrap();
        assert_eq!(pc.members().len(), 2);
        pc.set_override("a", Some(false));
        assert_eq!(pc.members().into_iter().collect::<Vec<_>>(), vec!["b"]);
        pc.set_override("a", None);
        assert_eq!(pc.members().len(), 2);
        assert!(pc.set_threshold(-0.1).is_err());
        assert_eq!(pc.threshold, 0.35);
    }

    #[test]
    fn test_fallback_only_when_empty() {
        let pc = PromptCluster::new(
            "Low",
            "rare",
            0.9,
            scored(&[("a", 0.5), ("b", 0.4), ("c", 0.3)]),
            0,
        )
        .unwrap();
        assert!(pc.members_with_fallback(0).is_empty());
        assert_eq!(pc.members_with_fallback(2).len(), 2);
        assert!(pc.members_with_fallback(2).contains("a"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Receipts 2024"), "receipts-2024");
        assert_eq!(slugify("--Hello,  World--"), "hello-world");
        assert_eq!(slugify("¿?"), "cluster");
    }

    #[test]
    fn test_unique_slug() {
        let taken = ["travel", "travel-2"];
        let slug = unique_slug("Travel", |s| taken.contains(&s));
        assert_eq!(slug, "travel-3");
        assert_eq!(unique_slug("Other", |s| taken.contains(&s)), "other");
    }

    #[test]
    fn test_serde_roundtrip_keeps_overrides() {
        let mut pc = PromptCluster::new("A", "a", 0.3, scored(&[("x", 0.2)]), 3).unwrap();
        pc.set_override("x", Some(true));
        let json = serde_json::to_string(&pc).unwrap();
        assert!(json.contains("createdAt"));
        let back: PromptCluster = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pc);
    }
}
