//! Density-based topic discovery over thread representatives.
//!
//! # Algorithm
//!
//! 1. Run DBSCAN over the supplied vectors. Distance is the chord distance
//!    `sqrt(2 - 2·cos)`, which equals Euclidean distance on unit vectors.
//!    A neighborhood includes the point itself; a point is core when its
//!    neighborhood holds at least `min_pts` points.
//! 2. Dissolve every cluster with fewer than `min_cluster_size` members into
//!    the noise set.
//! 3. Name survivors `cluster-0`, `cluster-1`, … in discovery order, with a
//!    palette color assigned round-robin.
//! 4. Everything else maps to [`NOISE`]; a noise meta entry is added only when
//!    that set is non-empty.
//!
//! Callers cluster one vector per thread (its representative) and then fan
//! the result out with [`expand_assignments_to_threads`], so prolific threads
//! do not dominate the density estimate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::models::{
    Categories, ClusterAssignments, ClusterMeta, EmbeddingMap, ThreadMembership, NOISE,
    NOISE_COLOR, NOISE_NAME,
};
use crate::progress::{NoProgress, Phase, ProgressEvent, ProgressSink};

/// Colors assigned to surviving clusters, round-robin.
pub const CATEGORY_COLORS: [&str; 6] = [
    "#B8952E", "#7B4BA6", "#A8348A", "#2A7B8A", "#4A9B3A", "#9B5A2A",
];

/// DBSCAN and post-filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Neighbor distance threshold (chord distance).
    pub eps: f32,
    /// Minimum neighborhood size (including the point) for a core point.
    pub min_pts: usize,
    /// Clusters smaller than this are dissolved into noise.
    pub min_cluster_size: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps: 0.6,
            min_pts: 2,
            min_cluster_size: 10,
        }
    }
}

/// Chord distance between two vectors: `sqrt(2 - 2·cos)`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (2.0 - 2.0 * cosine_similarity(a, b)).max(0.0).sqrt()
}

#[derive(Clone, Copy, PartialEq)]
enum Label {
    Unvisited,
    Noise,
    Member(usize),
}

/// Plain DBSCAN over `points`.
///
/// Returns the clusters as lists of point indices in discovery order, and
/// the indices of noise points.
pub fn dbscan(points: &[&[f32]], eps: f32, min_pts: usize) -> (Vec<Vec<usize>>, Vec<usize>) {
    let n = points.len();
    let neighborhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| i == j || cosine_distance(points[i], points[j]) < eps)
                .collect()
        })
        .collect();

    let mut labels = vec![Label::Unvisited; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        if labels[i] != Label::Unvisited {
            continue;
        }
        if neighborhoods[i].len() < min_pts {
            labels[i] = Label::Noise;
            continue;
        }

        let cluster_id = clusters.len();
        let mut members = vec![i];
        labels[i] = Label::Member(cluster_id);
        let mut queue: Vec<usize> = neighborhoods[i].clone();
        let mut cursor = 0;

        while cursor < queue.len() {
            let j = queue[cursor];
            cursor += 1;
            match labels[j] {
                Label::Member(_) => continue,
                Label::Noise => {
                    // Border point: joins the cluster but does not expand it.
                    labels[j] = Label::Member(cluster_id);
                    members.push(j);
                }
                Label::Unvisited => {
                    labels[j] = Label::Member(cluster_id);
                    members.push(j);
                    if neighborhoods[j].len() >= min_pts {
                        queue.extend(neighborhoods[j].iter().copied());
                    }
                }
            }
        }
        clusters.push(members);
    }

    let noise = (0..n).filter(|&i| labels[i] == Label::Noise).collect();
    (clusters, noise)
}

/// Unsupervised clusterer with small-cluster suppression.
#[derive(Debug, Clone, Default)]
pub struct DensityClusterer {
    pub params: ClusterParams,
}

impl DensityClusterer {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    /// Cluster `vectors`, returning `id -> clusterId` plus display metadata.
    ///
    /// Empty input yields empty maps. Degenerate inputs (fewer points than
    /// `min_pts`, clusters under the size floor) end up in [`NOISE`].
    pub fn cluster(&self, vectors: &EmbeddingMap) -> Categories {
        self.cluster_with_progress(vectors, &NoProgress)
    }

    pub fn cluster_with_progress(
        &self,
        vectors: &EmbeddingMap,
        progress: &dyn ProgressSink,
    ) -> Categories {
        if vectors.is_empty() {
            return Categories::default();
        }

        let ids: Vec<&String> = vectors.keys().collect();
        let points: Vec<&[f32]> = vectors.values().map(Vec::as_slice).collect();
        progress.report(ProgressEvent::new(Phase::Clustering, 0, points.len()));

        let (clusters, noise) = dbscan(&points, self.params.eps, self.params.min_pts);
        let found = clusters.len();

        let mut noise_idx = noise;
        let mut kept: Vec<Vec<usize>> = Vec::new();
        for members in clusters {
            if members.len() >= self.params.min_cluster_size {
                kept.push(members);
            } else {
                noise_idx.extend(members);
            }
        }

        let mut assignments = ClusterAssignments::new();
        let mut meta = BTreeMap::new();
        for (n, members) in kept.iter().enumerate() {
            let cid = format!("cluster-{n}");
            meta.insert(
                cid.clone(),
                ClusterMeta {
                    name: format!("Cluster {}", n + 1),
                    color: CATEGORY_COLORS[n % CATEGORY_COLORS.len()].to_string(),
                    order: n as u32,
                },
            );
            for &i in members {
                assignments.insert(ids[i].clone(), cid.clone());
            }
        }
        for &i in &noise_idx {
            assignments.insert(ids[i].clone(), NOISE.to_string());
        }
        if !noise_idx.is_empty() {
            meta.insert(NOISE.to_string(), noise_meta(kept.len() as u32));
        }

        debug!(
            points = points.len(),
            found,
            kept = kept.len(),
            noise = noise_idx.len(),
            eps = self.params.eps,
            min_pts = self.params.min_pts,
            "density clustering complete"
        );
        progress.report(ProgressEvent::new(
            Phase::Clustering,
            points.len(),
            points.len(),
        ));

        Categories { assignments, meta }
    }
}

/// Metadata of the noise bucket, ordered after every real cluster.
pub fn noise_meta(order: u32) -> ClusterMeta {
    ClusterMeta {
        name: NOISE_NAME.to_string(),
        color: NOISE_COLOR.to_string(),
        order,
    }
}

/// Fan representative assignments out to every member of their thread.
///
/// Members of a thread whose representative has no assignment are written as
/// [`NOISE`]. Emails outside `membership` are not touched.
pub fn expand_assignments_to_threads(
    rep_assignments: &ClusterAssignments,
    membership: &ThreadMembership,
) -> ClusterAssignments {
    let mut out = ClusterAssignments::new();
    for (rep_id, members) in membership {
        let cid = rep_assignments
            .get(rep_id)
            .cloned()
            .unwrap_or_else(|| NOISE.to_string());
        for member in members {
            out.insert(member.clone(), cid.clone());
        }
    }
    out
}

/// Expand a representative-level clustering to thread level, keeping `meta`
/// consistent with the expanded assignments.
pub fn expand_categories(rep: Categories, membership: &ThreadMembership) -> Categories {
    let assignments = expand_assignments_to_threads(&rep.assignments, membership);
    let mut meta = rep.meta;
    let has_noise = assignments.values().any(|c| c == NOISE);
    if has_noise && !meta.contains_key(NOISE) {
        let order = meta.len() as u32;
        meta.insert(NOISE.to_string(), noise_meta(order));
    } else if !has_noise {
        meta.remove(NOISE);
    }
    Categories { assignments, meta }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{is_unit_norm, l2_normalize};

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let mut v = v;
        l2_normalize(&mut v);
        v
    }

    /// 12 near-identical vectors around e0 and 3 orthogonal loners.
    fn fixture() -> EmbeddingMap {
        let dims = 8;
        let mut map = EmbeddingMap::new();
        for i in 0..12 {
            let mut v = vec![0.0f32; dims];
            v[0] = 1.0;
            v[1] = 0.02 * i as f32;
            map.insert(format!("dense-{i:02}"), unit(v));
        }
        for k in 0..3 {
            let mut v = vec![0.0f32; dims];
            v[5 + k] = 1.0;
            map.insert(format!("lone-{k}"), unit(v));
        }
        map
    }

    #[test]
    fn test_fixture_is_unit_norm() {
        for v in fixture().values() {
            assert!(is_unit_norm(v));
        }
    }

    #[test]
    fn test_dense_group_survives_loners_are_noise() {
        let map = fixture();
        let dense_a = &map["dense-00"];
        let dense_b = &map["dense-11"];
        assert!(cosine_similarity(dense_a, dense_b) >= 0.95);

        let result = DensityClusterer::default().cluster(&map);
        for i in 0..12 {
            assert_eq!(result.assignments[&format!("dense-{i:02}")], "cluster-0");
        }
        for k in 0..3 {
            assert_eq!(result.assignments[&format!("lone-{k}")], NOISE);
        }
        assert_eq!(result.meta["cluster-0"].name, "Cluster 1");
        assert_eq!(result.meta["cluster-0"].color, CATEGORY_COLORS[0]);
        assert_eq!(result.meta[NOISE].name, NOISE_NAME);
        assert_eq!(result.meta.len(), 2);
    }

    #[test]
    fn test_small_cluster_is_dissolved() {
        let mut map = fixture();
        map.retain(|id, _| id.as_str() < "dense-05" || id.starts_with("lone"));
        let result = DensityClusterer::default().cluster(&map);
        assert!(result.assignments.values().all(|c| c == NOISE));
        assert_eq!(result.meta.keys().collect::<Vec<_>>(), vec![NOISE]);
    }

    #[test]
    fn test_no_noise_entry_when_everything_clusters() {
        let mut map = fixture();
        map.retain(|id, _| id.starts_with("dense"));
        let result = DensityClusterer::default().cluster(&map);
        assert!(!result.meta.contains_key(NOISE));
        assert_eq!(result.assignments.len(), 12);
    }

    #[test]
    fn test_empty_input() {
        let result = DensityClusterer::default().cluster(&EmbeddingMap::new());
        assert!(result.assignments.is_empty());
        assert!(result.meta.is_empty());
    }

    #[test]
    fn test_single_point_is_noise() {
        let mut map = EmbeddingMap::new();
        map.insert("only".into(), unit(vec![1.0, 0.0]));
        let result = DensityClusterer::default().cluster(&map);
        assert_eq!(result.assignments["only"], NOISE);
    }

    #[test]
    fn test_two_groups_get_distinct_ids_and_colors() {
        let mut map = EmbeddingMap::new();
        for i in 0..10 {
            map.insert(format!("a{i}"), unit(vec![1.0, 0.01 * i as f32, 0.0]));
            map.insert(format!("b{i}"), unit(vec![0.0, 0.01 * i as f32, 1.0]));
        }
        let result = DensityClusterer::default().cluster(&map);
        assert_eq!(result.assignments["a0"], "cluster-0");
        assert_eq!(result.assignments["b0"], "cluster-1");
        assert_eq!(result.meta["cluster-1"].color, CATEGORY_COLORS[1]);
        assert_eq!(result.meta["cluster-1"].order, 1);
    }

    #[test]
    fn test_dbscan_border_point_joins() {
        let a = [1.0f32, 0.0];
        let b = unit(vec![1.0, 0.3]);
        let c = unit(vec![1.0, 0.65]);
        let pts: Vec<&[f32]> = vec![&a, &b, &c];
        // Only b reaches three neighbors; a is visited first and marked noise.
        let (clusters, noise) = dbscan(&pts, 0.35, 3);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![1, 0, 2]);
        assert!(noise.is_empty());
    }

    #[test]
    fn test_expand_fans_out_and_defaults_to_noise() {
        let mut reps = ClusterAssignments::new();
        reps.insert("r1".into(), "cluster-0".into());
        let mut membership = ThreadMembership::new();
        membership.insert("r1".into(), vec!["m1".into(), "r1".into()]);
        membership.insert("r2".into(), vec!["m2".into(), "r2".into()]);

        let out = expand_assignments_to_threads(&reps, &membership);
        assert_eq!(out["m1"], "cluster-0");
        assert_eq!(out["r1"], "cluster-0");
        assert_eq!(out["m2"], NOISE);
        assert_eq!(out["r2"], NOISE);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_expand_categories_adds_noise_meta() {
        let mut rep = Categories::default();
        rep.assignments.insert("r1".into(), "cluster-0".into());
        rep.meta.insert(
            "cluster-0".into(),
            ClusterMeta {
                name: "Cluster 1".into(),
                color: CATEGORY_COLORS[0].into(),
                order: 0,
            },
        );
        let mut membership = ThreadMembership::new();
        membership.insert("r1".into(), vec!["r1".into()]);
        membership.insert("r2".into(), vec!["x".into(), "r2".into()]);

        let expanded = expand_categories(rep, &membership);
        assert_eq!(expanded.assignments["x"], NOISE);
        assert_eq!(expanded.meta[NOISE].order, 1);
    }
}
