//! Three-dimensional PCA projection for visualization.
//!
//! # Fitting
//!
//! 1. Center each column on its mean (no variance scaling).
//! 2. Build the covariance matrix `XᵀX / (n − 1)`.
//! 3. Extract three components by power iteration with deflation, each
//!    re-orthogonalized against the ones before it. The sign of a component
//!    is fixed so its largest-magnitude coordinate is positive.
//! 4. When fewer than three directions carry variance, the basis is completed
//!    with standard basis vectors orthogonalized against it; when the input
//!    has fewer than three dimensions, the missing components are zero.
//!
//! Every step is deterministic, so fitting the same matrix twice yields the
//! same model, and [`ProjectionModel::project`] is bit-identical across calls.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::EmbeddingMap;
use crate::progress::{NoProgress, Phase, ProgressEvent, ProgressSink};

/// Number of output dimensions.
pub const OUTPUT_DIMS: usize = 3;

const MAX_ITERATIONS: usize = 1000;
const CONVERGENCE: f64 = 1e-12;

/// A point in projection space.
pub type Point3 = [f32; OUTPUT_DIMS];

/// Serializable PCA model: centering/scaling parameters and the basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionModel {
    /// Input dimensionality.
    pub dims: usize,
    pub center: bool,
    pub scale: bool,
    pub means: Vec<f64>,
    pub stdevs: Vec<f64>,
    /// Three unit (or zero) row vectors of length `dims`.
    pub components: Vec<Vec<f64>>,
    /// Variance captured by each component.
    pub explained_variance: Vec<f64>,
}

impl ProjectionModel {
    /// Project one vector through the stored basis.
    pub fn project_one(&self, v: &[f32]) -> Result<Point3> {
        if v.len() != self.dims {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: v.len(),
            });
        }
        let mut out = [0.0f32; OUTPUT_DIMS];
        for (k, component) in self.components.iter().take(OUTPUT_DIMS).enumerate() {
            let mut acc = 0.0f64;
            for (j, &x) in v.iter().enumerate() {
                let mut centered = x as f64;
                if self.center {
                    centered -= self.means[j];
                }
                if self.scale && self.stdevs[j] > 0.0 {
                    centered /= self.stdevs[j];
                }
                acc += centered * component[j];
            }
            out[k] = acc as f32;
        }
        Ok(out)
    }

    /// Project every row through the stored basis, without refitting.
    pub fn project(&self, rows: &[&[f32]]) -> Result<Vec<Point3>> {
        rows.iter().map(|row| self.project_one(row)).collect()
    }
}

/// Fitted model plus the projected coordinates of every embedded email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSnapshot {
    pub model: Option<ProjectionModel>,
    pub points: BTreeMap<String, Point3>,
}

/// Fit a model to `rows` and return their projections.
///
/// Zero rows yield no points and no model. Rows of differing length are
/// rejected with [`Error::DimensionMismatch`].
pub fn fit(rows: &[&[f32]]) -> Result<(Vec<Point3>, Option<ProjectionModel>)> {
    let Some(first) = rows.first() else {
        return Ok((Vec::new(), None));
    };
    let dims = first.len();
    if let Some(bad) = rows.iter().find(|r| r.len() != dims) {
        return Err(Error::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        });
    }

    let n = rows.len();
    let data = Array2::from_shape_fn((n, dims), |(i, j)| rows[i][j] as f64);
    let means = data
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(dims));
    let centered = &data - &means;
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
    let covariance = centered.t().dot(&centered) / denom;

    let (components, explained_variance) = principal_components(covariance, OUTPUT_DIMS);

    let model = ProjectionModel {
        dims,
        center: true,
        scale: false,
        means: means.to_vec(),
        stdevs: vec![1.0; dims],
        components: components.iter().map(|c| c.to_vec()).collect(),
        explained_variance,
    };
    let points = model.project(rows)?;

    debug!(
        rows = n,
        dims,
        variance = ?model.explained_variance,
        "projection fitted"
    );
    Ok((points, Some(model)))
}

/// Fit over an id-keyed embedding map.
pub fn fit_projection(vectors: &EmbeddingMap) -> Result<ProjectionSnapshot> {
    fit_projection_with_progress(vectors, &NoProgress)
}

pub fn fit_projection_with_progress(
    vectors: &EmbeddingMap,
    progress: &dyn ProgressSink,
) -> Result<ProjectionSnapshot> {
    progress.report(ProgressEvent::new(Phase::Projecting, 0, vectors.len()));
    let rows: Vec<&[f32]> = vectors.values().map(Vec::as_slice).collect();
    let (points, model) = fit(&rows)?;
    progress.report(ProgressEvent::new(
        Phase::Projecting,
        vectors.len(),
        vectors.len(),
    ));
    Ok(ProjectionSnapshot {
        model,
        points: vectors.keys().cloned().zip(points).collect(),
    })
}

/// Project an id-keyed embedding map through an existing model.
pub fn project_map(
    model: &ProjectionModel,
    vectors: &EmbeddingMap,
) -> Result<BTreeMap<String, Point3>> {
    vectors
        .iter()
        .map(|(id, v)| Ok((id.clone(), model.project_one(v)?)))
        .collect()
}

/// Top `count` eigenvectors of a symmetric PSD matrix, with eigenvalues.
fn principal_components(mut cov: Array2<f64>, count: usize) -> (Vec<Array1<f64>>, Vec<f64>) {
    let dims = cov.nrows();
    let scale = cov.diag().sum().abs().max(f64::MIN_POSITIVE);
    let tolerance = 1e-10 * scale;

    let mut components: Vec<Array1<f64>> = Vec::with_capacity(count);
    let mut variances = Vec::with_capacity(count);

    for _ in 0..count {
        if components.len() >= dims {
            components.push(Array1::zeros(dims));
            variances.push(0.0);
            continue;
        }
        match power_iterate(&cov, &components, tolerance) {
            Some((v, lambda)) => {
                let outer = outer(&v);
                cov = cov - outer * lambda;
                components.push(v);
                variances.push(lambda.max(0.0));
            }
            None => {
                components.push(fill_direction(dims, &components));
                variances.push(0.0);
            }
        }
    }

    for c in &mut components {
        fix_sign(c);
    }
    (components, variances)
}

fn power_iterate(
    cov: &Array2<f64>,
    previous: &[Array1<f64>],
    tolerance: f64,
) -> Option<(Array1<f64>, f64)> {
    // Seed with the largest column.
    let start = cov
        .columns()
        .into_iter()
        .map(|c| c.to_owned())
        .max_by(|a, b| {
            a.dot(a)
                .partial_cmp(&b.dot(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
    let mut v = orthonormalize(start, previous)?;

    for _ in 0..MAX_ITERATIONS {
        let w = cov.dot(&v);
        if w.dot(&w).sqrt() <= tolerance {
            return None;
        }
        let next = orthonormalize(w, previous)?;
        let delta = (&next - &v).mapv(f64::abs).sum();
        v = next;
        if delta < CONVERGENCE {
            break;
        }
    }

    let lambda = v.dot(&cov.dot(&v));
    if lambda <= tolerance {
        return None;
    }
    Some((v, lambda))
}

/// Gram-Schmidt against `basis`, then normalize. `None` when nothing is left.
fn orthonormalize(mut v: Array1<f64>, basis: &[Array1<f64>]) -> Option<Array1<f64>> {
    for b in basis {
        let proj = v.dot(b);
        v.scaled_add(-proj, b);
    }
    let norm = v.dot(&v).sqrt();
    if norm <= 1e-9 {
        return None;
    }
    Some(v / norm)
}

fn fill_direction(dims: usize, basis: &[Array1<f64>]) -> Array1<f64> {
    (0..dims)
        .find_map(|j| {
            let mut e = Array1::zeros(dims);
            e[j] = 1.0;
            orthonormalize(e, basis)
        })
        .unwrap_or_else(|| Array1::zeros(dims))
}

fn outer(v: &Array1<f64>) -> Array2<f64> {
    let n = v.len();
    Array2::from_shape_fn((n, n), |(i, j)| v[i] * v[j])
}

fn fix_sign(v: &mut Array1<f64>) {
    let mut pivot = 0.0f64;
    for &x in v.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}
