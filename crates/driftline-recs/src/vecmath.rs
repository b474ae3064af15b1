//! Dense vector math primitives and deterministic seeded k-means.
//!
//! Everything here is synchronous and deterministic given its inputs and
//! the clustering seed: identical arguments always produce identical
//! outputs, with no wall-clock randomness anywhere.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::VectorMathError;

#[inline]
fn dist2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// L2 norm (Euclidean length) of a vector.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Return the unit vector in the direction of `v`.
///
/// The zero vector normalizes to itself rather than faulting.
pub fn normalize_l2(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Cosine similarity in [-1, 1].
///
/// Returns exactly 0 (not NaN) if either operand is the zero vector.
///
/// # Errors
///
/// - [`VectorMathError::EmptyVector`] if either operand is empty
/// - [`VectorMathError::DimensionMismatch`] on length mismatch
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorMathError> {
    if a.is_empty() || b.is_empty() {
        return Err(VectorMathError::EmptyVector);
    }
    if a.len() != b.len() {
        return Err(VectorMathError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let denom = l2_norm(a) * l2_norm(b);
    if denom > 0.0 {
        Ok((dot / denom).clamp(-1.0, 1.0))
    } else {
        Ok(0.0)
    }
}

/// Elementwise sum of two vectors.
///
/// # Errors
///
/// [`VectorMathError::DimensionMismatch`] on length mismatch.
pub fn add_vectors(a: &[f32], b: &[f32]) -> Result<Vec<f32>, VectorMathError> {
    if a.len() != b.len() {
        return Err(VectorMathError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x + y).collect())
}

/// Logistic contrast stretch rescaled so the endpoints are exact.
///
/// Computes a sigmoid with the given `gain` and midpoint `mid`, then
/// divides out the logistic's own values at 0 and 1 so that
/// `sigmoidal_contrast(0) == 0` and `sigmoidal_contrast(1) == 1` exactly.
/// Monotonic non-decreasing on [0, 1]; used to spread similarity scores
/// into a sharper ranking signal.
pub fn sigmoidal_contrast(x: f64, gain: f64, mid: f64) -> f64 {
    let logistic = |t: f64| 1.0 / (1.0 + (-gain * (t - mid)).exp());
    let lo = logistic(0.0);
    let hi = logistic(1.0);
    (logistic(x) - lo) / (hi - lo)
}

/// Options for [`cluster_by_kmeans`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansOptions {
    /// RNG seed for centroid initialization. Identical inputs and seed
    /// produce identical assignments.
    pub seed: u64,
    /// L2-normalize inputs first; embedding magnitude is not a meaningful
    /// signal for cluster shape.
    pub normalize: bool,
    /// Iteration cap; the run also stops early on a stable assignment.
    pub max_iterations: usize,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            normalize: true,
            max_iterations: 32,
        }
    }
}

/// Deterministic seeded k-means over dense vectors.
///
/// Returns one centroid index per input vector, each in `[0, k)`. Centroid
/// initialization is farthest-point: the first centroid is drawn via a
/// [`ChaCha8Rng`] seeded from `options.seed`, each further one maximizes
/// distance to its nearest chosen centroid. When the inputs carry fewer
/// distinct values than `k`, the surplus clusters simply end up empty.
/// Assignment ties break toward the lowest centroid index.
///
/// # Errors
///
/// - [`VectorMathError::NoVectors`] on empty input
/// - [`VectorMathError::InvalidClusterCount`] if `k == 0`
/// - [`VectorMathError::TooFewVectors`] if fewer vectors than `k`
/// - [`VectorMathError::DimensionMismatch`] on inconsistent dimensions
/// - [`VectorMathError::ZeroVector`] if `options.normalize` and any input
///   has zero magnitude
pub fn cluster_by_kmeans(
    vectors: &[Vec<f32>],
    k: usize,
    options: &KMeansOptions,
) -> Result<Vec<usize>, VectorMathError> {
    if vectors.is_empty() {
        return Err(VectorMathError::NoVectors);
    }
    if k == 0 {
        return Err(VectorMathError::InvalidClusterCount { k });
    }
    if vectors.len() < k {
        return Err(VectorMathError::TooFewVectors {
            available: vectors.len(),
            requested: k,
        });
    }
    let dim = vectors[0].len();
    if dim == 0 {
        return Err(VectorMathError::EmptyVector);
    }
    for v in vectors {
        if v.len() != dim {
            return Err(VectorMathError::DimensionMismatch {
                expected: dim,
                actual: v.len(),
            });
        }
    }

    let points: Vec<Vec<f32>> = if options.normalize {
        let mut out = Vec::with_capacity(vectors.len());
        for (index, v) in vectors.iter().enumerate() {
            if l2_norm(v) == 0.0 {
                return Err(VectorMathError::ZeroVector { index });
            }
            out.push(normalize_l2(v));
        }
        out
    } else {
        vectors.to_vec()
    };

    // Farthest-point initialization: the first centroid is seed-drawn,
    // each further one maximizes distance to its nearest chosen centroid.
    // Duplicate-heavy inputs thus exhaust their distinct values first and
    // degrade to fewer effective clusters instead of ping-ponging.
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    let first = rng.gen_range(0..points.len());
    let mut centroids: Vec<Vec<f32>> = vec![points[first].clone()];
    while centroids.len() < k {
        let mut best_i = 0usize;
        let mut best_d = f32::NEG_INFINITY;
        for (i, p) in points.iter().enumerate() {
            let d = centroids
                .iter()
                .map(|c| dist2(p, c))
                .fold(f32::INFINITY, f32::min);
            if d > best_d {
                best_d = d;
                best_i = i;
            }
        }
        centroids.push(points[best_i].clone());
    }

    let mut assignments = vec![0usize; points.len()];
    for _ in 0..options.max_iterations.max(1) {
        let mut next = Vec::with_capacity(points.len());
        for p in &points {
            let mut best = 0usize;
            let mut best_d = f32::INFINITY;
            for (ci, c) in centroids.iter().enumerate() {
                let d = dist2(p, c);
                if d < best_d {
                    best_d = d;
                    best = ci;
                }
            }
            next.push(best);
        }
        let stable = next == assignments;
        assignments = next;
        if stable {
            break;
        }

        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &a) in points.iter().zip(&assignments) {
            counts[a] += 1;
            for (s, x) in sums[a].iter_mut().zip(p) {
                *s += x;
            }
        }
        for (ci, count) in counts.iter().enumerate() {
            // Empty clusters keep their previous centroid.
            if *count > 0 {
                centroids[ci] = sums[ci].iter().map(|s| s / *count as f32).collect();
            }
        }
    }

    Ok(assignments)
}
