//! PCA dimensionality reduction.
//!
//! Compresses raw embeddings (`D_raw`, typically 2048 for a pooled CNN) down to
//! the forest dimension `D` (typically ~100) with a linear projection fitted
//! once per offline build.
//!
//! **Technical Name**: Principal Component Analysis via block subspace iteration
//!
//! Algorithm:
//! - Center the training matrix `X` (n × D_raw) on its column means
//! - Iterate `Q ← orth(C·Q)` with `C·Q = Xcᵀ(Xc·Q) / (n - 1)`, never forming
//!   the `D_raw × D_raw` covariance
//! - Rayleigh–Ritz: eigen-decompose `Qᵀ C Q` and rotate `Q` onto its eigenvectors
//! - Stop when the leading Ritz values stop moving
//!
//! # Determinism
//!
//! Fitting twice on identical data yields bit-identical models:
//! - the start block comes from a fixed-seed `StdRng`
//! - all reductions run in a fixed order (parallelism is per column only)
//! - components are sorted by descending variance, exact ties broken by the
//!   smaller index of each direction's largest-magnitude coordinate
//! - each direction's sign is flipped so its largest-magnitude entry is positive
//!
//! The output of [`ReducerModel::transform`] is *not* unit-norm; callers
//! re-normalize before handing vectors to a [`Forest`](crate::Forest).

mod eigen;

use crate::error::{Result, SearchError};
use crate::simd;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Seed for the subspace-iteration start block.
const FIT_SEED: u64 = 0x5EED_0F_9CA0;
/// Extra columns carried through the iteration to speed convergence of the
/// last wanted component.
const OVERSAMPLE: usize = 8;
const MAX_ITERATIONS: usize = 150;
/// Relative change in the leading Ritz values that counts as converged.
const RITZ_TOL: f64 = 1e-10;

/// A fitted linear projection `D_raw → D`.
///
/// Immutable after [`ReducerModel::fit`]; share it behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReducerModel {
    input_dim: usize,
    output_dim: usize,
    /// Column means of the training matrix (len `input_dim`).
    mean: Vec<f32>,
    /// Principal directions, row-major `output_dim × input_dim`.
    components: Vec<f32>,
    /// Variance along each component, descending.
    explained_variance: Vec<f32>,
    /// Total variance of the training data (trace of the covariance).
    total_variance: f32,
}

impl ReducerModel {
    /// Fit a projection onto the top `target_dim` principal directions.
    ///
    /// # Errors
    ///
    /// - [`SearchError::Config`] if `target_dim` is zero or exceeds the input dimension
    /// - [`SearchError::RankDeficiency`] if there are fewer than `target_dim` vectors
    /// - [`SearchError::DimensionMismatch`] if training vectors differ in length
    pub fn fit(training: &[Vec<f32>], target_dim: usize) -> Result<Self> {
        if target_dim == 0 {
            return Err(SearchError::config("target dimension must be at least 1"));
        }
        let Some(first) = training.first() else {
            return Err(SearchError::RankDeficiency {
                samples: 0,
                required: target_dim,
            });
        };
        let input_dim = first.len();
        if let Some(bad) = training.iter().find(|v| v.len() != input_dim) {
            return Err(SearchError::DimensionMismatch {
                expected: input_dim,
                actual: bad.len(),
            });
        }
        if target_dim > input_dim {
            return Err(SearchError::config(format!(
                "target dimension {target_dim} exceeds input dimension {input_dim}"
            )));
        }
        let n = training.len();
        if n < target_dim {
            return Err(SearchError::RankDeficiency {
                samples: n,
                required: target_dim,
            });
        }

        tracing::debug!(n, input_dim, target_dim, "fitting PCA reducer");

        let mean = column_means(training, input_dim);
        let centered: Vec<f64> = training
            .iter()
            .flat_map(|v| v.iter().zip(&mean).map(|(&x, &m)| f64::from(x) - m))
            .collect();
        let cov = Covariance {
            centered: &centered,
            n,
            dim: input_dim,
        };

        let total_variance = centered.iter().map(|x| x * x).sum::<f64>() / cov.denominator();
        let (directions, variances) = cov.top_eigenpairs(target_dim);

        let mut components = Vec::with_capacity(target_dim * input_dim);
        for dir in &directions {
            components.extend(dir.iter().map(|&x| x as f32));
        }

        let model = Self {
            input_dim,
            output_dim: target_dim,
            mean: mean.iter().map(|&m| m as f32).collect(),
            components,
            explained_variance: variances.iter().map(|&v| v as f32).collect(),
            total_variance: total_variance as f32,
        };
        tracing::info!(
            input_dim,
            output_dim = target_dim,
            explained = model.explained_variance_ratio(),
            "PCA reducer fitted"
        );
        Ok(model)
    }

    /// Rebuild a model from stored parts (used when loading from disk).
    pub fn from_parts(
        mean: Vec<f32>,
        components: Vec<f32>,
        explained_variance: Vec<f32>,
        total_variance: f32,
    ) -> Result<Self> {
        let input_dim = mean.len();
        let output_dim = explained_variance.len();
        if input_dim == 0 || output_dim == 0 {
            return Err(SearchError::config("reducer dimensions must be non-zero"));
        }
        if output_dim > input_dim {
            return Err(SearchError::config(format!(
                "reducer output dimension {output_dim} exceeds input dimension {input_dim}"
            )));
        }
        if components.len() != output_dim * input_dim {
            return Err(SearchError::config(format!(
                "projection has {} entries, expected {output_dim} x {input_dim}",
                components.len()
            )));
        }
        Ok(Self {
            input_dim,
            output_dim,
            mean,
            components,
            explained_variance,
            total_variance,
        })
    }

    /// Project a raw vector: `components · (v − mean)`.
    pub fn transform(&self, v: &[f32]) -> Result<Vec<f32>> {
        if v.len() != self.input_dim {
            return Err(SearchError::DimensionMismatch {
                expected: self.input_dim,
                actual: v.len(),
            });
        }
        let centered: Vec<f32> = v.iter().zip(&self.mean).map(|(x, m)| x - m).collect();
        Ok(self
            .components
            .chunks_exact(self.input_dim)
            .map(|row| simd::dot(row, &centered))
            .collect())
    }

    /// [`transform`](Self::transform) over many vectors in parallel.
    pub fn transform_batch(&self, vectors: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        vectors.par_iter().map(|v| self.transform(v)).collect()
    }

    /// Raw embedding dimension this model accepts.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Compressed dimension this model produces.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    /// Row-major `output_dim × input_dim` projection matrix.
    pub fn components(&self) -> &[f32] {
        &self.components
    }

    /// Principal direction `i` (len `input_dim`).
    pub fn component(&self, i: usize) -> &[f32] {
        &self.components[i * self.input_dim..(i + 1) * self.input_dim]
    }

    pub fn explained_variance(&self) -> &[f32] {
        &self.explained_variance
    }

    pub fn total_variance(&self) -> f32 {
        self.total_variance
    }

    /// Fraction of the training variance captured by the kept components.
    ///
    /// `1.0` for degenerate (zero-variance) training sets.
    pub fn explained_variance_ratio(&self) -> f32 {
        if self.total_variance <= 0.0 {
            return 1.0;
        }
        (self.explained_variance.iter().sum::<f32>() / self.total_variance).min(1.0)
    }
}

fn column_means(training: &[Vec<f32>], dim: usize) -> Vec<f64> {
    let mut mean = vec![0.0f64; dim];
    for v in training {
        for (m, &x) in mean.iter_mut().zip(v) {
            *m += f64::from(x);
        }
    }
    let n = training.len() as f64;
    mean.iter_mut().for_each(|m| *m /= n);
    mean
}

/// Implicit sample covariance of a centered, row-major `n × dim` matrix.
struct Covariance<'a> {
    centered: &'a [f64],
    n: usize,
    dim: usize,
}

impl Covariance<'_> {
    fn denominator(&self) -> f64 {
        (self.n.saturating_sub(1)).max(1) as f64
    }

    /// `C · v` computed as `Xcᵀ (Xc v) / (n - 1)`.
    fn apply(&self, v: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0f64; self.dim];
        for row in self.centered.chunks_exact(self.dim) {
            let y = simd::dot_f64(row, v);
            if y == 0.0 {
                continue;
            }
            for (o, &x) in out.iter_mut().zip(row) {
                *o += x * y;
            }
        }
        let d = self.denominator();
        out.iter_mut().for_each(|o| *o /= d);
        out
    }

    /// Top `k` eigenpairs, sorted and sign-normalized.
    fn top_eigenpairs(&self, k: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let block = (k + OVERSAMPLE).min(self.dim);

        let mut rng = StdRng::seed_from_u64(FIT_SEED);
        let mut q: Vec<Vec<f64>> = (0..block)
            .map(|_| (0..self.dim).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect();
        eigen::orthonormalize(&mut q);

        let mut previous: Option<Vec<f64>> = None;
        let mut ritz = (Vec::new(), Vec::new());
        for iteration in 0..MAX_ITERATIONS {
            let z: Vec<Vec<f64>> = q.par_iter().map(|col| self.apply(col)).collect();

            // Rayleigh–Ritz on the current basis: H = Qᵀ C Q.
            let mut h = vec![0.0f64; block * block];
            for i in 0..block {
                for j in i..block {
                    let hij = 0.5 * (simd::dot_f64(&q[i], &z[j]) + simd::dot_f64(&q[j], &z[i]));
                    h[i * block + j] = hij;
                    h[j * block + i] = hij;
                }
            }
            let (values, vectors) = eigen::symmetric_eigen(h, block);
            let mut leading = values.clone();
            leading.sort_by(|a, b| b.total_cmp(a));
            leading.truncate(k);

            let converged = previous.as_ref().is_some_and(|prev| {
                let scale = leading.first().copied().unwrap_or(0.0).abs().max(f64::MIN_POSITIVE);
                prev.iter()
                    .zip(&leading)
                    .all(|(a, b)| (a - b).abs() <= RITZ_TOL * scale)
            });
            ritz = (values, rotate(&q, &vectors, block));

            // A full-rank block spans the whole space, so one Rayleigh–Ritz pass is exact.
            if converged || block == self.dim {
                tracing::debug!(iteration, "subspace iteration converged");
                break;
            }
            previous = Some(leading);

            q = z;
            eigen::orthonormalize(&mut q);
        }

        let (values, vectors) = ritz;
        let mut pairs: Vec<(f64, usize, Vec<f64>)> = values
            .into_iter()
            .zip(vectors)
            .map(|(value, mut dir)| {
                let dominant = fix_sign(&mut dir);
                (value.max(0.0), dominant, dir)
            })
            .collect();
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        pairs.truncate(k);

        pairs.into_iter().map(|(v, _, d)| (d, v)).unzip()
    }
}

/// `Q · W` for column-stored `Q` and row-major `block × block` `W`.
fn rotate(q: &[Vec<f64>], w: &[f64], block: usize) -> Vec<Vec<f64>> {
    let dim = q.first().map_or(0, Vec::len);
    (0..block)
        .map(|j| {
            let mut out = vec![0.0f64; dim];
            for (i, col) in q.iter().enumerate() {
                let wij = w[i * block + j];
                for (o, &x) in out.iter_mut().zip(col) {
                    *o += x * wij;
                }
            }
            out
        })
        .collect()
}

/// Flip `dir` so its largest-magnitude entry is positive; returns that entry's index.
///
/// The first index wins on magnitude ties.
fn fix_sign(dir: &mut [f64]) -> usize {
    let mut dominant = 0;
    for (i, x) in dir.iter().enumerate() {
        if x.abs() > dir[dominant].abs() {
            dominant = i;
        }
    }
    if dir.get(dominant).is_some_and(|&x| x < 0.0) {
        dir.iter_mut().for_each(|x| *x = -*x);
    }
    dominant
}
