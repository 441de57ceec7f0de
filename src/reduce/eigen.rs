//! Small dense linear algebra used by the PCA fit.
//!
//! Matrices here are tiny (`b × b` with `b` ≈ target dimension plus a few
//! oversampling columns), so a cyclic Jacobi solver is plenty and, unlike
//! LAPACK-style routines, is fully deterministic on every platform.

/// Off-diagonal mass below which a Jacobi sweep is considered converged,
/// relative to the Frobenius norm of the input.
const JACOBI_TOL: f64 = 1e-14;
const JACOBI_MAX_SWEEPS: usize = 64;

/// Eigen-decomposition of a symmetric matrix.
///
/// `a` is row-major `n × n` and is consumed. Returns `(eigenvalues, vectors)`
/// where `vectors` is row-major `n × n` and column `j` is the eigenvector for
/// `eigenvalues[j]`. Eigenvalues are not sorted.
pub(crate) fn symmetric_eigen(mut a: Vec<f64>, n: usize) -> (Vec<f64>, Vec<f64>) {
    debug_assert_eq!(a.len(), n * n);

    let mut v = vec![0.0f64; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    let frob: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let threshold = JACOBI_TOL * frob.max(f64::MIN_POSITIVE);

    for _sweep in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| a[i * n + j] * a[i * n + j])
            .sum::<f64>()
            .sqrt();
        if off <= threshold {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq == 0.0 {
                    continue;
                }
                let app = a[p * n + p];
                let aqq = a[q * n + q];

                // Rotation angle that annihilates a[p][q].
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k * n + p];
                    let akq = a[k * n + q];
                    a[k * n + p] = c * akp - s * akq;
                    a[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p * n + k];
                    let aqk = a[q * n + k];
                    a[p * n + k] = c * apk - s * aqk;
                    a[q * n + k] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[k * n + p];
                    let vkq = v[k * n + q];
                    v[k * n + p] = c * vkp - s * vkq;
                    v[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i * n + i]).collect();
    (eigenvalues, v)
}

/// Modified Gram-Schmidt over a set of columns, in place.
///
/// A column that collapses (linearly dependent on the previous ones) is
/// replaced by the first standard basis vector that survives
/// orthogonalization, so the result always has full column rank.
pub(crate) fn orthonormalize(columns: &mut [Vec<f64>]) {
    const COLLAPSE: f64 = 1e-10;

    for j in 0..columns.len() {
        let (done, rest) = columns.split_at_mut(j);
        let col = &mut rest[0];
        let scale = norm(col).max(1.0);
        project_out(col, done);

        let mut n = norm(col);
        if n <= COLLAPSE * scale {
            let dim = col.len();
            for e in 0..dim {
                col.iter_mut().for_each(|x| *x = 0.0);
                col[e] = 1.0;
                project_out(col, done);
                n = norm(col);
                if n > 0.5 {
                    break;
                }
            }
        }
        col.iter_mut().for_each(|x| *x /= n);
    }
}

fn project_out(col: &mut [f64], basis: &[Vec<f64>]) {
    for q in basis {
        let r = crate::simd::dot_f64(q, col);
        for (x, qi) in col.iter_mut().zip(q) {
            *x -= r * qi;
        }
    }
}

fn norm(v: &[f64]) -> f64 {
    crate::simd::dot_f64(v, v).sqrt()
}
