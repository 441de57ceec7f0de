//! Dense vector kernels.
//!
//! Plain iterator loops that LLVM auto-vectorizes. Everything in the crate that
//! touches vector components goes through here, so a SIMD backend can be
//! swapped in without touching the index code.
//!
//! ```rust
//! use lookalike::simd::{dot, norm};
//!
//! let a = [1.0_f32, 0.0, 0.0];
//! let b = [0.707, 0.707, 0.0];
//!
//! let d = dot(&a, &b);
//! let n = norm(&a);
//! ```

/// Dot product of two vectors.
///
/// Extra components of the longer slice are ignored.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// `out[i] = a[i] - b[i]`.
#[inline]
pub fn sub_into(a: &[f32], b: &[f32], out: &mut [f32]) {
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x - y;
    }
}

/// Component-wise midpoint of two vectors.
#[inline]
#[must_use]
pub fn midpoint(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| (x + y) * 0.5).collect()
}

/// Dot product accumulated in `f64`, for long reductions where `f32`
/// accumulation drifts (projection of raw embeddings).
#[inline]
#[must_use]
pub fn dot_f64(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
