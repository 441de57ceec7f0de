//! Distance and normalization helpers for unit vectors.
//!
//! ## Important nuance
//!
//! The forest ranks by [`angular_distance`], which is the Euclidean distance
//! between two **L2-normalized** vectors written in terms of their dot product:
//! $\lVert u - v \rVert = \sqrt{2(1 - \langle u, v \rangle)}$. It is only a
//! meaningful metric when both inputs have unit norm, so every vector that
//! enters a [`Forest`](crate::Forest) goes through [`normalize`] first.

use crate::simd;

/// Norms below this are treated as zero vectors.
pub const NORM_EPSILON: f32 = 1e-10;

/// Angular distance $\sqrt{2(1 - \langle u, v \rangle)}$ for unit vectors.
///
/// Range is `[0, 2]`. The radicand is clamped at zero, because `dot(u, u)`
/// can come out a hair above `1.0` in floating point.
///
/// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
/// nearest neighbor).
#[inline]
#[must_use]
pub fn angular_distance(u: &[f32], v: &[f32]) -> f32 {
    if u.len() != v.len() {
        return f32::INFINITY;
    }
    (2.0 * (1.0 - simd::dot(u, v))).max(0.0).sqrt()
}

/// Normalize a vector to unit L2 norm.
///
/// A (near-)zero vector has no direction; it comes back as all zeros.
#[inline]
#[must_use]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize_in_place(&mut out);
    out
}

/// In-place variant of [`normalize`].
#[inline]
pub fn normalize_in_place(v: &mut [f32]) {
    let n = simd::norm(v);
    if n < NORM_EPSILON {
        v.iter_mut().for_each(|x| *x = 0.0);
        return;
    }
    v.iter_mut().for_each(|x| *x /= n);
}

/// True when `v` is within `tol` of unit length.
#[inline]
#[must_use]
pub fn is_unit(v: &[f32], tol: f32) -> bool {
    (simd::norm(v) - 1.0).abs() <= tol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angular_distance_is_zero_for_identical() {
        let a = normalize(&[1.0_f32, 2.0, 3.0]);
        assert!(angular_distance(&a, &a) < 1e-3);
    }

    #[test]
    fn angular_distance_of_opposites_is_two() {
        let a = [1.0_f32, 0.0];
        let b = [-1.0_f32, 0.0];
        assert!((angular_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_is_sqrt_two() {
        let a = [1.0_f32, 0.0];
        let b = [0.0_f32, 1.0];
        assert!((angular_distance(&a, &b) - 2.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn dot_overshoot_is_clamped() {
        // dot = 1.0000001 would make the radicand negative without the clamp.
        let a = [1.000_000_1_f32, 0.0];
        let d = angular_distance(&a, &a);
        assert!(d.is_finite());
        assert_eq!(d, 0.0);
    }

    #[test]
    fn mismatched_lengths_are_infinitely_far() {
        assert_eq!(angular_distance(&[1.0, 0.0], &[1.0]), f32::INFINITY);
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        assert_eq!(normalize(&[0.0_f32, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_produces_unit_vectors() {
        let v = normalize(&[3.0_f32, 4.0]);
        assert!(is_unit(&v, 1e-6));
        assert!((v[0] - 0.6).abs() < 1e-6);
    }
}
