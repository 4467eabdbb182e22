//! Dense vector helpers shared by the index, fusion, and ranking code.
//!
//! Every embedding that is stored, cached, or compared goes through
//! [`normalized`] first; the similarity helpers assume unit-length input.

use crate::{Error, Result};

/// Tolerance used when checking that a vector is unit length.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-5;

/// Euclidean (L2) norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Dot product of two equally sized slices.
///
/// Extra trailing elements of the longer slice are ignored; callers are
/// expected to validate dimensions first.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Whether `v` has unit length within [`UNIT_NORM_TOLERANCE`].
pub fn is_unit(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

/// Return a unit-length copy of `v`.
///
/// Fails with `InvalidInput` for empty or zero-norm vectors, which have no
/// direction to preserve.
pub fn normalized(v: &[f32]) -> Result<Vec<f32>> {
    let norm = l2_norm(v);
    if v.is_empty() || norm == 0.0 || !norm.is_finite() {
        return Err(Error::invalid_input(
            "cannot normalize an empty, zero-norm, or non-finite vector",
        ));
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    (dot(a, b) / denom).clamp(-1.0, 1.0)
}

/// Map a cosine similarity from [-1, 1] into [0, 1].
pub fn to_unit_interval(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// `alpha * a + (1 - alpha) * b`, elementwise.
pub fn weighted_sum(a: &[f32], b: &[f32], alpha: f32) -> Vec<f32> {
    let beta = 1.0 - alpha;
    a.iter().zip(b).map(|(x, y)| alpha * x + beta * y).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_unit_length() {
        let v = normalized(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!(is_unit(&v));
    }

    #[test]
    fn test_normalized_rejects_zero_vector() {
        assert!(matches!(
            normalized(&[0.0, 0.0, 0.0]),
            Err(Error::InvalidInput(_))
        ));
        assert!(normalized(&[]).is_err());
    }

    #[test]
    fn test_cosine_bounds() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_to_unit_interval() {
        assert_eq!(to_unit_interval(1.0), 1.0);
        assert_eq!(to_unit_interval(-1.0), 0.0);
        assert_eq!(to_unit_interval(0.0), 0.5);
    }

    #[test]
    fn test_weighted_sum() {
        let v = weighted_sum(&[1.0, 0.0], &[0.0, 1.0], 0.7);
        assert!((v[0] - 0.7).abs() < 1e-6);
        assert!((v[1] - 0.3).abs() < 1e-6);
    }
}
