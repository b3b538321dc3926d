//! Vector math primitives
//!
//! Pure functions shared by the embedding pipeline, similarity maintenance,
//! cluster routing, and the re-ranker. All operations are non-blocking.

/// Raised when two vectors of different lengths reach a pairwise operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Vector length mismatch: {left} vs {right}")]
pub struct DimensionMismatch {
    /// Length of the left operand
    pub left: usize,
    /// Length of the right operand
    pub right: usize,
}

/// Cosine similarity between two vectors of identical length
///
/// Returns 0.0 when either vector is empty or zero-norm. Mismatched lengths
/// are an error, never a silent zero: truncation is the caller's decision.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Ok(0.0);
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        Ok(dot / denominator)
    } else {
        Ok(0.0)
    }
}

/// Dot product of two equal-length vectors
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Leading `k` components of a vector, without rescaling
///
/// Matryoshka truncation: the dense model is trained so a leading prefix is
/// itself a meaningful embedding. Shorter inputs are returned unchanged.
pub fn truncate_to(vector: &[f32], k: usize) -> Vec<f32> {
    vector.iter().take(k).copied().collect()
}

/// Clamp a score into [0, 1]
#[inline]
pub fn unit_clamp(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Min-max normalize scores in place to [0, 1]
///
/// A degenerate set (all scores equal) maps every entry to 1.0 so a single
/// strong hit does not normalize itself to zero.
pub fn min_max_normalize(scores: &mut [(String, f64)]) {
    if scores.is_empty() {
        return;
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = scores
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    for (_, score) in scores.iter_mut() {
        *score = if span > f64::EPSILON {
            (*score - min) / span
        } else {
            1.0
        };
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_empty_is_zero() {
        let a: Vec<f32> = vec![];
        let b: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_fails() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        let err = cosine_similarity(&a, &b).unwrap_err();
        assert_eq!(err.left, 2);
        assert_eq!(err.right, 3);
    }

    #[test]
    fn test_truncate_to_keeps_prefix_unscaled() {
        let v = vec![0.5, -0.25, 0.125, 0.0625];
        let truncated = truncate_to(&v, 2);
        assert_eq!(truncated, vec![0.5, -0.25]);

        // Shorter than k: unchanged
        assert_eq!(truncate_to(&v, 16), v);
    }

    #[test]
    fn test_min_max_normalize() {
        let mut scores = vec![
            ("a".to_string(), 2.0),
            ("b".to_string(), 4.0),
            ("c".to_string(), 6.0),
        ];
        min_max_normalize(&mut scores);
        assert_eq!(scores[0].1, 0.0);
        assert_eq!(scores[1].1, 0.5);
        assert_eq!(scores[2].1, 1.0);
    }

    #[test]
    fn test_min_max_normalize_degenerate() {
        let mut scores = vec![("a".to_string(), 3.0), ("b".to_string(), 3.0)];
        min_max_normalize(&mut scores);
        assert!(scores.iter().all(|(_, s)| *s == 1.0));
    }
}
