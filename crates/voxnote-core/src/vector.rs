//! Vector math shared by the resolver, the centroid maintainer and the
//! in-memory store.

/// Cosine similarity `dot(a,b) / (|a||b|)`.
///
/// Returns `None` when the vectors differ in dimension, are empty, or either
/// has zero magnitude, so callers can treat the comparison as "no match"
/// instead of failing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        None
    } else {
        Some(dot / (norm_a * norm_b))
    }
}

/// Whether two vectors can be compared element-wise.
pub fn same_dimension(a: &[f32], b: &[f32]) -> bool {
    !a.is_empty() && a.len() == b.len()
}

/// Element-wise mean of `vectors`.
///
/// Only vectors with the dimension of the first one participate. Returns
/// `None` for an empty input.
pub fn mean_of(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dim = vectors.iter().find(|v| !v.is_empty())?.len();
    let members: Vec<&Vec<f32>> = vectors.iter().filter(|v| v.len() == dim).collect();

    let mut sum = vec![0.0f64; dim];
    for v in &members {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += *x as f64;
        }
    }
    let n = members.len() as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_dimension_mismatch_is_none() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_cosine_zero_vector_is_none() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
    }

    #[test]
    fn test_mean_of_vectors() {
        let mean = mean_of(&[vec![1.0, 3.0], vec![3.0, 5.0]]).unwrap();
        assert_eq!(mean, vec![2.0, 4.0]);
    }

    #[test]
    fn test_mean_skips_other_dimensions() {
        let mean = mean_of(&[vec![2.0, 2.0], vec![9.0, 9.0, 9.0], vec![4.0, 4.0]]).unwrap();
        assert_eq!(mean, vec![3.0, 3.0]);
    }

    #[test]
    fn test_mean_of_empty() {
        assert!(mean_of(&[]).is_none());
    }

    #[test]
    fn test_same_dimension() {
        assert!(same_dimension(&[1.0], &[2.0]));
        assert!(!same_dimension(&[], &[]));
        assert!(!same_dimension(&[1.0], &[1.0, 2.0]));
    }
}
