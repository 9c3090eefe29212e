pub mod provider;
pub mod snapshot;
pub mod store;

use std::future::Future;
use std::pin::Pin;

pub use provider::{EmbeddingClient, Provider};
pub use snapshot::{ScoredChunk, SnapshotId, SnapshotMeta, StoredChunk};
pub use store::VectorStore;

use crate::error::EmbeddingError;

pub type EmbedFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<Vec<f32>, EmbeddingError>> + Send + 'a>>;

/// Anything that can turn text into a vector.
///
/// Async because real backends perform HTTP requests. Implement this to plug
/// in another provider or a deterministic local embedder.
pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str, model: &'a str) -> EmbedFuture<'a>;
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize_vector(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 || !norm.is_finite() {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

/// Dot product; `None` when the dimensions differ or either side is empty.
pub fn dot(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    Some(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return None;
    }

    Some(dot_product / (magnitude_a * magnitude_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_self_similarity_is_one() {
        for v in [vec![3.0, 4.0], vec![0.1, -7.5, 2.25, 9.0], vec![1e-3; 64]] {
            let n = normalize_vector(&v);
            let sim = cosine_similarity(&n, &n).unwrap();
            assert!((sim - 1.0).abs() < 1e-6, "got {}", sim);
            let d = dot(&n, &n).unwrap();
            assert!((d - 1.0).abs() < 1e-5, "got {}", d);
        }
    }

    #[test]
    fn test_normalized_dot_matches_cosine() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-2.0, 0.5, 4.0];
        let cos = cosine_similarity(&a, &b).unwrap();
        let d = dot(&normalize_vector(&a), &normalize_vector(&b)).unwrap();
        assert!((cos - d).abs() < 1e-6);
    }

    #[test]
    fn test_zero_and_mismatched_vectors() {
        assert_eq!(normalize_vector(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_none());
        assert!(dot(&[], &[]).is_none());
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]), Some(-1.0));
    }
}
