// Embedding capability boundary.
//
// Vector computation is an external, possibly slow and fallible dependency.
// The engine treats it as an injected trait object, always invoked with a
// timeout; a timeout marks the call failed and leaves its checkpoint intact
// for retry.

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::EmbedderError;
use crate::index::lexical;

/// Produces a fixed-dimension vector for a piece of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder returns.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
}

/// Invoke the embedder under a timeout and verify the returned dimension.
pub async fn embed_with_timeout(
    embedder: &dyn Embedder,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>, EmbedderError> {
    let vector = tokio::time::timeout(timeout, embedder.embed(text))
        .await
        .map_err(|_| EmbedderError::Timeout {
            timeout_secs: timeout.as_secs(),
        })??;

    if vector.len() != embedder.dimension() {
        return Err(EmbedderError::DimensionMismatch {
            expected: embedder.dimension(),
            got: vector.len(),
        });
    }

    Ok(vector)
}

/// Deterministic local embedder: hashed bag-of-words, L2-normalized.
/// Texts sharing vocabulary land near each other, which is enough for the
/// engine's own behavior; production deployments inject a model-backed
/// implementation instead.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in lexical::tokenize(text) {
            let bucket = fnv1a(token.as_bytes()) as usize % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);

        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);

        let c = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("guidance for the full year").await.unwrap();
        let b = embedder.embed("guidance for the full year").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), embedder.dimension());
    }

    #[tokio::test]
    async fn test_similar_texts_score_higher() {
        let embedder = HashingEmbedder::default();
        let base = embedder.embed("raising full year guidance").await.unwrap();
        let close = embedder.embed("full year guidance raised").await.unwrap();
        let far = embedder.embed("weather was pleasant").await.unwrap();

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_embedder_error() {
        struct SlowEmbedder;

        #[async_trait]
        impl Embedder for SlowEmbedder {
            fn dimension(&self) -> usize {
                4
            }

            async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![0.0; 4])
            }
        }

        let err = embed_with_timeout(&SlowEmbedder, "text", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedderError::Timeout { .. }));
    }
}
