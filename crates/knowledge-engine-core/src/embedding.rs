//! Embedder port (C2): the `text → Vec<f32>` capability the core
//! requires from its environment, plus vector (de)serialization helpers
//! shared by every [`Store`](crate::store::Store) implementation.
//!
//! The core never assumes a particular provider. Concrete remote
//! providers (an HTTP embeddings API, for instance) are an external
//! collaborator and live outside this crate; [`HashEmbedder`] is the
//! deterministic, dependency-free stand-in used by tests and by the
//! in-memory store's doctest.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Input text is trimmed and truncated to this many characters before
/// being handed to a provider (§4.2).
pub const MAX_INPUT_CHARS: usize = 6_000;

pub fn prepare_text(text: &str) -> String {
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.chars().count() <= MAX_INPUT_CHARS {
        trimmed
    } else {
        trimmed.chars().take(MAX_INPUT_CHARS).collect()
    }
}

/// Trait for embedding providers.
///
/// `embed_one` may fail (timeout, transport error); `embed_batch_raw` may
/// embed several texts in one round trip and may also fail as a whole.
/// The free function [`embed_batch`] is what ingestion actually calls —
/// it degrades a whole-batch failure to per-item calls, and a per-item
/// failure to a zero vector, so the caller never sees an error here
/// (§4.2, §8 scenario 5).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Default batch implementation: sequential `embed_one` calls.
    /// Providers with a native batch endpoint should override this.
    async fn embed_batch_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }
}

/// Embed a batch of texts, never failing: a whole-batch error falls back
/// to per-item embedding, and a per-item error becomes a zero vector so
/// the output length always matches the input length.
pub async fn embed_batch(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Vec<Vec<f32>> {
    let batch_size = batch_size.max(1);
    let prepared: Vec<String> = texts.iter().map(|t| prepare_text(t)).collect();
    let mut out = Vec::with_capacity(prepared.len());

    for batch in prepared.chunks(batch_size) {
        match provider.embed_batch_raw(batch).await {
            Ok(vectors) if vectors.len() == batch.len() => out.extend(vectors),
            _ => {
                for text in batch {
                    let vec = provider
                        .embed_one(text)
                        .await
                        .unwrap_or_else(|_| vec![0.0; provider.dims()]);
                    out.push(vec);
                }
            }
        }
    }
    out
}

/// A deterministic, dependency-free embedding stand-in.
///
/// Produces a unit vector from repeated SHA-256 hashing of the input
/// text, seeded per output dimension. Not semantically meaningful — used
/// purely so tests and the in-memory store have something cheap and
/// reproducible to embed against.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(crate::models::EMBEDDING_DIMS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-stub"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embed(text, self.dims))
    }
}

fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dims);
    let mut counter: u32 = 0;
    while values.len() < dims {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks_exact(4) {
            if values.len() >= dims {
                break;
            }
            let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            // Map to [-1.0, 1.0].
            let v = (bits as f64 / u32::MAX as f64) * 2.0 - 1.0;
            values.push(v as f32);
        }
        counter += 1;
    }
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in &mut values {
            *v /= norm;
        }
    }
    values
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors,
/// mismatched lengths, or a near-zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// SHA-256 of a vector's raw little-endian f32 bytes, as lowercase hex.
/// The manifest and `Embedding::checksum` both derive from this (§3, §8
/// "checksum stability").
pub fn vector_checksum(vec: &[f32]) -> String {
    let blob = vec_to_blob(vec);
    let mut hasher = Sha256::new();
    hasher.update(&blob);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(16);
        let a = hash_embed("hello world", embedder.dims);
        let b = hash_embed("hello world", embedder.dims);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn hash_embedder_differs_per_input() {
        let a = hash_embed("alpha", 16);
        let b = hash_embed("beta", 16);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn embed_batch_matches_input_length() {
        let embedder = HashEmbedder::new(8);
        let texts: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let out = embed_batch(&embedder, &texts, 2).await;
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn prepare_text_truncates_and_collapses_whitespace() {
        let input = "a  b\n\tc";
        assert_eq!(prepare_text(input), "a b c");
        let long = "x".repeat(MAX_INPUT_CHARS + 500);
        assert_eq!(prepare_text(&long).chars().count(), MAX_INPUT_CHARS);
    }
}
