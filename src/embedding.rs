//! Embedding function and vector utilities.
//!
//! Defines the [`Embedder`] seam and the default [`HashEmbedder`], a
//! deterministic, pure embedding: the text is lowercased and split into
//! alphanumeric words, every word (and a short prefix of each longer word,
//! so inflected forms overlap) is hashed, and each hash selects one vector
//! component, after which the vector is unit-normalized. No network call is
//! involved, and the same text always produces a bit-identical vector —
//! which the whole retrieval mechanism relies on. Any provider-backed
//! embedding may replace it as long as queries and documents go through the
//! exact same implementation.
//!
//! Scores throughout the crate are cosine *distances* (1 − cosine
//! similarity): lower is more similar. A backend with higher-is-better
//! semantics would require inverting both the retrieval threshold and the
//! sort direction.
//!
//! Also provides the BLOB codecs used to persist vectors in SQLite:
//! [`vec_to_blob`] / [`blob_to_vec`] store each `f32` as 4 little-endian
//! bytes.

use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;

/// Maps text to a fixed-dimension vector. Implementations must be
/// deterministic: retrieval quality is undefined if query and document
/// embeddings disagree.
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality.
    fn dims(&self) -> usize;
    /// Embed one text into a vector of exactly `dims()` components.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic hash-derived embedding over word tokens.
pub struct HashEmbedder {
    dims: usize,
    prefix_width: usize,
}

impl HashEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            dims: config.dims,
            prefix_width: config.prefix_width,
        }
    }

    /// Map one token to its vector component index.
    fn component(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(raw) % self.dims as u64) as usize
    }
}

impl Embedder for HashEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            vector[self.component(&word)] = 1.0;

            // Longer words also contribute a prefix component, so "tested"
            // and "testing" land on a shared component.
            if word.chars().count() > self.prefix_width {
                let prefix: String = word.chars().take(self.prefix_width).collect();
                vector[self.component(&prefix)] = 1.0;
            }
        }

        normalize(&mut vector);
        vector
    }
}

/// Divide by the Euclidean magnitude; a zero vector is left untouched.
fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Cosine similarity in `[-1, 1]`. Returns 0 for empty or mismatched vectors.
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

/// Cosine distance: lower = more similar. Identical direction scores 0,
/// orthogonal 1, opposite 2.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> HashEmbedder {
        HashEmbedder::new(&EmbeddingConfig::default())
    }

    #[test]
    fn embedding_is_deterministic() {
        let e = embedder();
        let a = e.embed("All batches shall be tested before release.");
        let b = e.embed("All batches shall be tested before release.");
        assert_eq!(a, b);
    }

    #[test]
    fn embedding_has_configured_dims_and_unit_norm() {
        let e = embedder();
        let v = e.embed("Some regulatory clause text for embedding.");
        assert_eq!(v.len(), 1536);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let e = embedder();
        let v = e.embed("");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn tokenization_ignores_case_and_punctuation() {
        let e = embedder();
        let a = e.embed("Batches SHALL be tested!");
        let b = e.embed("batches shall, be tested");
        assert_eq!(a, b);
    }

    #[test]
    fn shared_vocabulary_is_closer_than_unrelated_text() {
        let e = embedder();
        let clause = e.embed("Section 1: All batches shall be tested before release.");
        let near = e.embed("Batches are released without testing");
        let far = e.embed("Article 9: Packaging labels must include lot number.");

        let d_near = cosine_distance(&clause, &near);
        let d_far = cosine_distance(&clause, &far);
        // Shared words and word prefixes pull related texts under the
        // retrieval threshold; disjoint vocabulary stays at distance 1.
        assert!(d_near < 0.75, "related texts too far apart: {}", d_near);
        assert!(d_far >= 0.75, "unrelated texts too close: {}", d_far);
        assert!(d_near < d_far);
    }

    #[test]
    fn cosine_distance_extremes() {
        let v = vec![1.0, 0.0];
        assert!((cosine_distance(&v, &v)).abs() < 1e-6);
        assert!((cosine_distance(&v, &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&v, &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}
