use sha2::{Digest, Sha256};

use crate::embed::{Embedder, Embedding};
use crate::error::{Error, Result};
use crate::vector_ops::normalize_vector;

/// Feature-hashing bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed (first 8 bytes of its
/// SHA-256, big-endian) into one of `dimension` buckets with a hash-derived
/// sign. The hash must not change between builds: snapshotted vectors are
/// compared against freshly embedded queries. Texts sharing words end up
/// close under cosine similarity.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0; self.dimension];
        for token in tokenize(text) {
            let hash = token_hash(&token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_vector(&mut vector);
        vector
    }
}

fn token_hash(token: &str) -> u64 {
    Sha256::digest(token.as_bytes())[..8]
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

impl Embedder for HashingEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn embed_query(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("cannot embed empty query".to_string()));
        }
        Ok(self.embed_one(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_ops::compute_cosine_similarity_simd;

    #[test]
    fn same_text_same_vector() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_query("The sky is blue.").unwrap();
        let b = embedder.embed_documents(&["the SKY is blue"]).unwrap().remove(0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn shared_words_score_higher() {
        let embedder = HashingEmbedder::new(384);
        let docs = embedder
            .embed_documents(&["The sky is blue.", "Rust compiles to machine code."])
            .unwrap();
        let query = embedder.embed_query("What color is the sky?").unwrap();
        let sky = compute_cosine_similarity_simd(&query, &docs[0]).unwrap();
        let rust = compute_cosine_similarity_simd(&query, &docs[1]).unwrap();
        assert!(sky > rust, "sky={sky} rust={rust}");
    }

    #[test]
    fn token_buckets_are_stable() {
        let embedder = HashingEmbedder::new(64);
        let v = embedder.embed_query("sky").unwrap();
        assert_eq!(v[16], 1.0);
        assert_eq!(v.iter().filter(|x| **x != 0.0).count(), 1);

        let v = embedder.embed_query("Blue").unwrap();
        assert_eq!(v[25], 1.0);
    }

    #[test]
    fn empty_query_is_rejected() {
        let embedder = HashingEmbedder::new(8);
        assert!(matches!(embedder.embed_query("  "), Err(Error::Embedding(_))));
    }
}
