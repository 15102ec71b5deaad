//! Sentence embedding providers.
//!
//! `FastEmbedder` runs a local ONNX sentence-transformer through fastembed;
//! `HashingEmbedder` is a model-free fallback for offline runs and tests.

use std::sync::Arc;

use crate::config::{Number, Settings};
use crate::error::{Error, Result};

/// A fixed-length embedding vector
pub type Embedding = Vec<Number>;

/// Maps text to fixed-dimension vectors.
pub trait Embedder: Send + Sync {
    /// Embed chunk texts for indexing. Returns one vector per input, in order.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a single query. Some models use a different prompt for queries.
    fn embed_query(&self, text: &str) -> Result<Embedding>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

mod onnx;
mod hashing;

pub use self::onnx::FastEmbedder;
pub use self::hashing::HashingEmbedder;

/// Builds the embedder named by `embedding_provider`.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match settings.embedding_provider.as_str() {
        "fastembed" => Ok(Arc::new(FastEmbedder::new(
            &settings.embedding_model,
            &settings.model_dir,
        )?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(settings.dimensions))),
        other => Err(Error::Embedding(format!("unknown embedding provider: {other}"))),
    }
}

/// Checks that a provider returned one vector per input.
pub(crate) fn ensure_batch_len(expected: usize, embeddings: &[Embedding]) -> Result<()> {
    if embeddings.len() != expected {
        return Err(Error::Embedding(format!(
            "model returned {} embeddings for {} inputs",
            embeddings.len(),
            expected
        )));
    }
    Ok(())
}
