use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embed::{ensure_batch_len, Embedder, Embedding};
use crate::error::{Error, Result};

const BGE_QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// Local ONNX sentence embeddings via fastembed.
///
/// Weights are downloaded on first use into `model_dir` and read from there
/// afterwards.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
    query_prefix: Option<&'static str>,
}

impl FastEmbedder {
    pub fn new(model_name: &str, model_dir: &str) -> Result<Self> {
        let (model, dimension, query_prefix) = resolve_model(model_name)?;
        tracing::info!(model = model_name, model_dir, "loading embedding model");

        let opts = InitOptions::new(model)
            .with_cache_dir(PathBuf::from(model_dir))
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(opts).map_err(|e| Error::Embedding(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimension,
            query_prefix,
        })
    }

    fn run(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("embedding model lock poisoned".to_string()))?;
        model.embed(texts, None).map_err(|e| Error::Embedding(e.to_string()))
    }
}

fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize, Option<&'static str>)> {
    let normalized = name
        .trim()
        .trim_start_matches("sentence-transformers/")
        .to_ascii_lowercase();
    match normalized.as_str() {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384, None)),
        "baai/bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384, Some(BGE_QUERY_PREFIX))),
        "baai/bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768, Some(BGE_QUERY_PREFIX))),
        _ => Err(Error::Embedding(format!("unsupported embedding model: {name}"))),
    }
}

impl Embedder for FastEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.run(texts.iter().map(|t| t.to_string()).collect())?;
        ensure_batch_len(texts.len(), &embeddings)?;
        Ok(embeddings)
    }

    fn embed_query(&self, text: &str) -> Result<Embedding> {
        let query = match self.query_prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };
        self.run(vec![query])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
