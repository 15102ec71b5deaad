//! Document → chunks → embeddings → index.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::chunk::FixedSizeChunker;
use crate::document::{Document, DocumentKind};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::index::SharedIndex;
use crate::snapshot::Snapshot;

/// Acknowledgement for one ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: Uuid,
    pub file_name: String,
    pub kind: DocumentKind,
    pub checksum: String,
    pub chunks: usize,
}

pub struct IngestionPipeline {
    chunker: FixedSizeChunker,
    embedder: Arc<dyn Embedder>,
    index: SharedIndex,
    snapshot: Option<Arc<Snapshot>>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: FixedSizeChunker,
        embedder: Arc<dyn Embedder>,
        index: SharedIndex,
        snapshot: Option<Arc<Snapshot>>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            snapshot,
        }
    }

    /// Reloads every snapshotted entry into the (empty) index.
    pub fn restore(&self) -> Result<usize> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(0);
        };
        let entries = snapshot.load()?;
        if let Some(first) = entries.first() {
            let expected = self.embedder.dimension();
            if first.vector.len() != expected {
                return Err(Error::Storage(format!(
                    "snapshot at '{}' holds {}-d vectors but embedder '{}' produces {expected}-d; \
                     use another DOCCHAT_SNAPSHOT_DIR or the original embedding model",
                    snapshot.path().display(),
                    first.vector.len(),
                    self.embedder.model_name(),
                )));
            }
        }
        let mut index = self
            .index
            .write()
            .map_err(|_| Error::Index("index lock poisoned".to_string()))?;
        if !index.is_empty() {
            return Err(Error::Index("refusing to restore into a non-empty index".to_string()));
        }
        let restored = index.restore(entries)?;
        tracing::info!(entries = restored, path = %snapshot.path().display(), "index restored from snapshot");
        Ok(restored)
    }

    pub fn ingest_bytes(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<IngestReport> {
        let document = Document::new(file_name, content_type, bytes)?;
        self.ingest(document)
    }

    /// Blocking: extraction and embedding are CPU-bound, so async callers
    /// should run this on a blocking thread.
    pub fn ingest(&self, document: Document) -> Result<IngestReport> {
        let start = Instant::now();
        let text = document.extract_text()?;
        let chunks = self.chunker.chunk(&text, document.id, &document.file_name);
        if chunks.is_empty() {
            return Err(Error::Extraction(format!(
                "{}: no readable text",
                document.file_name
            )));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_documents(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "model returned {} embeddings for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let chunk_count = chunks.len();

        {
            let mut index = self
                .index
                .write()
                .map_err(|_| Error::Index("index lock poisoned".to_string()))?;
            let range = index.insert_batch(vectors, chunks)?;
            if let Some(snapshot) = &self.snapshot {
                if let Err(e) = snapshot.append(&index.entries()[range.clone()]) {
                    index.rollback_to(range.start);
                    return Err(e);
                }
            }
        }

        tracing::info!(
            document_id = %document.id,
            file_name = %document.file_name,
            kind = %document.kind,
            chunks = chunk_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document ingested"
        );

        Ok(IngestReport {
            document_id: document.id,
            file_name: document.file_name,
            kind: document.kind,
            checksum: document.checksum,
            chunks: chunk_count,
        })
    }
}
