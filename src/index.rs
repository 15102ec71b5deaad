//! Append-only in-memory vector index.

use std::ops::Range;
use std::sync::{Arc, RwLock};

use crate::ann::RandomProjectionIndex;
use crate::config::{Number, Settings};
use crate::embed::Embedding;
use crate::error::{Error, Result};
use crate::search::{self, ScoredChunk, SearchMethod, SearchTimings};
use crate::vector_entry::{Chunk, IndexEntry};
use crate::vector_ops::normalize_vector;

/// Index shared between request handlers: many readers, one writer.
pub type SharedIndex = Arc<RwLock<VectorIndex>>;

pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimensions: Option<usize>,
    search_method: SearchMethod,
    ann_num_projections: usize,
    ann_num_tables: usize,
    ann_index: Option<RandomProjectionIndex>,
}

impl VectorIndex {
    pub fn new(search_method: SearchMethod, ann_num_projections: usize, ann_num_tables: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimensions: None,
            search_method,
            ann_num_projections,
            ann_num_tables,
            ann_index: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.search_method,
            settings.ann_num_projections,
            settings.ann_num_tables,
        )
    }

    pub fn shared(self) -> SharedIndex {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension fixed by the first insert.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn search_method(&self) -> SearchMethod {
        self.search_method
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn insert(&mut self, vector: Embedding, chunk: Chunk) -> Result<usize> {
        let range = self.insert_batch(vec![vector], vec![chunk])?;
        Ok(range.start)
    }

    /// Appends one entry per `(vector, chunk)` pair. Either every pair is
    /// appended or, on any validation failure, none is.
    pub fn insert_batch(&mut self, vectors: Vec<Embedding>, chunks: Vec<Chunk>) -> Result<Range<usize>> {
        if vectors.len() != chunks.len() {
            return Err(Error::Index(format!(
                "{} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let Some(first) = vectors.first() else {
            return Ok(self.len()..self.len());
        };

        let expected = self.dimensions.unwrap_or(first.len());
        if expected == 0 {
            return Err(Error::Index("cannot index zero-length vectors".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(Error::Index(format!(
                "dimension mismatch: index holds {expected}-d vectors, got {}",
                bad.len()
            )));
        }

        self.dimensions = Some(expected);
        if self.search_method != SearchMethod::Exact && self.ann_index.is_none() {
            self.ann_index = Some(RandomProjectionIndex::new(
                expected,
                self.ann_num_projections,
                self.ann_num_tables,
            ));
        }

        let start = self.len();
        for (mut vector, chunk) in vectors.into_iter().zip(chunks) {
            normalize_vector(&mut vector);
            let position = self.entries.len();
            if let Some(ann) = self.ann_index.as_mut() {
                ann.add(&vector, position);
            }
            self.entries.push(IndexEntry {
                position,
                chunk,
                vector,
            });
        }
        Ok(start..self.len())
    }

    /// Rebuilds the index from previously snapshotted entries.
    pub fn restore(&mut self, entries: Vec<IndexEntry>) -> Result<usize> {
        let (vectors, chunks): (Vec<_>, Vec<_>) =
            entries.into_iter().map(|e| (e.vector, e.chunk)).unzip();
        let range = self.insert_batch(vectors, chunks)?;
        Ok(range.len())
    }

    /// Drops every entry at or after `len`. Only used to undo a batch whose
    /// snapshot write failed.
    pub(crate) fn rollback_to(&mut self, len: usize) {
        if len >= self.entries.len() {
            return;
        }
        self.entries.truncate(len);
        if self.entries.is_empty() {
            self.dimensions = None;
            self.ann_index = None;
            return;
        }
        if let Some(ann) = self.ann_index.as_mut() {
            let dim = self.dimensions.unwrap_or_default();
            *ann = RandomProjectionIndex::new(dim, self.ann_num_projections, self.ann_num_tables);
            for entry in &self.entries {
                ann.add(&entry.vector, entry.position);
            }
        }
    }

    pub fn query(&self, vector: &[Number], k: usize) -> Result<Vec<ScoredChunk>> {
        let (results, timings) = self.query_with_timings(vector, k)?;
        tracing::debug!(
            search_method = %self.search_method,
            entries = self.entries.len(),
            returned = results.len(),
            search_time = ?timings.search_duration,
            sort_time = ?timings.sort_duration,
            "index searched"
        );
        Ok(results)
    }

    pub fn query_with_timings(&self, vector: &[Number], k: usize) -> Result<(Vec<ScoredChunk>, SearchTimings)> {
        if self.is_empty() {
            return Err(Error::Index(
                "index is empty; upload a document first".to_string(),
            ));
        }
        if let Some(expected) = self.dimensions {
            if vector.len() != expected {
                return Err(Error::Index(format!(
                    "query has {} dimensions, index holds {expected}",
                    vector.len()
                )));
            }
        }

        let mut query = vector.to_vec();
        normalize_vector(&mut query);
        Ok(search::search(
            &self.entries,
            self.ann_index.as_ref(),
            self.search_method,
            &query,
            k,
        ))
    }
}
