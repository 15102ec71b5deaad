//! Fixed-size character windows with overlap.

use std::iter;

use uuid::Uuid;

use crate::vector_entry::Chunk;

/// Splits text into windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one.
///
/// Whitespace-only windows are dropped; kept chunks are numbered
/// contiguously from 0.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeChunker {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl FixedSizeChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    fn stride(&self) -> usize {
        if self.overlap < self.chunk_size {
            self.chunk_size - self.overlap
        } else {
            self.chunk_size
        }
    }

    pub fn chunk(&self, text: &str, document_id: Uuid, file_name: &str) -> Vec<Chunk> {
        // byte offset of every char boundary, including the end of the text
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(iter::once(text.len()))
            .collect();
        let char_count = offsets.len() - 1;
        let stride = self.stride();

        let mut chunks = Vec::with_capacity(char_count / stride + 1);
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            let window = &text[offsets[start]..offsets[end]];
            if !window.trim().is_empty() {
                chunks.push(Chunk::new(
                    document_id,
                    file_name,
                    chunks.len(),
                    start,
                    window.to_string(),
                ));
            }
            if end == char_count {
                break;
            }
            start += stride;
        }
        chunks
    }
}
