use crate::config::Number;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous span of a document's extracted text.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `<document_id>:<ordinal>`
    pub id: String,
    pub document_id: Uuid,
    pub file_name: String,
    /// Position among the document's kept chunks, starting at 0.
    pub ordinal: usize,
    /// Character offset of the window within the extracted text.
    pub start: usize,
    pub text: String,
}

impl Chunk {
    pub fn new(document_id: Uuid, file_name: &str, ordinal: usize, start: usize, text: String) -> Self {
        Self {
            id: format!("{}:{}", document_id, ordinal),
            document_id,
            file_name: file_name.to_string(),
            ordinal,
            start,
            text,
        }
    }

    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.text.chars().take(max_chars).collect();
        if self.text.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

/// One slot of the vector index. Owns its chunk, so an entry can never
/// point at a chunk that no longer exists.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexEntry {
    pub position: usize,
    pub chunk: Chunk,
    pub vector: Vec<Number>,
}
