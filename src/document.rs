//! Uploaded documents and text extraction.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Pdf,
}

impl DocumentKind {
    /// Resolves the kind from the file extension, falling back to the
    /// declared content type only when the name has no extension.
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Result<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("txt" | "text" | "md" | "markdown") => Ok(DocumentKind::Text),
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some(other) => Err(Error::UnsupportedFormat(format!(
                "{file_name}: .{other} files are not supported (expected .txt, .md or .pdf)"
            ))),
            None => match content_type.map(|ct| ct.trim().to_ascii_lowercase()) {
                Some(ct) if ct.starts_with("application/pdf") => Ok(DocumentKind::Pdf),
                Some(ct) if ct.starts_with("text/") => Ok(DocumentKind::Text),
                _ => Err(Error::UnsupportedFormat(format!(
                    "{file_name}: cannot determine document type"
                ))),
            },
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Text => write!(f, "text"),
            DocumentKind::Pdf => write!(f, "pdf"),
        }
    }
}

/// A raw upload. Lives only for the duration of its ingestion.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub file_name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`; informational, never used for deduplication.
    pub checksum: String,
}

impl Document {
    pub fn new(file_name: &str, content_type: Option<&str>, bytes: Vec<u8>) -> Result<Self> {
        let kind = DocumentKind::detect(file_name, content_type)?;
        let checksum = format!("{:x}", Sha256::digest(&bytes));
        Ok(Self {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            kind,
            bytes,
            checksum,
        })
    }

    pub fn extract_text(&self) -> Result<String> {
        match self.kind {
            DocumentKind::Text => Ok(String::from_utf8_lossy(&self.bytes).into_owned()),
            DocumentKind::Pdf => extract_pdf_text(&self.file_name, &self.bytes),
        }
    }
}

fn extract_pdf_text(file_name: &str, bytes: &[u8]) -> Result<String> {
    let pdf = lopdf::Document::load_mem(bytes)
        .map_err(|e| Error::Extraction(format!("{file_name}: PDF parse error: {e}")))?;

    let mut pages = Vec::new();
    for page_number in pdf.get_pages().keys() {
        match pdf.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                // one unreadable page should not sink the whole document
                tracing::warn!(file_name, page = page_number, error = %e, "skipping unreadable PDF page");
                pages.push(String::new());
            }
        }
    }
    Ok(pages.join("\n"))
}
