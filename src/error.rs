//! Error taxonomy shared by ingestion, retrieval and generation.

use thiserror::Error;

/// Result type alias for docchat operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Upload is neither plain text nor PDF
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Document bytes could not be turned into text
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Embedding model failed to load or run
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Language model failed, returned garbage or timed out
    #[error("generation error: {0}")]
    Generation(String),

    /// Generation did not finish within the configured budget
    #[error("generation timed out after {0}s")]
    GenerationTimeout(u64),

    /// Query against an empty index, or an insert the index cannot accept
    #[error("index error: {0}")]
    Index(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Request body exceeds the configured upload limit
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Snapshot read/write failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Stable machine-readable name used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::Extraction(_) => "extraction_error",
            Error::Embedding(_) => "embedding_error",
            Error::Generation(_) | Error::GenerationTimeout(_) => "generation_error",
            Error::Index(_) => "index_error",
            Error::InvalidInput(_) => "invalid_input",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::SessionNotFound(_) => "session_not_found",
            Error::Storage(_) => "storage_error",
        }
    }
}

impl From<heed::Error> for Error {
    fn from(err: heed::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_reported_as_generation_error() {
        let err = Error::GenerationTimeout(30);
        assert_eq!(err.kind(), "generation_error");
        assert_eq!(err.to_string(), "generation timed out after 30s");
    }
}
