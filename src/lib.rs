//! Chat with your documents: upload text or PDF files, ask questions, and get
//! answers grounded in the retrieved passages.
//!
//! ```text
//! upload ─► document ─► chunk ─► embed ─► index (+ snapshot)
//! chat   ─► session ─► embed ─► index.query ─► prompt ─► generate
//! ```

pub mod ann;
pub mod chunk;
pub mod config;
pub mod document;
pub mod embed;
pub mod error;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod rag;
pub mod search;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod vector_entry;
pub mod vector_ops;

pub use error::{Error, Result};
