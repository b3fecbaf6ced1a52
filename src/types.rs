//! Shared error type for the ingestion and query pipeline.

use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Ingestion-time errors ([`NotFound`](RagError::NotFound),
/// [`Parse`](RagError::Parse), [`Configuration`](RagError::Configuration),
/// [`Storage`](RagError::Storage)) are fatal and abort the whole run;
/// nothing is committed to the vector store on failure. Query-time
/// [`Gateway`](RagError::Gateway) errors propagate to the caller; only the
/// outermost interactive loop turns them into display strings.
#[derive(Debug, Error)]
pub enum RagError {
    /// A named input (corpus file, collection) does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// The corpus is not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid chunking parameters, retrieval knobs, or missing credentials.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Vector index open/write failure, including dimension mismatches.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedding or LLM call failure, including timeouts.
    #[error("gateway error: {0}")]
    Gateway(String),
}
