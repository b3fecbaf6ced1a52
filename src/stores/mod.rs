//! Persistent vector storage for chunk embeddings.
//!
//! The pipeline talks to storage through the [`VectorStore`] trait so the
//! backing engine stays swappable. The shipped implementation is
//! [`sqlite::SqliteVectorStore`]: one SQLite file per collection with vector
//! search provided by the `sqlite-vec` extension.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ VectorStore trait│
//!                  │   (async CRUD)   │
//!                  └────────┬─────────┘
//!                           │
//!                           ▼
//!                  ┌──────────────────┐
//!                  │ SQLite + vec0    │
//!                  │ one file per     │
//!                  │ collection       │
//!                  └──────────────────┘
//! ```
//!
//! Score convention: implementations return **cosine similarity**, where
//! higher is better and identical vectors score 1.0. Backends that natively compute a
//! distance must invert it before returning.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunking::Chunk;
use crate::types::RagError;

pub use sqlite::SqliteVectorStore;

/// A chunk row as the store sees it: payload plus optional id and embedding.
///
/// On insert, a missing id is assigned by the store from insertion order and
/// collection state; the embedding is required. On lookup, the id is always
/// present and the embedding is not read back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: Option<String>,
    pub source: String,
    pub doc_index: usize,
    pub chunk_index: usize,
    pub char_offset: usize,
    pub content: String,
    pub metadata: Value,
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    pub fn new(source: impl Into<String>, chunk_index: usize, content: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            doc_index: 0,
            chunk_index,
            char_offset: 0,
            content: content.into(),
            metadata: Value::Object(Map::new()),
            embedding: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl From<Chunk> for ChunkRecord {
    fn from(chunk: Chunk) -> Self {
        ChunkRecord {
            id: None,
            source: chunk.source,
            doc_index: chunk.doc_index,
            chunk_index: chunk.chunk_index,
            char_offset: chunk.offset,
            content: chunk.content,
            metadata: Value::Object(chunk.metadata),
            embedding: None,
        }
    }
}

/// Snapshot of a collection's identity and size.
#[derive(Clone, Debug, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub count: usize,
}

/// Unified contract for chunk vector stores.
///
/// All mutations are durable before the call returns, and a concurrent
/// search never observes a partially written entry.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection this handle is bound to.
    fn collection(&self) -> &str;

    /// Embedding dimension the collection was created with.
    fn dimension(&self) -> usize;

    /// Appends records in order.
    ///
    /// Records without an id get one derived from insertion order and the
    /// collection's current state. A record whose explicit id already exists
    /// overwrites the stored entry (last-write-wins) instead of duplicating
    /// it. Records must carry an embedding of the collection's dimension.
    async fn add(&self, records: Vec<ChunkRecord>) -> Result<(), RagError>;

    /// Returns up to `k` records by descending cosine similarity to
    /// `query_vector`, ties broken by insertion order (earliest first).
    /// An under-populated collection yields fewer rows, never an error.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, RagError>;

    async fn info(&self) -> Result<CollectionInfo, RagError> {
        Ok(CollectionInfo {
            name: self.collection().to_string(),
            dimension: self.dimension(),
            count: self.count().await?,
        })
    }
}
