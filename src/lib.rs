//! Retrieval-augmented question answering over JSON corpora.
//!
//! ```text
//! JSON corpus ──► loader ──► chunking ──► embeddings ──► stores::sqlite
//!                                                              │
//! question ──► embeddings ──► stores search ──► retrieval ─────┘
//!                                  │
//!                                  └─► answer (LLM gateway) ──► QueryAnswer
//! ```
//!
//! The crate splits semi-structured JSON documents into overlapping
//! fixed-size chunks along semantic boundaries, embeds them through a
//! `rig-core` provider, persists the vectors in a SQLite collection indexed
//! by `sqlite-vec`, and at query time retrieves the top-K chunks above a
//! similarity threshold to ground an LLM answer with cited sources.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragmill::{
//!     LoadOptions, MockCompletionProvider, MockEmbeddingProvider, RagConfig, RagPipeline,
//!     SqliteVectorStore,
//! };
//!
//! let config = RagConfig::from_env()?;
//! let embedder = Arc::new(MockEmbeddingProvider::new());
//! let store = Arc::new(
//!     SqliteVectorStore::open_or_create(
//!         &config.persist_directory,
//!         &config.collection_name,
//!         embedder.dimension(),
//!     )
//!     .await?,
//! );
//! let pipeline = RagPipeline::new(
//!     config,
//!     embedder,
//!     Arc::new(MockCompletionProvider::new()),
//!     store,
//! )?;
//!
//! pipeline.ingest_file("corpus.json", &LoadOptions::default()).await?;
//! let answer = pipeline.query("What does section 5 require?").await?;
//! println!("{}", answer.answer);
//! ```

pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod retrieval;
pub mod stores;
pub mod types;

pub use answer::{AnswerSynthesizer, QueryAnswer, SourceDocument};
pub use chunking::{Chunk, DEFAULT_SEPARATORS, TextSplitter};
pub use config::RagConfig;
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, RigEmbedding};
pub use llm::{CompletionProvider, MockCompletionProvider, RigCompletion};
pub use loader::{Document, FieldPolicy, JsonLoader, LoadOptions, analyze_structure};
pub use pipeline::{IngestReport, PipelineInfo, RagPipeline};
pub use retrieval::{RetrievalResult, Retriever, ScoredChunk};
pub use stores::{ChunkRecord, CollectionInfo, SqliteVectorStore, VectorStore};
pub use types::RagError;
