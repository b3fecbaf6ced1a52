//! End-to-end orchestration: ingestion and query paths.
//!
//! ```text
//! ingest: JsonLoader ──► TextSplitter ──► EmbeddingProvider ──► VectorStore
//! query:  question ──► EmbeddingProvider ──► VectorStore.search
//!                 ──► Retriever (top-K / threshold) ──► AnswerSynthesizer
//! ```
//!
//! Ingestion is all-or-nothing: chunks are embedded first and only then
//! written to the store in a single batch, so a gateway failure or abort
//! leaves the collection untouched. Query-time gateway errors propagate to
//! the caller; rendering them as display strings is left to the outermost
//! interactive loop.

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::answer::{AnswerSynthesizer, QueryAnswer};
use crate::chunking::{Chunk, TextSplitter};
use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::llm::CompletionProvider;
use crate::loader::{Document, JsonLoader, LoadOptions};
use crate::retrieval::{Retriever, RetrievalResult, ScoredChunk};
use crate::stores::{ChunkRecord, CollectionInfo, VectorStore};
use crate::types::RagError;

/// Summary of one ingestion run.
#[derive(Clone, Debug, serde::Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub documents: usize,
    pub chunks: usize,
    pub stored: usize,
}

/// Snapshot of the pipeline's configuration and collection state.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PipelineInfo {
    pub collection: CollectionInfo,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub embedding_model: String,
    pub llm_model: String,
}

/// The assembled retrieval-augmented QA pipeline.
///
/// Constructed once from a validated [`RagConfig`] plus the gateway and
/// storage handles; immutable afterwards. Designed for single-flight use
/// (one ingestion run or query at a time), though the store itself serializes
/// concurrent access.
pub struct RagPipeline {
    config: RagConfig,
    splitter: TextSplitter,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
}

impl RagPipeline {
    /// Validates the configuration and wires the components together.
    ///
    /// Fails with [`RagError::Configuration`] on invalid knobs or when the
    /// embedder's dimension does not match the store's collection.
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn CompletionProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, RagError> {
        config.validate()?;
        if embedder.dimension() != store.dimension() {
            return Err(RagError::Configuration(format!(
                "embedding dimension {} does not match collection '{}' dimension {}",
                embedder.dimension(),
                store.collection(),
                store.dimension()
            )));
        }
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let retriever = Retriever::new(embedder.clone(), store.clone());
        let synthesizer = AnswerSynthesizer::new(llm);
        Ok(Self {
            config,
            splitter,
            embedder,
            store,
            retriever,
            synthesizer,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Loads a JSON corpus file and ingests the documents it yields.
    pub async fn ingest_file(
        &self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<IngestReport, RagError> {
        let documents = JsonLoader::new(path.as_ref()).load(options).await?;
        self.ingest_documents(documents).await
    }

    /// Ingests an already-parsed JSON corpus value.
    pub async fn ingest_value(
        &self,
        value: &serde_json::Value,
        source: &str,
        options: &LoadOptions,
    ) -> Result<IngestReport, RagError> {
        let documents = crate::loader::documents_from_value(value, source, options);
        self.ingest_documents(documents).await
    }

    /// Chunks, embeds, and persists documents as one atomic run.
    ///
    /// Every chunk is embedded exactly once via `embed_batch`; the store is
    /// only touched after the whole batch embedded successfully, so a failed
    /// run commits nothing. Chunk ids are derived from source and position,
    /// which makes re-ingesting the same corpus overwrite its previous rows
    /// instead of duplicating them.
    pub async fn ingest_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<IngestReport, RagError> {
        let run_id = Uuid::new_v4();
        let chunks = self.splitter.split_documents(&documents);
        info!(
            %run_id,
            documents = documents.len(),
            chunks = chunks.len(),
            "ingestion run started"
        );
        if chunks.is_empty() {
            return Ok(IngestReport {
                run_id,
                documents: documents.len(),
                chunks: 0,
                stored: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Gateway(format!(
                "embedding gateway returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let id = chunk_id(&chunk);
                ChunkRecord::from(chunk).with_id(id).with_embedding(embedding)
            })
            .collect();
        let stored = records.len();
        self.store.add(records).await?;

        info!(%run_id, stored, "ingestion run committed");
        Ok(IngestReport {
            run_id,
            documents: documents.len(),
            chunks: stored,
            stored,
        })
    }

    /// Answers a question from the ingested corpus, citing its sources.
    pub async fn query(&self, question: &str) -> Result<QueryAnswer, RagError> {
        let retrieved = self.retrieve(question).await?;
        self.synthesizer.synthesize(question, &retrieved).await
    }

    /// Runs retrieval only, without answer synthesis.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult, RagError> {
        self.retriever
            .retrieve(
                question,
                self.config.top_k,
                self.config.similarity_threshold,
            )
            .await
    }

    /// Nearest chunks without the relevance threshold, for inspection.
    pub async fn similar_chunks(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        self.retriever.similar_chunks(question, k).await
    }

    /// Reports the collection state and the effective configuration.
    pub async fn info(&self) -> Result<PipelineInfo, RagError> {
        Ok(PipelineInfo {
            collection: self.store.info().await?,
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            top_k: self.config.top_k,
            similarity_threshold: self.config.similarity_threshold,
            embedding_model: self.config.embedding_model.clone(),
            llm_model: self.config.llm_model.clone(),
        })
    }
}

/// Stable chunk identity: same corpus position → same id across runs.
fn chunk_id(chunk: &Chunk) -> String {
    format!("{}:{}:{}", chunk.source, chunk.doc_index, chunk.chunk_index)
}
