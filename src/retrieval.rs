//! Similarity search with top-K and relevance-threshold policies.
//!
//! The retriever embeds a question exactly once, asks the vector store for
//! the `top_k` nearest chunks, and then drops everything scoring below the
//! similarity threshold. The two knobs are independent: `top_k` bounds index
//! traversal, the threshold bounds relevance. That is why the threshold is
//! applied after the search, never pushed into it.

use std::sync::Arc;

use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::stores::{ChunkRecord, VectorStore};
use crate::types::RagError;

/// One retrieved chunk with its cosine similarity to the question.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub record: ChunkRecord,
    pub score: f32,
}

/// Chunks relevant to one question, descending by score, length ≤ top_k.
///
/// Empty is a valid outcome, not an error: it means nothing in the index
/// cleared the threshold.
#[derive(Clone, Debug, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.hits.iter()
    }
}

/// Orchestrates question embedding, index search, and filtering.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Returns the chunks grounding `question`.
    ///
    /// `top_k` must be positive and `similarity_threshold` must lie in
    /// [0, 1]; violations are [`RagError::Configuration`].
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<RetrievalResult, RagError> {
        if top_k == 0 {
            return Err(RagError::Configuration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(RagError::Configuration(format!(
                "similarity_threshold ({similarity_threshold}) must lie in [0, 1]"
            )));
        }

        let query_vector = self.embedder.embed(question).await?;
        let candidates = self.store.search(&query_vector, top_k).await?;
        let considered = candidates.len();

        let hits: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|(_, score)| *score >= similarity_threshold)
            .map(|(record, score)| ScoredChunk { record, score })
            .collect();

        debug!(
            considered,
            kept = hits.len(),
            threshold = similarity_threshold,
            "retrieval complete"
        );
        Ok(RetrievalResult { hits })
    }

    /// Raw nearest-neighbor lookup without the threshold filter, for
    /// inspection workflows.
    pub async fn similar_chunks(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let query_vector = self.embedder.embed(question).await?;
        let candidates = self.store.search(&query_vector, k).await?;
        Ok(candidates
            .into_iter()
            .map(|(record, score)| ScoredChunk { record, score })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use async_trait::async_trait;

    /// In-memory store stub with fixed scored rows.
    struct FixedStore {
        rows: Vec<(ChunkRecord, f32)>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        fn collection(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            64
        }

        async fn add(&self, _records: Vec<ChunkRecord>) -> Result<(), RagError> {
            unimplemented!("read-only stub")
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            k: usize,
        ) -> Result<Vec<(ChunkRecord, f32)>, RagError> {
            Ok(self.rows.iter().take(k).cloned().collect())
        }

        async fn count(&self) -> Result<usize, RagError> {
            Ok(self.rows.len())
        }
    }

    fn scored(source: &str, score: f32) -> (ChunkRecord, f32) {
        (ChunkRecord::new(source, 0, format!("{source} text")), score)
    }

    fn retriever(rows: Vec<(ChunkRecord, f32)>) -> Retriever {
        Retriever::new(
            Arc::new(MockEmbeddingProvider::new()),
            Arc::new(FixedStore { rows }),
        )
    }

    #[tokio::test]
    async fn scores_below_threshold_are_dropped() {
        let retriever = retriever(vec![
            scored("a", 0.95),
            scored("b", 0.80),
            scored("c", 0.55),
        ]);
        let result = retriever.retrieve("question", 5, 0.7).await.unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|hit| hit.score >= 0.7));
    }

    #[tokio::test]
    async fn order_is_non_increasing() {
        let retriever = retriever(vec![
            scored("a", 0.9),
            scored("b", 0.9),
            scored("c", 0.8),
        ]);
        let result = retriever.retrieve("question", 5, 0.0).await.unwrap();
        let scores: Vec<f32> = result.iter().map(|hit| hit.score).collect();
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[tokio::test]
    async fn top_k_bounds_the_result() {
        let retriever = retriever(vec![
            scored("a", 0.99),
            scored("b", 0.98),
            scored("c", 0.97),
            scored("d", 0.96),
        ]);
        let result = retriever.retrieve("question", 3, 0.5).await.unwrap();
        assert_eq!(result.len(), 3);
    }

    #[tokio::test]
    async fn empty_store_yields_an_empty_result() {
        let retriever = retriever(Vec::new());
        let result = retriever.retrieve("question", 5, 0.7).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn threshold_at_boundary_keeps_equal_scores() {
        let retriever = retriever(vec![scored("exact", 0.7)]);
        let result = retriever.retrieve("question", 5, 0.7).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn zero_top_k_is_a_configuration_error() {
        let retriever = retriever(Vec::new());
        let err = retriever.retrieve("question", 0, 0.7).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[tokio::test]
    async fn similar_chunks_skips_the_threshold() {
        let retriever = retriever(vec![scored("a", 0.9), scored("b", 0.1)]);
        let hits = retriever.similar_chunks("question", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
