//! Embedding gateway.
//!
//! The pipeline only sees the [`EmbeddingProvider`] trait: text in, fixed-
//! dimension vector out. [`RigEmbedding`] adapts any `rig-core` provider
//! model; [`MockEmbeddingProvider`] is a deterministic offline stand-in used
//! by tests and demos. Providers are called exactly once per chunk at
//! ingestion and once per question at query time, with no caching and no
//! retries.

use async_trait::async_trait;
use rig::embeddings::embedding::EmbeddingModel;

use crate::types::RagError;

/// Boundary contract for the external embedding model.
///
/// `embed_batch` output order matches input order and its length equals the
/// input length. Failures are fatal to the enclosing ingestion or query
/// operation and surface as [`RagError::Gateway`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Output vector dimension; constant for the provider's lifetime.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Adapter over a `rig-core` embedding model.
///
/// rig models produce `f64` vectors; the index stores `f32`, so the adapter
/// narrows on the way out. Batches wider than the model's `MAX_DOCUMENTS`
/// are sent in windows while preserving input order.
#[derive(Clone)]
pub struct RigEmbedding<M> {
    model: M,
    dimension: usize,
}

impl<M> RigEmbedding<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M) -> Self {
        let dimension = model.ndims();
        Self { model, dimension }
    }
}

#[async_trait]
impl<M> EmbeddingProvider for RigEmbedding<M>
where
    M: EmbeddingModel + Send + Sync,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Gateway("embedding model returned no vector".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for window in texts.chunks(M::MAX_DOCUMENTS.max(1)) {
            let embeddings = self
                .model
                .embed_texts(window.to_vec())
                .await
                .map_err(|err| RagError::Gateway(format!("embedding request failed: {err}")))?;
            if embeddings.len() != window.len() {
                return Err(RagError::Gateway(format!(
                    "embedding model returned {} vectors for {} inputs",
                    embeddings.len(),
                    window.len()
                )));
            }
            vectors.extend(
                embeddings
                    .into_iter()
                    .map(|embedding| embedding.vec.into_iter().map(|v| v as f32).collect()),
            );
        }
        Ok(vectors)
    }
}

/// Deterministic hashed bag-of-words embedder for tests and offline runs.
///
/// Each whitespace token is hashed into one of `dimension` buckets and the
/// resulting count vector is L2-normalized, so texts sharing vocabulary get
/// a meaningfully higher cosine similarity than unrelated ones. That is
/// enough structure to exercise retrieval end to end without a network.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimension: 64 }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0f32; self.dimension];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }
}
