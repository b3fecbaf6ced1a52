//! Grounded answer synthesis.
//!
//! The synthesizer folds retrieved chunks into one bounded context string,
//! hands it to the completion gateway together with a fixed grounding
//! instruction, and pairs the model's literal output with previews of the
//! chunks it was grounded on. An empty retrieval still goes to the model
//! with an empty context (the instruction makes it answer "I don't know"),
//! so query handling behaves uniformly whether or not anything matched.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::llm::CompletionProvider;
use crate::retrieval::RetrievalResult;
use crate::types::RagError;

/// Fixed grounding instruction sent as the model preamble.
pub const GROUNDING_PREAMBLE: &str = "You are a helpful AI assistant that answers questions \
based on the provided context. Use only the pieces of context to answer the question at the \
end. If you don't know the answer based on the context, just say that you don't know; don't \
try to make up an answer. Always provide a clear, concise, and helpful response in natural \
human language.";

/// Characters of source content kept in a citation preview.
const SOURCE_PREVIEW_CHARS: usize = 200;

/// Default cap on assembled context length, in characters.
const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Citation entry returned alongside an answer.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SourceDocument {
    /// Chunk id in the vector store.
    pub id: Option<String>,
    /// Chunk text truncated to a preview.
    pub content: String,
    pub metadata: Value,
    pub score: f32,
}

/// The pipeline's final product for one question.
#[derive(Clone, Debug, serde::Serialize)]
pub struct QueryAnswer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceDocument>,
}

/// Combines retrieved chunks and invokes the completion gateway.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    llm: Arc<dyn CompletionProvider>,
    max_context_chars: usize,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            llm,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    #[must_use]
    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    /// Produces a grounded answer from the retrieved chunks.
    ///
    /// Chunk texts are joined in retrieval order with blank lines; once the
    /// context cap is reached, remaining chunks are dropped whole (they stay
    /// listed as sources). Gateway failures propagate unmodified.
    pub async fn synthesize(
        &self,
        question: &str,
        retrieved: &RetrievalResult,
    ) -> Result<QueryAnswer, RagError> {
        let context = self.assemble_context(retrieved);
        let prompt = format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:");

        debug!(
            hits = retrieved.len(),
            context_chars = context.chars().count(),
            "invoking completion gateway"
        );
        let answer = self.llm.complete(GROUNDING_PREAMBLE, &prompt).await?;

        let sources = retrieved
            .iter()
            .map(|hit| SourceDocument {
                id: hit.record.id.clone(),
                content: preview_of(&hit.record.content),
                metadata: hit.record.metadata.clone(),
                score: hit.score,
            })
            .collect();

        Ok(QueryAnswer {
            question: question.to_string(),
            answer,
            sources,
        })
    }

    fn assemble_context(&self, retrieved: &RetrievalResult) -> String {
        let mut context = String::new();
        let mut used = 0usize;
        for hit in retrieved.iter() {
            let chunk_chars = hit.record.content.chars().count();
            if used > 0 && used + chunk_chars + 2 > self.max_context_chars {
                break;
            }
            if used > 0 {
                context.push_str("\n\n");
                used += 2;
            }
            context.push_str(&hit.record.content);
            used += chunk_chars;
        }
        context
    }
}

fn preview_of(content: &str) -> String {
    if content.chars().count() > SOURCE_PREVIEW_CHARS {
        let truncated: String = content.chars().take(SOURCE_PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingCompletionProvider, MockCompletionProvider};
    use crate::retrieval::ScoredChunk;
    use crate::stores::ChunkRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the prompt it was called with.
    #[derive(Default)]
    struct SpyProvider {
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CompletionProvider for SpyProvider {
        async fn complete(&self, preamble: &str, prompt: &str) -> Result<String, RagError> {
            self.prompts
                .lock()
                .unwrap()
                .push((preamble.to_string(), prompt.to_string()));
            Ok("spied answer".to_string())
        }
    }

    fn hit(content: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            record: ChunkRecord::new("corpus.json", 0, content).with_id("c-1"),
            score,
        }
    }

    #[tokio::test]
    async fn context_preserves_retrieval_order() {
        let spy = Arc::new(SpyProvider::default());
        let synthesizer = AnswerSynthesizer::new(spy.clone());
        let retrieved = RetrievalResult {
            hits: vec![hit("first chunk", 0.9), hit("second chunk", 0.8)],
        };

        synthesizer.synthesize("what?", &retrieved).await.unwrap();

        let calls = spy.prompts.lock().unwrap();
        let (preamble, prompt) = &calls[0];
        assert_eq!(preamble, GROUNDING_PREAMBLE);
        assert!(prompt.contains("first chunk\n\nsecond chunk"));
        assert!(prompt.contains("Question: what?"));
    }

    #[tokio::test]
    async fn empty_retrieval_still_invokes_the_model() {
        let spy = Arc::new(SpyProvider::default());
        let synthesizer = AnswerSynthesizer::new(spy.clone());

        let answer = synthesizer
            .synthesize("anything?", &RetrievalResult::default())
            .await
            .unwrap();

        assert_eq!(answer.answer, "spied answer");
        assert!(answer.sources.is_empty());
        assert_eq!(spy.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn long_sources_are_truncated_in_citations() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(MockCompletionProvider::new()));
        let long = "z".repeat(500);
        let retrieved = RetrievalResult {
            hits: vec![hit(&long, 0.9)],
        };

        let answer = synthesizer.synthesize("q", &retrieved).await.unwrap();
        assert_eq!(answer.sources[0].content.chars().count(), 203);
        assert!(answer.sources[0].content.ends_with("..."));
    }

    #[tokio::test]
    async fn context_cap_drops_whole_chunks_from_the_tail() {
        let spy = Arc::new(SpyProvider::default());
        let synthesizer = AnswerSynthesizer::new(spy.clone()).with_max_context_chars(30);
        let retrieved = RetrievalResult {
            hits: vec![
                hit(&"a".repeat(25), 0.9),
                hit(&"b".repeat(25), 0.8),
            ],
        };

        let answer = synthesizer.synthesize("q", &retrieved).await.unwrap();

        let calls = spy.prompts.lock().unwrap();
        assert!(!calls[0].1.contains('b'), "second chunk should be dropped");
        drop(calls);
        // Dropped from context, still cited.
        assert_eq!(answer.sources.len(), 2);
    }

    #[tokio::test]
    async fn gateway_failures_propagate() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(FailingCompletionProvider));
        let err = synthesizer
            .synthesize("q", &RetrievalResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Gateway(_)));
    }
}
