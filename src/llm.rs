//! Completion gateway.
//!
//! Answer synthesis talks to the LLM through the [`CompletionProvider`]
//! trait: a grounding preamble plus a rendered prompt in, the model's literal
//! text out. [`RigCompletion`] adapts any `rig-core` completion model and
//! carries the sampling knobs from [`RagConfig`](crate::config::RagConfig);
//! [`MockCompletionProvider`] echoes a canned answer for tests.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;

use crate::types::RagError;

/// Boundary contract for the external language model.
///
/// Failures (including timeouts) surface as [`RagError::Gateway`] and are
/// never swallowed; converting them into user-facing strings is the job of
/// the outermost interactive loop, not this trait.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String, RagError>;
}

/// Adapter over a `rig-core` completion model.
#[derive(Clone)]
pub struct RigCompletion<M> {
    model: M,
    temperature: f64,
    max_output_tokens: u64,
}

impl<M> RigCompletion<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, temperature: f64, max_output_tokens: u64) -> Self {
        Self {
            model,
            temperature,
            max_output_tokens,
        }
    }
}

#[async_trait]
impl<M> CompletionProvider for RigCompletion<M>
where
    M: CompletionModel + Send + Sync,
{
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String, RagError> {
        let request = self
            .model
            .completion_request(rig::completion::Message::user(prompt.to_string()))
            .preamble(preamble.to_string())
            .temperature(self.temperature)
            .max_tokens(self.max_output_tokens)
            .build();

        let response = self
            .model
            .completion(request)
            .await
            .map_err(|err| RagError::Gateway(format!("completion request failed: {err}")))?;

        let text: String = response
            .choice
            .into_iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(RagError::Gateway(
                "completion model returned no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Test double that records nothing and answers from a fixed template.
///
/// The reply embeds a prompt excerpt so tests can assert the context and
/// question actually reached the gateway.
#[derive(Clone, Debug, Default)]
pub struct MockCompletionProvider {
    canned_answer: Option<String>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.canned_answer = Some(answer.into());
        self
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, _preamble: &str, prompt: &str) -> Result<String, RagError> {
        if let Some(answer) = &self.canned_answer {
            return Ok(answer.clone());
        }
        let excerpt: String = prompt.chars().take(120).collect();
        Ok(format!("[mock answer] {excerpt}"))
    }
}

/// Test double whose calls always fail, for exercising gateway-error paths.
#[derive(Clone, Debug, Default)]
pub struct FailingCompletionProvider;

#[async_trait]
impl CompletionProvider for FailingCompletionProvider {
    async fn complete(&self, _preamble: &str, _prompt: &str) -> Result<String, RagError> {
        Err(RagError::Gateway("completion gateway unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_canned_answer() {
        let provider = MockCompletionProvider::new().with_answer("forty-two");
        let answer = provider.complete("preamble", "question?").await.unwrap();
        assert_eq!(answer, "forty-two");
    }

    #[tokio::test]
    async fn mock_echoes_prompt_excerpt_by_default() {
        let provider = MockCompletionProvider::new();
        let answer = provider
            .complete("preamble", "Context:\nSection 5\n\nQuestion: consent?")
            .await
            .unwrap();
        assert!(answer.contains("Section 5"));
    }

    #[tokio::test]
    async fn failing_provider_surfaces_gateway_errors() {
        let provider = FailingCompletionProvider;
        let err = provider.complete("p", "q").await.unwrap_err();
        assert!(matches!(err, RagError::Gateway(_)));
    }
}
