//! End-to-end pipeline tests with mock gateways and a real on-disk store.
//!
//! Everything here runs offline and deterministically: embeddings come from
//! the hashed bag-of-words mock, completions from the canned mock, and the
//! vector index from a tempdir-backed SQLite collection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use ragmill::{
    EmbeddingProvider, LoadOptions, MockCompletionProvider, MockEmbeddingProvider, RagConfig,
    RagError, RagPipeline, SqliteVectorStore, VectorStore,
};

fn corpus() -> serde_json::Value {
    json!([
        {
            "title": "Marriage",
            "text": "Section 5: marriage requires the free consent of both parties \
                     and neither party may be compelled."
        },
        {
            "title": "Divorce",
            "text": "Section 13: a petition for divorce may be presented to the district \
                     court by either spouse."
        },
        {
            "title": "Adoption",
            "text": "Section 7: adoption requires an order of the competent court after \
                     due inquiry."
        }
    ])
}

async fn build_pipeline(
    dir: &std::path::Path,
    threshold: f32,
    top_k: usize,
) -> RagPipeline {
    let embedder = Arc::new(MockEmbeddingProvider::new());
    let store = Arc::new(
        SqliteVectorStore::open_or_create(dir, "documents", embedder.dimension())
            .await
            .unwrap(),
    );
    let config = RagConfig::default()
        .with_chunking(200, 40)
        .with_retrieval(top_k, threshold);
    RagPipeline::new(
        config,
        embedder,
        Arc::new(MockCompletionProvider::new().with_answer("grounded answer")),
        store,
    )
    .unwrap()
}

#[tokio::test]
async fn ingest_then_query_returns_answer_with_sources() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(dir.path(), 0.0, 3).await;

    let report = pipeline
        .ingest_value(&corpus(), "laws.json", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(report.documents, 3);
    assert!(report.stored >= 3);

    let answer = pipeline
        .query("What does marriage require under section 5?")
        .await
        .unwrap();
    assert_eq!(answer.answer, "grounded answer");
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.len() <= 3);
    assert!(
        answer.sources[0].content.contains("marriage"),
        "best source should come from the marriage section, got: {}",
        answer.sources[0].content
    );
}

#[tokio::test]
async fn retrieval_scores_are_ordered_and_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(dir.path(), 0.0, 2).await;
    pipeline
        .ingest_value(&corpus(), "laws.json", &LoadOptions::default())
        .await
        .unwrap();

    let retrieved = pipeline
        .retrieve("divorce petition district court")
        .await
        .unwrap();
    assert!(retrieved.len() <= 2, "top_k bound violated");
    let scores: Vec<f32> = retrieved.iter().map(|hit| hit.score).collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn strict_threshold_can_empty_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(dir.path(), 0.99, 5).await;
    pipeline
        .ingest_value(&corpus(), "laws.json", &LoadOptions::default())
        .await
        .unwrap();

    let retrieved = pipeline
        .retrieve("entirely unrelated astrophysics question")
        .await
        .unwrap();
    assert!(retrieved.is_empty());

    // The synthesizer still runs and returns a well-formed answer.
    let answer = pipeline
        .query("entirely unrelated astrophysics question")
        .await
        .unwrap();
    assert_eq!(answer.answer, "grounded answer");
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn empty_index_query_is_well_formed() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(dir.path(), 0.7, 5).await;

    let answer = pipeline.query("anything at all?").await.unwrap();
    assert_eq!(answer.answer, "grounded answer");
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn reopening_the_collection_reproduces_results() {
    let dir = tempfile::tempdir().unwrap();
    let question = "Who must consent to a marriage?";

    let before: Vec<(Option<String>, f32)> = {
        let pipeline = build_pipeline(dir.path(), 0.0, 3).await;
        pipeline
            .ingest_value(&corpus(), "laws.json", &LoadOptions::default())
            .await
            .unwrap();
        pipeline
            .retrieve(question)
            .await
            .unwrap()
            .iter()
            .map(|hit| (hit.record.id.clone(), hit.score))
            .collect()
    };
    assert!(!before.is_empty());

    // Fresh handles over the same persist directory, no re-ingestion.
    let reopened = build_pipeline(dir.path(), 0.0, 3).await;
    let after: Vec<(Option<String>, f32)> = reopened
        .retrieve(question)
        .await
        .unwrap()
        .iter()
        .map(|hit| (hit.record.id.clone(), hit.score))
        .collect();

    assert_eq!(before, after);
}

/// Gateway stub whose batch calls always fail.
struct FailingEmbeddingProvider {
    dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
        Err(RagError::Gateway("embedding gateway down".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::Gateway("embedding gateway down".to_string()))
    }
}

#[tokio::test]
async fn failed_embedding_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteVectorStore::open_or_create(dir.path(), "documents", 64)
            .await
            .unwrap(),
    );
    let pipeline = RagPipeline::new(
        RagConfig::default(),
        Arc::new(FailingEmbeddingProvider { dimension: 64 }),
        Arc::new(MockCompletionProvider::new()),
        store.clone(),
    )
    .unwrap();

    let err = pipeline
        .ingest_value(&corpus(), "laws.json", &LoadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Gateway(_)));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn explicit_fields_flow_through_to_sources() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(dir.path(), 0.0, 3).await;

    let options = LoadOptions::default()
        .with_text_fields(vec!["text".to_string()])
        .with_metadata_fields(vec!["title".to_string()])
        .with_id_field("title");
    pipeline
        .ingest_value(&corpus(), "laws.json", &options)
        .await
        .unwrap();

    let answer = pipeline.query("consent for marriage").await.unwrap();
    let top = &answer.sources[0];
    assert_eq!(top.metadata["title"], json!("Marriage"));
    assert_eq!(top.metadata["id"], json!("Marriage"));
    assert!(!top.content.contains("title:"), "only 'text' should be extracted");
}
