//! Interactive retrieval-augmented QA over a JSON corpus.
//!
//! Ingests a JSON file (array of objects or nested object), then answers
//! questions from it in a stdin loop, printing the grounded answer and its
//! numbered sources. Pass `--analyze` to only inspect the corpus structure
//! and get suggested extraction fields.
//!
//! ```bash
//! GEMINI_API_KEY=... cargo run --example ask -- corpus.json
//! cargo run --example ask -- corpus.json --analyze
//! ```
//!
//! Environment (see `RagConfig::from_env` for the full list):
//! - `GEMINI_API_KEY`: required unless `--analyze`
//! - `RAGMILL_TEXT_FIELDS`, `RAGMILL_METADATA_FIELDS`, `RAGMILL_ID_FIELD`:
//!   optional comma-separated extraction options
//! - `RAGMILL_PERSIST_DIR`, `RAGMILL_COLLECTION`: collection location

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;

use rig::client::{CompletionClient, EmbeddingsClient};
use rig::providers::gemini;
use tracing_subscriber::FmtSubscriber;

use ragmill::{
    EmbeddingProvider, JsonLoader, LoadOptions, RagConfig, RagError, RagPipeline, RigCompletion,
    RigEmbedding, SqliteVectorStore, analyze_structure,
};

/// Output dimension of the Gemini embedding models used here.
const GEMINI_EMBEDDING_DIMS: usize = 768;

#[tokio::main]
async fn main() -> Result<(), RagError> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let analyze_only = args.iter().any(|arg| arg == "--analyze");
    let corpus = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .or_else(|| env::var("RAGMILL_CORPUS").ok())
        .ok_or_else(|| {
            RagError::Configuration(
                "usage: ask <corpus.json> [--analyze] (or set RAGMILL_CORPUS)".to_string(),
            )
        })?;

    let config = RagConfig::from_env()?;
    let loader = JsonLoader::new(&corpus);

    if analyze_only {
        let value = loader.load_value().await?;
        print_analysis(&value);
        return Ok(());
    }

    let options = load_options_from_env();

    let api_key = env::var("GEMINI_API_KEY")
        .map_err(|_| RagError::Configuration("GEMINI_API_KEY is required".to_string()))?;
    let client = gemini::Client::new(&api_key)
        .map_err(|err| RagError::Configuration(err.to_string()))?;
    let embedder = Arc::new(RigEmbedding::new(
        client.embedding_model_with_ndims(&config.embedding_model, GEMINI_EMBEDDING_DIMS),
    ));
    let llm = Arc::new(RigCompletion::new(
        client.completion_model(&config.llm_model),
        config.temperature,
        config.max_output_tokens,
    ));
    let store = Arc::new(
        SqliteVectorStore::open_or_create(
            &config.persist_directory,
            &config.collection_name,
            embedder.dimension(),
        )
        .await?,
    );
    let pipeline = RagPipeline::new(config, embedder, llm, store)?;

    println!("→ Ingesting {corpus}");
    let report = pipeline.ingest_file(&corpus, &options).await?;
    println!(
        "✓ {} documents became {} stored chunks",
        report.documents, report.stored
    );

    let info = pipeline.info().await?;
    println!(
        "✓ Collection '{}' holds {} chunks ({}-dimensional, top_k={}, threshold={})",
        info.collection.name,
        info.collection.count,
        info.collection.dimension,
        info.top_k,
        info.similarity_threshold
    );

    println!("\nReady. Ask questions about the corpus (quit/exit to stop).");
    let stdin = std::io::stdin();
    loop {
        print!("\n? ");
        std::io::stdout().flush().ok();
        let mut question = String::new();
        if stdin.lock().read_line(&mut question).is_err() {
            break;
        }
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        // Query-time gateway failures become display strings here, at the
        // outermost loop, so the session survives transient provider errors.
        match pipeline.query(question).await {
            Ok(answer) => {
                println!("\n{}", answer.answer);
                if !answer.sources.is_empty() {
                    println!("\nSources ({}):", answer.sources.len());
                    for (i, source) in answer.sources.iter().enumerate() {
                        println!("  {}. [{:.3}] {}", i + 1, source.score, source.content);
                    }
                }
            }
            Err(err) => println!("error: {err}"),
        }
    }

    println!("Bye.");
    Ok(())
}

fn load_options_from_env() -> LoadOptions {
    let mut options = LoadOptions::default();
    if let Ok(fields) = env::var("RAGMILL_TEXT_FIELDS") {
        options = options.with_text_fields(split_list(&fields));
    }
    if let Ok(fields) = env::var("RAGMILL_METADATA_FIELDS") {
        options = options.with_metadata_fields(split_list(&fields));
    }
    if let Ok(field) = env::var("RAGMILL_ID_FIELD") {
        options = options.with_id_field(field);
    }
    options
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_analysis(value: &serde_json::Value) {
    let report = analyze_structure(value);
    println!("Corpus type: {}", report.kind);
    println!("Suggested text fields: {:?}", report.suggested_text_fields);
    println!(
        "Suggested metadata fields: {:?}",
        report.suggested_metadata_fields
    );
    println!("\nStructure:");
    for field in &report.fields {
        println!("  {}: {} - {}", field.path, field.kind, field.sample);
    }
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_env_filter("info").finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
