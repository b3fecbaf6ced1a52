//! Pipeline configuration.
//!
//! [`RagConfig`] is an explicit value passed to each component's constructor:
//! it is validated once when the pipeline is built and never mutated
//! afterwards. [`RagConfig::from_env`] layers environment overrides (loaded
//! through `dotenvy`) on top of the defaults, so demos and deployments can be
//! tuned without code changes.

use std::path::PathBuf;

use crate::types::RagError;

/// Knobs recognized by the pipeline, with their documented defaults.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks; must be < `chunk_size`.
    pub chunk_overlap: usize,
    /// Maximum number of nearest-neighbor candidates per query.
    pub top_k: usize,
    /// Minimum cosine similarity for a retrieved chunk to be kept.
    pub similarity_threshold: f32,
    /// Directory holding the persisted collections.
    pub persist_directory: PathBuf,
    /// Collection name; one SQLite file per collection.
    pub collection_name: String,
    /// Embedding model identifier handed to the provider client.
    pub embedding_model: String,
    /// Completion model identifier handed to the provider client.
    pub llm_model: String,
    /// Sampling temperature for answer synthesis.
    pub temperature: f64,
    /// Output token cap for answer synthesis.
    pub max_output_tokens: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            similarity_threshold: 0.7,
            persist_directory: PathBuf::from("./ragmill_db"),
            collection_name: "documents".to_string(),
            embedding_model: "embedding-001".to_string(),
            llm_model: "gemini-2.0-flash".to_string(),
            temperature: 0.1,
            max_output_tokens: 1000,
        }
    }
}

impl RagConfig {
    /// Builds a configuration from defaults plus environment overrides.
    ///
    /// Reads a `.env` file when present. Recognized variables:
    /// `RAGMILL_CHUNK_SIZE`, `RAGMILL_CHUNK_OVERLAP`, `RAGMILL_TOP_K`,
    /// `RAGMILL_SIMILARITY_THRESHOLD`, `RAGMILL_PERSIST_DIR`,
    /// `RAGMILL_COLLECTION`, `RAGMILL_EMBEDDING_MODEL`, `RAGMILL_LLM_MODEL`,
    /// `RAGMILL_TEMPERATURE`, `RAGMILL_MAX_OUTPUT_TOKENS`.
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Some(value) = env_parse::<usize>("RAGMILL_CHUNK_SIZE")? {
            config.chunk_size = value;
        }
        if let Some(value) = env_parse::<usize>("RAGMILL_CHUNK_OVERLAP")? {
            config.chunk_overlap = value;
        }
        if let Some(value) = env_parse::<usize>("RAGMILL_TOP_K")? {
            config.top_k = value;
        }
        if let Some(value) = env_parse::<f32>("RAGMILL_SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = value;
        }
        if let Ok(value) = std::env::var("RAGMILL_PERSIST_DIR") {
            config.persist_directory = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("RAGMILL_COLLECTION") {
            config.collection_name = value;
        }
        if let Ok(value) = std::env::var("RAGMILL_EMBEDDING_MODEL") {
            config.embedding_model = value;
        }
        if let Ok(value) = std::env::var("RAGMILL_LLM_MODEL") {
            config.llm_model = value;
        }
        if let Some(value) = env_parse::<f64>("RAGMILL_TEMPERATURE")? {
            config.temperature = value;
        }
        if let Some(value) = env_parse::<u64>("RAGMILL_MAX_OUTPUT_TOKENS")? {
            config.max_output_tokens = value;
        }
        Ok(config)
    }

    /// Checks every knob once; called by the pipeline constructor.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size < 1 {
            return Err(RagError::Configuration(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Configuration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::Configuration(format!(
                "similarity_threshold ({}) must lie in [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.collection_name.is_empty() {
            return Err(RagError::Configuration(
                "collection_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn with_retrieval(mut self, top_k: usize, similarity_threshold: f32) -> Self {
        self.top_k = top_k;
        self.similarity_threshold = similarity_threshold;
        self
    }

    #[must_use]
    pub fn with_persistence(
        mut self,
        persist_directory: impl Into<PathBuf>,
        collection_name: impl Into<String>,
    ) -> Self {
        self.persist_directory = persist_directory.into();
        self.collection_name = collection_name.into();
        self
    }

    #[must_use]
    pub fn with_models(
        mut self,
        embedding_model: impl Into<String>,
        llm_model: impl Into<String>,
    ) -> Self {
        self.embedding_model = embedding_model.into();
        self.llm_model = llm_model.into();
        self
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, RagError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| RagError::Configuration(format!("invalid {name} '{raw}': {err}"))),
        Err(_) => Ok(None),
    }
}
