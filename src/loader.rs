//! Turning semi-structured JSON corpora into retrievable documents.
//!
//! The loader accepts either an array of objects or a nested object and
//! produces [`Document`] values ready for chunking. Which fields contribute
//! text is a tagged [`FieldPolicy`] chosen by the caller, never inferred from
//! the runtime shape of individual items.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::RagError;

/// Normalized unit of retrievable content. Immutable once created.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Document {
    /// Extracted text, non-empty after trimming.
    pub content: String,
    /// Source path/section/index plus any caller-requested fields.
    pub metadata: Map<String, Value>,
    /// Stable identifier taken from the corpus when an id field is requested.
    pub source_id: Option<String>,
}

/// Which fields of a corpus item contribute to the document text.
#[derive(Clone, Debug, Default)]
pub enum FieldPolicy {
    /// Every string-valued field with non-empty trimmed content, in item order.
    #[default]
    AutoDetect,
    /// Only the named fields, in the given order.
    Explicit(Vec<String>),
}

/// Caller-side extraction options for a single load.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub text_fields: FieldPolicy,
    /// Fields copied into document metadata when present on an item.
    pub metadata_fields: Vec<String>,
    /// Field whose value becomes the document's `source_id` and `id` metadata.
    pub id_field: Option<String>,
}

impl LoadOptions {
    #[must_use]
    pub fn with_text_fields(mut self, fields: Vec<String>) -> Self {
        self.text_fields = FieldPolicy::Explicit(fields);
        self
    }

    #[must_use]
    pub fn with_metadata_fields(mut self, fields: Vec<String>) -> Self {
        self.metadata_fields = fields;
        self
    }

    #[must_use]
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }
}

/// Reads a JSON corpus from disk and converts it into documents.
#[derive(Clone, Debug)]
pub struct JsonLoader {
    path: PathBuf,
}

impl JsonLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and parses the corpus file.
    ///
    /// Fails with [`RagError::NotFound`] when the path does not resolve and
    /// [`RagError::Parse`] on malformed JSON; both propagate unmodified.
    pub async fn load_value(&self) -> Result<Value, RagError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                RagError::NotFound(format!("corpus file {}", self.path.display()))
            } else {
                RagError::Storage(format!("reading {}: {err}", self.path.display()))
            }
        })?;
        serde_json::from_str(&raw)
            .map_err(|err| RagError::Parse(format!("{}: {err}", self.path.display())))
    }

    /// Loads the corpus and extracts documents according to `options`.
    pub async fn load(&self, options: &LoadOptions) -> Result<Vec<Document>, RagError> {
        let value = self.load_value().await?;
        let source = self.path.display().to_string();
        let documents = documents_from_value(&value, &source, options);
        debug!(
            corpus = %source,
            documents = documents.len(),
            "extracted documents from corpus"
        );
        Ok(documents)
    }
}

/// Converts a parsed JSON value into documents.
///
/// Array input yields one document per object item. Object input with an
/// explicit field list yields a single document; without one, every list
/// found under a top-level key is treated as a homogeneous item array with
/// the key recorded as `section` metadata. Items whose extracted text trims
/// to nothing are silently dropped.
pub fn documents_from_value(value: &Value, source: &str, options: &LoadOptions) -> Vec<Document> {
    let mut documents = Vec::new();

    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let Value::Object(object) = item else {
                    continue;
                };
                push_document(&mut documents, object, source, options, Some(index), None);
            }
        }
        Value::Object(object) => {
            if matches!(options.text_fields, FieldPolicy::Explicit(_)) {
                push_document(&mut documents, object, source, options, None, None);
            } else {
                for (key, nested) in object {
                    let Value::Array(items) = nested else {
                        continue;
                    };
                    for (index, item) in items.iter().enumerate() {
                        let Value::Object(item_object) = item else {
                            continue;
                        };
                        push_document(
                            &mut documents,
                            item_object,
                            source,
                            options,
                            Some(index),
                            Some(key.as_str()),
                        );
                    }
                }
            }
        }
        _ => {}
    }

    documents
}

fn push_document(
    documents: &mut Vec<Document>,
    object: &Map<String, Value>,
    source: &str,
    options: &LoadOptions,
    index: Option<usize>,
    section: Option<&str>,
) {
    let content = extract_text(object, &options.text_fields);
    if content.trim().is_empty() {
        return;
    }

    let mut metadata = Map::new();
    metadata.insert("source".to_string(), Value::String(source.to_string()));
    if let Some(section) = section {
        metadata.insert("section".to_string(), Value::String(section.to_string()));
    }
    if let Some(index) = index {
        metadata.insert("index".to_string(), Value::from(index));
    }

    let mut source_id = None;
    if let Some(id_field) = &options.id_field {
        if let Some(id_value) = object.get(id_field) {
            metadata.insert("id".to_string(), id_value.clone());
            source_id = Some(scalar_to_string(id_value));
        }
    }
    for field in &options.metadata_fields {
        if let Some(field_value) = object.get(field) {
            metadata.insert(field.clone(), field_value.clone());
        }
    }

    documents.push(Document {
        content,
        metadata,
        source_id,
    });
}

/// Concatenates `"{field}: {value}"` lines for the selected string fields.
fn extract_text(object: &Map<String, Value>, policy: &FieldPolicy) -> String {
    let fields: Vec<&str> = match policy {
        FieldPolicy::Explicit(fields) => fields.iter().map(String::as_str).collect(),
        FieldPolicy::AutoDetect => object
            .iter()
            .filter(|(_, value)| {
                value
                    .as_str()
                    .is_some_and(|text| !text.trim().is_empty())
            })
            .map(|(key, _)| key.as_str())
            .collect(),
    };

    let mut lines = Vec::new();
    for field in fields {
        if let Some(Value::String(text)) = object.get(field) {
            lines.push(format!("{field}: {}", text.trim()));
        }
    }
    lines.join("\n")
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// One observed path inside a corpus, with a truncated sample value.
#[derive(Clone, Debug, serde::Serialize)]
pub struct FieldInsight {
    pub path: String,
    pub kind: String,
    pub sample: String,
}

/// Result of walking a corpus to suggest extraction options.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct StructureReport {
    pub kind: String,
    pub fields: Vec<FieldInsight>,
    pub suggested_text_fields: Vec<String>,
    pub suggested_metadata_fields: Vec<String>,
}

/// Walks a JSON value and reports per-path types, sample values, and
/// suggested text/metadata fields, to help callers pick [`LoadOptions`].
pub fn analyze_structure(value: &Value) -> StructureReport {
    let mut report = StructureReport {
        kind: value_kind(value).to_string(),
        ..Default::default()
    };
    analyze_value(value, "", &mut report);
    report
}

fn analyze_value(value: &Value, path: &str, report: &mut StructureReport) {
    match value {
        Value::Object(object) => {
            for (key, nested) in object {
                let current = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };

                match nested {
                    Value::String(text) if text.trim().len() > 10 => {
                        report.suggested_text_fields.push(current.clone());
                    }
                    Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                        report.suggested_metadata_fields.push(current.clone());
                    }
                    _ => {}
                }

                report.fields.push(FieldInsight {
                    path: current.clone(),
                    kind: value_kind(nested).to_string(),
                    sample: sample_of(nested),
                });

                if matches!(nested, Value::Object(_) | Value::Array(_)) {
                    analyze_value(nested, &current, report);
                }
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                analyze_value(first, &format!("{path}[0]"), report);
            }
        }
        _ => {}
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn sample_of(value: &Value) -> String {
    let rendered = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() > 100 {
        let truncated: String = rendered.chars().take(100).collect();
        format!("{truncated}...")
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn array_corpus() -> Value {
        json!([
            {"title": "First", "body": "Alpha text", "year": 1999, "blank": "  "},
            {"title": "Second", "body": "Beta text", "year": 2004},
            {"title": "  ", "note": ""}
        ])
    }

    #[test]
    fn auto_detect_uses_every_nonempty_string_field() {
        let documents =
            documents_from_value(&array_corpus(), "corpus.json", &LoadOptions::default());
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].content, "title: First\nbody: Alpha text");
        assert_eq!(documents[1].content, "title: Second\nbody: Beta text");
    }

    #[test]
    fn blank_items_are_silently_dropped() {
        let documents =
            documents_from_value(&array_corpus(), "corpus.json", &LoadOptions::default());
        assert!(documents.iter().all(|doc| !doc.content.trim().is_empty()));
    }

    #[test]
    fn explicit_fields_follow_caller_order() {
        let options =
            LoadOptions::default().with_text_fields(vec!["body".into(), "title".into()]);
        let documents = documents_from_value(&array_corpus(), "corpus.json", &options);
        assert_eq!(documents[0].content, "body: Alpha text\ntitle: First");
    }

    #[test]
    fn explicit_fields_skip_non_strings() {
        let options =
            LoadOptions::default().with_text_fields(vec!["year".into(), "title".into()]);
        let documents = documents_from_value(&array_corpus(), "corpus.json", &options);
        assert_eq!(documents[0].content, "title: First");
    }

    #[test]
    fn metadata_records_source_index_and_requested_fields() {
        let options = LoadOptions::default()
            .with_metadata_fields(vec!["year".into()])
            .with_id_field("title");
        let documents = documents_from_value(&array_corpus(), "corpus.json", &options);
        let metadata = &documents[0].metadata;
        assert_eq!(metadata["source"], json!("corpus.json"));
        assert_eq!(metadata["index"], json!(0));
        assert_eq!(metadata["year"], json!(1999));
        assert_eq!(metadata["id"], json!("First"));
        assert_eq!(documents[0].source_id.as_deref(), Some("First"));
    }

    #[test]
    fn nested_object_discovers_lists_per_section() {
        let corpus = json!({
            "marriage": [
                {"section": "Section 5", "text": "Marriage requires consent."}
            ],
            "divorce": [
                {"section": "Section 13", "text": "Divorce may be granted."},
                {"section": "Section 14", "text": "Mutual consent divorce."}
            ],
            "title": "Family law"
        });
        let documents = documents_from_value(&corpus, "laws.json", &LoadOptions::default());
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].metadata["section"], json!("marriage"));
        assert_eq!(documents[2].metadata["section"], json!("divorce"));
        assert_eq!(documents[2].metadata["index"], json!(1));
    }

    #[test]
    fn object_with_explicit_fields_is_a_single_document() {
        let corpus = json!({"title": "Only", "body": "One document"});
        let options =
            LoadOptions::default().with_text_fields(vec!["title".into(), "body".into()]);
        let documents = documents_from_value(&corpus, "one.json", &options);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content, "title: Only\nbody: One document");
        assert!(!documents[0].metadata.contains_key("index"));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let loader = JsonLoader::new("/definitely/missing/corpus.json");
        let err = loader.load(&LoadOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let loader = JsonLoader::new(&path);
        let err = loader.load(&LoadOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Parse(_)));
    }

    #[test]
    fn structure_analysis_suggests_fields() {
        let corpus = json!([
            {"title": "A reasonably long title here", "year": 2001, "body": "Short"}
        ]);
        let report = analyze_structure(&corpus);
        assert_eq!(report.kind, "array");
        assert!(report
            .suggested_text_fields
            .contains(&"[0].title".to_string()));
        assert!(report
            .suggested_metadata_fields
            .contains(&"[0].year".to_string()));
        assert!(report
            .suggested_metadata_fields
            .contains(&"[0].body".to_string()));
    }
}
