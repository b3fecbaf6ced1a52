//! SQLite-backed vector store using the `sqlite-vec` extension.
//!
//! Each collection lives in its own database file under the configured
//! persist directory: a plain table for chunk payloads and a `vec0` virtual
//! table for their embeddings, joined by rowid. All writes for a batch are
//! committed in a single transaction, so an entry is either fully visible to
//! subsequent searches or not present at all, and a successful `add` is
//! durable before it returns.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tokio_rusqlite::{Connection, OptionalExtension, ffi};
use tracing::debug;

use super::{ChunkRecord, VectorStore};
use crate::types::RagError;

/// Handle to one persistent collection.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
    path: PathBuf,
    collection: String,
    dimension: usize,
}

impl SqliteVectorStore {
    /// Opens the collection at `<persist_directory>/<collection_name>.sqlite`,
    /// creating directory, tables, and the embedding index on first use.
    ///
    /// Idempotent: reopening the same path and name resumes the stored
    /// contents. Fails with [`RagError::Storage`] when the existing
    /// collection was created with a different embedding dimension.
    pub async fn open_or_create(
        persist_directory: impl AsRef<Path>,
        collection_name: &str,
        dimension: usize,
    ) -> Result<Self, RagError> {
        validate_collection_name(collection_name)?;
        if dimension == 0 {
            return Err(RagError::Configuration(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        register_sqlite_vec()?;

        let directory = persist_directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|err| RagError::Storage(format!("creating {}: {err}", directory.display())))?;
        let path = directory.join(format!("{collection_name}.sqlite"));

        let conn = Connection::open(&path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        // Fail fast when the extension did not load; everything else in this
        // store depends on it.
        conn.call(|conn| -> tokio_rusqlite::rusqlite::Result<_> {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(format!("sqlite-vec unavailable: {err}")))?;

        let collection = collection_name.to_string();

        let table = collection.clone();
        let recorded: Option<String> = conn
            .call(move |conn| -> tokio_rusqlite::rusqlite::Result<_> {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS collections (
                        name TEXT PRIMARY KEY,
                        dimension TEXT NOT NULL
                    )",
                    [],
                )?;
                let recorded = conn
                    .query_row(
                        "SELECT dimension FROM collections WHERE name = ?1",
                        [&table],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(recorded)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        if let Some(existing) = recorded {
            if existing.parse::<usize>().ok() != Some(dimension) {
                return Err(RagError::Storage(format!(
                    "collection '{collection}' holds {existing}-dimensional vectors, \
                     requested {dimension}"
                )));
            }
        }

        let table = collection.clone();
        conn.call(move |conn| -> tokio_rusqlite::rusqlite::Result<_> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO collections (name, dimension) VALUES (?1, ?2)",
                [&table, &dimension.to_string()],
            )?;
            tx.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id TEXT PRIMARY KEY,
                        source TEXT,
                        doc_index TEXT,
                        chunk_index TEXT,
                        char_offset TEXT,
                        metadata TEXT,
                        content TEXT
                    )"
                ),
                [],
            )?;
            tx.execute(
                &format!("CREATE INDEX IF NOT EXISTS idx_{table}_source ON {table}(source)"),
                [],
            )?;
            tx.execute(
                &format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS {table}_embeddings \
                     USING vec0(embedding float[{dimension}])"
                ),
                [],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;

        debug!(collection = %collection, path = %path.display(), dimension, "collection opened");
        Ok(Self {
            conn,
            path,
            collection,
            dimension,
        })
    }

    /// Database file backing this collection.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl VectorStore for SqliteVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Inserts the batch in one transaction.
    ///
    /// Missing ids are assigned as `<collection>-<n>` where `n` continues
    /// from the collection's highest rowid. A record whose id already exists
    /// replaces the stored row and embedding; the rewrite takes the
    /// insertion order of the overwrite (documented last-write-wins).
    async fn add(&self, records: Vec<ChunkRecord>) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let Some(embedding) = record.embedding else {
                return Err(RagError::Storage(format!(
                    "chunk {}/{} of {} has no embedding",
                    record.doc_index, record.chunk_index, record.source
                )));
            };
            if embedding.len() != self.dimension {
                return Err(RagError::Storage(format!(
                    "embedding dimension {} does not match collection dimension {}",
                    embedding.len(),
                    self.dimension
                )));
            }
            let embedding_json = serde_json::to_string(&embedding)
                .map_err(|err| RagError::Storage(err.to_string()))?;
            rows.push((
                record.id,
                record.source,
                record.doc_index.to_string(),
                record.chunk_index.to_string(),
                record.char_offset.to_string(),
                record.metadata.to_string(),
                record.content,
                embedding_json,
            ));
        }

        let table = self.collection.clone();
        let inserted = rows.len();
        self.conn
            .call(move |conn| -> tokio_rusqlite::rusqlite::Result<_> {
                let tx = conn.transaction()?;
                let max_rowid: i64 = tx.query_row(
                    &format!("SELECT COALESCE(MAX(rowid), 0) FROM {table}"),
                    [],
                    |row| row.get(0),
                )?;

                for (offset, row) in rows.into_iter().enumerate() {
                    let (id, source, doc_index, chunk_index, char_offset, metadata, content, embedding_json) =
                        row;
                    let id = id.unwrap_or_else(|| {
                        format!("{table}-{:08}", max_rowid + 1 + offset as i64)
                    });

                    tx.execute(
                        &format!(
                            "DELETE FROM {table}_embeddings \
                             WHERE rowid IN (SELECT rowid FROM {table} WHERE id = ?1)"
                        ),
                        [&id],
                    )?;
                    tx.execute(&format!("DELETE FROM {table} WHERE id = ?1"), [&id])?;

                    tx.execute(
                        &format!(
                            "INSERT INTO {table} \
                             (id, source, doc_index, chunk_index, char_offset, metadata, content) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                        ),
                        [
                            &id,
                            &source,
                            &doc_index,
                            &chunk_index,
                            &char_offset,
                            &metadata,
                            &content,
                        ],
                    )?;
                    tx.execute(
                        &format!(
                            "INSERT INTO {table}_embeddings (rowid, embedding) \
                             VALUES ((SELECT rowid FROM {table} WHERE id = ?1), vec_f32(?2))"
                        ),
                        [&id, &embedding_json],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        debug!(collection = %self.collection, rows = inserted, "chunks persisted");
        Ok(())
    }

    /// Nearest-neighbor lookup.
    ///
    /// `sqlite-vec` computes cosine *distance*; the canonical score of this
    /// crate is cosine *similarity*, so rows come back as `1.0 - distance`
    /// in descending order, with the earlier rowid winning ties.
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimension {
            return Err(RagError::Storage(format!(
                "query dimension {} does not match collection dimension {}",
                query_vector.len(),
                self.dimension
            )));
        }
        let embedding_json = serde_json::to_string(query_vector)
            .map_err(|err| RagError::Storage(err.to_string()))?;

        let table = self.collection.clone();
        self.conn
            .call(move |conn| -> tokio_rusqlite::rusqlite::Result<_> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.source, c.doc_index, c.chunk_index, c.char_offset, \
                            c.metadata, c.content, \
                            vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance \
                     FROM {table} AS c \
                     JOIN {table}_embeddings AS e ON e.rowid = c.rowid \
                     ORDER BY distance ASC, c.rowid ASC \
                     LIMIT {k}"
                ))?;

                let rows = stmt.query_map([&embedding_json], |row| {
                    let record = ChunkRecord {
                        id: Some(row.get(0)?),
                        source: row.get(1)?,
                        doc_index: row.get::<_, String>(2)?.parse().unwrap_or(0),
                        chunk_index: row.get::<_, String>(3)?.parse().unwrap_or(0),
                        char_offset: row.get::<_, String>(4)?.parse().unwrap_or(0),
                        metadata: row
                            .get::<_, String>(5)
                            .map(|raw| serde_json::from_str(&raw).unwrap_or_default())
                            .unwrap_or_default(),
                        content: row.get(6)?,
                        embedding: None,
                    };
                    let distance: f64 = row.get(7)?;
                    Ok((record, 1.0 - distance as f32))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, RagError> {
        let table = self.collection.clone();
        self.conn
            .call(move |conn| -> tokio_rusqlite::rusqlite::Result<_> {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {table}"),
                    [],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

/// Collection names double as table names; keep them identifier-safe.
fn validate_collection_name(name: &str) -> Result<(), RagError> {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if starts_well && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(RagError::Configuration(format!(
            "collection name '{name}' must match [A-Za-z_][A-Za-z0-9_]*"
        )))
    }
}

/// Registers `sqlite-vec` as an auto-loaded extension, once per process.
fn register_sqlite_vec() -> Result<(), RagError> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

    REGISTERED
        .get_or_init(|| unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc == ffi::SQLITE_OK {
                Ok(())
            } else {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            }
        })
        .clone()
        .map_err(RagError::Storage)
}
