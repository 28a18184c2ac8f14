//! SQLite-backed vector store, one directory per document
//!
//! Each store directory holds a single `index.sqlite3` with the document
//! manifest and its chunks. Stores are immutable once written: re-ingestion
//! builds a fresh directory next to the old one and swaps it into place.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Chunk, Document, ScoredChunk};

const INDEX_FILE: &str = "index.sqlite3";

/// Namespace for on-disk store operations
pub struct VectorStore;

impl VectorStore {
    /// Write a store into an empty directory
    pub fn write(dir: &Path, document: &Document, chunks: &[Chunk]) -> Result<()> {
        let mut conn = Connection::open(dir.join(INDEX_FILE))?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=DELETE;
            PRAGMA synchronous=FULL;

            CREATE TABLE manifest (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                document TEXT NOT NULL
            );

            CREATE TABLE chunks (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL UNIQUE,
                content TEXT NOT NULL,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO manifest (id, document) VALUES (1, ?1)",
            params![serde_json::to_string(document)?],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, position, content, char_start, char_end, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for chunk in chunks {
                if chunk.embedding.len() != document.dimensions {
                    return Err(Error::DimensionMismatch {
                        expected: document.dimensions,
                        found: chunk.embedding.len(),
                    });
                }
                stmt.execute(params![
                    chunk.id.to_string(),
                    chunk.position,
                    chunk.content,
                    chunk.char_start as i64,
                    chunk.char_end as i64,
                    encode_vector(&chunk.embedding),
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Build a store in a staging directory, then swap it in at `location`.
    ///
    /// Until the swap the previous store (if any) stays untouched, so a failed
    /// write never leaves a partial store behind.
    pub fn replace(location: &Path, document: &Document, chunks: &[Chunk]) -> Result<()> {
        let parent = location
            .parent()
            .ok_or_else(|| Error::storage(format!("Store location has no parent: {}", location.display())))?;
        let name = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::storage(format!("Store location has no name: {}", location.display())))?;

        std::fs::create_dir_all(parent)?;

        // Dropping the TempDir removes the staging directory on any early return
        let staging = tempfile::Builder::new()
            .prefix(&format!(".staging-{}-", name))
            .tempdir_in(parent)?;
        Self::write(staging.path(), document, chunks)?;

        let trash = if location.exists() {
            let trash = parent.join(format!(".trash-{}-{}", name, Uuid::new_v4().simple()));
            std::fs::rename(location, &trash)?;
            Some(trash)
        } else {
            None
        };

        if let Err(e) = std::fs::rename(staging.path(), location) {
            if let Some(trash) = &trash {
                if let Err(restore) = std::fs::rename(trash, location) {
                    tracing::error!(
                        "Failed to restore previous store {} from {}: {}",
                        location.display(),
                        trash.display(),
                        restore
                    );
                }
            }
            return Err(Error::storage(format!(
                "Failed to move store into {}: {}",
                location.display(),
                e
            )));
        }

        if let Some(trash) = trash {
            if let Err(e) = std::fs::remove_dir_all(&trash) {
                tracing::warn!("Failed to remove replaced store {}: {}", trash.display(), e);
            }
        }

        tracing::debug!("Wrote {} chunks to {}", chunks.len(), location.display());
        Ok(())
    }

    /// Load a store fully into memory
    pub fn open(location: &Path) -> Result<VectorIndex> {
        let conn = Self::connect(location)?;
        let document = Self::manifest(&conn, location)?;

        let mut stmt = conn.prepare(
            "SELECT id, position, content, char_start, char_end, embedding
             FROM chunks ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?;

        let mut chunks = Vec::with_capacity(document.total_chunks as usize);
        for row in rows {
            let (id, position, content, char_start, char_end, blob) = row?;
            let id = Uuid::parse_str(&id)
                .map_err(|e| Error::storage(format!("Corrupt chunk id in {}: {}", location.display(), e)))?;
            let embedding = decode_vector(&blob).ok_or_else(|| {
                Error::storage(format!("Corrupt embedding for chunk {} in {}", id, location.display()))
            })?;
            if embedding.len() != document.dimensions {
                return Err(Error::DimensionMismatch {
                    expected: document.dimensions,
                    found: embedding.len(),
                });
            }

            chunks.push(Chunk {
                id,
                document: document.name.clone(),
                content,
                position,
                char_start: char_start as usize,
                char_end: char_end as usize,
                embedding,
            });
        }

        tracing::debug!("Loaded {} chunks from {}", chunks.len(), location.display());
        Ok(VectorIndex::new(document, chunks))
    }

    /// Read only the manifest of a store
    pub fn read_manifest(location: &Path) -> Result<Document> {
        let conn = Self::connect(location)?;
        Self::manifest(&conn, location)
    }

    /// Whether a store exists at `location`
    pub fn exists(location: &Path) -> bool {
        location.join(INDEX_FILE).is_file()
    }

    /// Manifests of every store under `root`, sorted by name
    pub fn list(root: &Path) -> Result<Vec<Document>> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        for entry in entries {
            let entry = entry?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !entry.file_type()?.is_dir() {
                continue;
            }

            match Self::read_manifest(&entry.path()) {
                Ok(document) => documents.push(document),
                Err(e) => tracing::warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }

    /// Remove a store directory; `false` when there was nothing to remove
    pub fn remove(location: &Path) -> Result<bool> {
        match std::fs::remove_dir_all(location) {
            Ok(()) => {
                tracing::info!("Removed store {}", location.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn connect(location: &Path) -> Result<Connection> {
        let path: PathBuf = location.join(INDEX_FILE);
        if !path.is_file() {
            return Err(Error::store_not_found(location));
        }

        Ok(Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }

    fn manifest(conn: &Connection, location: &Path) -> Result<Document> {
        let raw: Option<String> = conn
            .query_row("SELECT document FROM manifest WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        let raw = raw.ok_or_else(|| Error::storage(format!("Store {} has no manifest", location.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::storage(format!("Corrupt manifest in {}: {}", location.display(), e)))
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// An opened store held in memory
#[derive(Debug)]
pub struct VectorIndex {
    document: Document,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Create from a manifest and its chunks
    pub fn new(document: Document, chunks: Vec<Chunk>) -> Self {
        Self { document, chunks }
    }

    /// Manifest of the indexed document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index has no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `top_k` chunks most similar to `query`, most similar first.
    /// Ties go to the earlier chunk.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.document.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.document.dimensions,
                found: query.len(),
            });
        }

        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                similarity: cosine_similarity(&chunk.embedding, query),
                chunk: chunk.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk.position.cmp(&b.chunk.position))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
