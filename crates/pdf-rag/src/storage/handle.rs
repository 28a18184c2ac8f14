//! Lifecycle handle for an opened store

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Document, ScoredChunk};

use super::vector_store::{VectorIndex, VectorStore};

/// Lifecycle state of a [`StoreHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Created but never opened
    Unopened,
    /// Index loaded and queryable
    Opened,
    /// Released; every further use fails
    Closed,
}

enum Slot {
    Unopened,
    Opened(Arc<VectorIndex>),
    Closed,
}

/// Handle to one document's store.
///
/// Transitions only `Unopened -> Opened -> Closed` (or `Unopened -> Closed`).
/// Queries that already obtained the index keep it after `close`.
pub struct StoreHandle {
    location: PathBuf,
    slot: RwLock<Slot>,
}

impl StoreHandle {
    /// Create an unopened handle
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            slot: RwLock::new(Slot::Unopened),
        }
    }

    /// Create a handle and open it
    pub async fn open_at(location: impl Into<PathBuf>) -> Result<Self> {
        let handle = Self::new(location);
        handle.open().await?;
        Ok(handle)
    }

    /// Load the store from disk; no-op when already opened
    pub async fn open(&self) -> Result<()> {
        match *self.slot.read() {
            Slot::Opened(_) => return Ok(()),
            Slot::Closed => return Err(self.closed()),
            Slot::Unopened => {}
        }

        let location = self.location.clone();
        let index = tokio::task::spawn_blocking(move || VectorStore::open(&location)).await??;

        let mut slot = self.slot.write();
        match *slot {
            Slot::Unopened => {
                tracing::info!(
                    "Opened store {} ({} chunks, model {})",
                    self.location.display(),
                    index.len(),
                    index.document().embedding_model
                );
                *slot = Slot::Opened(Arc::new(index));
                Ok(())
            }
            // Lost a race with another opener
            Slot::Opened(_) => Ok(()),
            Slot::Closed => Err(self.closed()),
        }
    }

    /// Release the loaded index; idempotent
    pub fn close(&self) {
        let mut slot = self.slot.write();
        if !matches!(*slot, Slot::Closed) {
            tracing::debug!("Closed store handle {}", self.location.display());
            *slot = Slot::Closed;
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        match *self.slot.read() {
            Slot::Unopened => HandleState::Unopened,
            Slot::Opened(_) => HandleState::Opened,
            Slot::Closed => HandleState::Closed,
        }
    }

    /// Store directory this handle points at
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The loaded index
    pub fn index(&self) -> Result<Arc<VectorIndex>> {
        match &*self.slot.read() {
            Slot::Opened(index) => Ok(Arc::clone(index)),
            Slot::Unopened => Err(Error::ChainNotInitialized {
                location: self.location.clone(),
            }),
            Slot::Closed => Err(self.closed()),
        }
    }

    /// Manifest of the opened store
    pub fn document(&self) -> Result<Document> {
        Ok(self.index()?.document().clone())
    }

    /// Similarity search against the opened store
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        self.index()?.search(query, top_k)
    }

    fn closed(&self) -> Error {
        Error::HandleClosed {
            location: self.location.clone(),
        }
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("location", &self.location)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn write_store(location: &Path) {
        let document = Document {
            name: "manual".to_string(),
            source_path: PathBuf::from("/tmp/manual.pdf"),
            persist_path: location.to_path_buf(),
            chunk_size: 100,
            overlap_ratio: 0.2,
            embedding_model: "test-embed".to_string(),
            dimensions: 2,
            total_chunks: 1,
            total_pages: Some(1),
            content_hash: "abc".to_string(),
            ingested_at: chrono::Utc::now(),
        };
        let mut chunk = Chunk::new("manual", "hello".to_string(), 0, 0, 5);
        chunk.embedding = vec![1.0, 0.0];
        VectorStore::replace(location, &document, &[chunk]).unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let root = tempfile::tempdir().unwrap();
        let location = root.path().join("manual");
        write_store(&location);

        let handle = StoreHandle::new(&location);
        assert_eq!(handle.state(), HandleState::Unopened);
        assert!(matches!(handle.index(), Err(Error::ChainNotInitialized { .. })));

        handle.open().await.unwrap();
        handle.open().await.unwrap();
        assert_eq!(handle.state(), HandleState::Opened);
        assert_eq!(handle.search(&[1.0, 0.0], 4).unwrap().len(), 1);

        let held = handle.index().unwrap();
        handle.close();
        handle.close();
        assert_eq!(handle.state(), HandleState::Closed);
        assert!(matches!(handle.search(&[1.0, 0.0], 4), Err(Error::HandleClosed { .. })));
        assert!(matches!(handle.open().await, Err(Error::HandleClosed { .. })));

        // An index obtained before close stays usable
        assert_eq!(held.search(&[1.0, 0.0], 4).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_missing_store_stays_unopened() {
        let root = tempfile::tempdir().unwrap();
        let handle = StoreHandle::new(root.path().join("missing"));
        assert!(matches!(handle.open().await, Err(Error::StoreNotFound { .. })));
        assert_eq!(handle.state(), HandleState::Unopened);
    }
}
