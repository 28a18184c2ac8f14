//! Per-user document library on top of [`RagService`]
//!
//! Document and answer records live in an external metadata store reached
//! through [`MetadataStore`]; callers are identified by an already
//! authenticated [`Principal`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::collect_answer;
use crate::providers::FragmentStream;
use crate::service::RagService;
use crate::storage::VectorStore;

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: u64,
}

impl Principal {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

/// Uploaded document as recorded by the metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: u64,
    /// Owner-prefixed file name, e.g. `7_report.pdf`
    pub name: String,
    /// Saved upload
    pub file_path: PathBuf,
    /// Store directory
    pub persist_path: PathBuf,
    pub owner: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Fields of a document record before the store assigns an id
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub file_path: PathBuf,
    pub persist_path: PathBuf,
    pub owner: u64,
}

/// Question and generated answer for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: u64,
    pub document_id: u64,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence for document and answer records
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Any document with exactly this name, regardless of owner
    async fn find_by_name(&self, name: &str) -> Result<Option<DocumentRecord>>;

    /// Any document whose store lives at `persist_path`
    async fn find_by_location(&self, persist_path: &Path) -> Result<Option<DocumentRecord>>;

    async fn insert_document(&self, document: NewDocument) -> Result<DocumentRecord>;

    /// Document `id` if it belongs to `owner`
    async fn get_document(&self, owner: u64, id: u64) -> Result<Option<DocumentRecord>>;

    async fn list_documents(&self, owner: u64) -> Result<Vec<DocumentRecord>>;

    /// Remove document `id` of `owner`; `false` when there was none
    async fn delete_document(&self, owner: u64, id: u64) -> Result<bool>;

    async fn record_answer(&self, document_id: u64, question: &str, answer: &str) -> Result<AnswerRecord>;
}

#[derive(Default)]
struct MetadataTables {
    next_document_id: u64,
    next_answer_id: u64,
    documents: BTreeMap<u64, DocumentRecord>,
    answers: Vec<AnswerRecord>,
}

/// Process-local [`MetadataStore`]
#[derive(Default)]
pub struct InMemoryMetadataStore {
    tables: Mutex<MetadataTables>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers recorded for a document, oldest first
    pub fn answers_for(&self, document_id: u64) -> Vec<AnswerRecord> {
        self.tables
            .lock()
            .answers
            .iter()
            .filter(|a| a.document_id == document_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .tables
            .lock()
            .documents
            .values()
            .find(|d| d.name == name)
            .cloned())
    }

    async fn find_by_location(&self, persist_path: &Path) -> Result<Option<DocumentRecord>> {
        Ok(self
            .tables
            .lock()
            .documents
            .values()
            .find(|d| d.persist_path == persist_path)
            .cloned())
    }

    async fn insert_document(&self, document: NewDocument) -> Result<DocumentRecord> {
        let mut tables = self.tables.lock();
        if tables.documents.values().any(|d| d.name == document.name) {
            return Err(Error::DocumentExists { name: document.name });
        }

        tables.next_document_id += 1;
        let record = DocumentRecord {
            id: tables.next_document_id,
            name: document.name,
            file_path: document.file_path,
            persist_path: document.persist_path,
            owner: document.owner,
            uploaded_at: Utc::now(),
        };
        tables.documents.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_document(&self, owner: u64, id: u64) -> Result<Option<DocumentRecord>> {
        Ok(self
            .tables
            .lock()
            .documents
            .get(&id)
            .filter(|d| d.owner == owner)
            .cloned())
    }

    async fn list_documents(&self, owner: u64) -> Result<Vec<DocumentRecord>> {
        Ok(self
            .tables
            .lock()
            .documents
            .values()
            .filter(|d| d.owner == owner)
            .cloned()
            .collect())
    }

    async fn delete_document(&self, owner: u64, id: u64) -> Result<bool> {
        let mut tables = self.tables.lock();
        if !tables.documents.get(&id).is_some_and(|d| d.owner == owner) {
            return Ok(false);
        }

        tables.documents.remove(&id);
        tables.answers.retain(|a| a.document_id != id);
        Ok(true)
    }

    async fn record_answer(&self, document_id: u64, question: &str, answer: &str) -> Result<AnswerRecord> {
        let mut tables = self.tables.lock();
        if !tables.documents.contains_key(&document_id) {
            return Err(Error::DocumentNotFound {
                id: document_id.to_string(),
            });
        }

        tables.next_answer_id += 1;
        let record = AnswerRecord {
            id: tables.next_answer_id,
            document_id,
            question: question.to_string(),
            answer: answer.to_string(),
            created_at: Utc::now(),
        };
        tables.answers.push(record.clone());
        Ok(record)
    }
}

/// Upload, ask, list, and delete workflows scoped to a principal
pub struct DocumentLibrary {
    service: Arc<RagService>,
    metadata: Arc<dyn MetadataStore>,
    /// Held from the duplicate check until the record is written, per store location
    uploads: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
}

impl DocumentLibrary {
    pub fn new(service: Arc<RagService>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            service,
            metadata,
            uploads: DashMap::new(),
        }
    }

    pub fn service(&self) -> &RagService {
        &self.service
    }

    /// Ingest an already saved upload and record it for `principal`.
    ///
    /// The document is named `{owner}_{filename}`. An upload whose name is
    /// already recorded, or whose store directory is already taken by another
    /// name, is rejected before any ingestion work.
    pub async fn upload(
        &self,
        principal: &Principal,
        saved_path: &Path,
        filename: &str,
        chunk_size: usize,
    ) -> Result<DocumentRecord> {
        let name = format!("{}_{}", principal.id, filename);
        let location = self.service.location_for(&name)?;

        let lock = self
            .uploads
            .entry(location.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.upload_locked(principal, saved_path, name, &location, chunk_size)
                .await
        };
        drop(lock);
        self.uploads.remove_if(&location, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn upload_locked(
        &self,
        principal: &Principal,
        saved_path: &Path,
        name: String,
        location: &Path,
        chunk_size: usize,
    ) -> Result<DocumentRecord> {
        if self.metadata.find_by_name(&name).await?.is_some() {
            return Err(Error::DocumentExists { name });
        }
        // Distinct names can sanitize to the same store directory
        if self.metadata.find_by_location(location).await?.is_some() || VectorStore::exists(location) {
            tracing::warn!("Store {} is already in use, rejecting {}", location.display(), name);
            return Err(Error::DocumentExists { name });
        }

        let document = self.service.ingest(saved_path, &name, chunk_size).await?;
        let inserted = self
            .metadata
            .insert_document(NewDocument {
                name,
                file_path: saved_path.to_path_buf(),
                persist_path: document.persist_path.clone(),
                owner: principal.id,
            })
            .await;

        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = self.service.delete_store(&document.persist_path).await {
                    tracing::warn!(
                        "Failed to remove unrecorded store {}: {}",
                        document.persist_path.display(),
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Recorded document {} ({}) for user {}",
            record.id,
            record.name,
            principal.id
        );
        Ok(record)
    }

    /// Answer a question and record it with the document
    pub async fn ask(&self, principal: &Principal, document_id: u64, question: &str) -> Result<AnswerRecord> {
        let stream = self.ask_stream(principal, document_id, question).await?;
        let answer = collect_answer(stream).await?;
        self.metadata.record_answer(document_id, question, &answer).await
    }

    /// Stream an answer without recording it
    pub async fn ask_stream(
        &self,
        principal: &Principal,
        document_id: u64,
        question: &str,
    ) -> Result<FragmentStream> {
        let record = self.owned(principal, document_id).await?;
        self.service.answer(question, &record.persist_path).await
    }

    /// Documents owned by `principal`
    pub async fn list(&self, principal: &Principal) -> Result<Vec<DocumentRecord>> {
        self.metadata.list_documents(principal.id).await
    }

    /// Remove the upload, its store, and its record
    pub async fn delete(&self, principal: &Principal, document_id: u64) -> Result<()> {
        let record = self.owned(principal, document_id).await?;

        match tokio::fs::remove_file(&record.file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.service.delete_store(&record.persist_path).await?;
        self.metadata.delete_document(principal.id, document_id).await?;

        tracing::info!("Deleted document {} ({})", record.id, record.name);
        Ok(())
    }

    async fn owned(&self, principal: &Principal, document_id: u64) -> Result<DocumentRecord> {
        self.metadata
            .get_document(principal.id, document_id)
            .await?
            .ok_or_else(|| Error::DocumentNotFound {
                id: document_id.to_string(),
            })
    }
}
