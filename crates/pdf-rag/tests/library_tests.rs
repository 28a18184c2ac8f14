//! Per-user upload, ask, list, and delete workflows

mod common;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use common::{Harness, GARDEN_PAGES, SOLAR_PAGES};
use pdf_rag::error::{Error, ErrorKind, Result};
use pdf_rag::library::{
    AnswerRecord, DocumentLibrary, DocumentRecord, InMemoryMetadataStore, MetadataStore, NewDocument, Principal,
};
use pdf_rag::storage::VectorStore;

fn library(harness: &Harness) -> (DocumentLibrary, Arc<InMemoryMetadataStore>) {
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let store: Arc<dyn MetadataStore> = metadata.clone();
    (DocumentLibrary::new(Arc::clone(&harness.service), store), metadata)
}

#[tokio::test]
async fn test_upload_prefixes_owner_and_records_document() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(7);
    let saved = harness.pdf("7_manual.pdf", &SOLAR_PAGES);

    let record = library.upload(&alice, &saved, "manual.pdf", 1000).await.unwrap();

    assert_eq!(record.name, "7_manual.pdf");
    assert_eq!(record.owner, 7);
    assert_eq!(record.file_path, saved);
    assert_eq!(record.persist_path, harness.root().join("7_manual"));
    assert!(VectorStore::exists(&record.persist_path));
}

#[tokio::test]
async fn test_duplicate_upload_rejected_before_ingestion() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(1);
    let bob = Principal::new(2);
    let saved = harness.pdf("report.pdf", &SOLAR_PAGES);

    library.upload(&alice, &saved, "report.pdf", 1000).await.unwrap();
    let embed_calls = harness.embedder.calls();

    let err = library.upload(&alice, &saved, "report.pdf", 1000).await.unwrap_err();
    assert!(matches!(err, Error::DocumentExists { ref name } if name == "1_report.pdf"));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(harness.embedder.calls(), embed_calls);

    // Same file name for another user is a different document
    let other = library.upload(&bob, &saved, "report.pdf", 1000).await.unwrap();
    assert_eq!(other.name, "2_report.pdf");
    assert_ne!(other.persist_path, harness.root().join("1_report"));
}

#[tokio::test]
async fn test_ask_records_answer() {
    let harness = Harness::new();
    let (library, metadata) = library(&harness);
    let alice = Principal::new(1);
    let saved = harness.pdf("solar.pdf", &SOLAR_PAGES);
    let record = library.upload(&alice, &saved, "solar.pdf", 1000).await.unwrap();

    let answer = library
        .ask(&alice, record.id, "What is this document about?")
        .await
        .unwrap();

    assert_eq!(answer.document_id, record.id);
    assert_eq!(answer.question, "What is this document about?");
    assert_eq!(answer.answer, "This document is a manual for a home solar system.");
    assert_eq!(metadata.answers_for(record.id), vec![answer]);
}

#[tokio::test]
async fn test_failed_answer_is_not_recorded() {
    let harness = Harness::new();
    let (library, metadata) = library(&harness);
    let alice = Principal::new(1);
    let saved = harness.pdf("solar.pdf", &SOLAR_PAGES);
    let record = library.upload(&alice, &saved, "solar.pdf", 1000).await.unwrap();

    harness.generator.set_mode(common::StreamMode::FailAfter(2));
    let err = library
        .ask(&alice, record.id, "What is this document about?")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GenerationInterrupted { .. }));
    assert!(metadata.answers_for(record.id).is_empty());
}

#[tokio::test]
async fn test_documents_are_scoped_to_owner() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(1);
    let bob = Principal::new(2);

    let solar = harness.pdf("solar.pdf", &SOLAR_PAGES);
    let garden = harness.pdf("garden.pdf", &GARDEN_PAGES);
    let alices = library.upload(&alice, &solar, "solar.pdf", 1000).await.unwrap();
    library.upload(&bob, &garden, "garden.pdf", 1000).await.unwrap();

    let names: Vec<String> = library.list(&alice).await.unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["1_solar.pdf"]);

    let err = library
        .ask(&bob, alices.id, "What is this document about?")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound { .. }));

    let err = library.delete(&bob, alices.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(VectorStore::exists(&alices.persist_path));
}

#[tokio::test]
async fn test_delete_removes_file_store_and_record() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(1);
    let saved = harness.pdf("solar.pdf", &SOLAR_PAGES);
    let record = library.upload(&alice, &saved, "solar.pdf", 1000).await.unwrap();

    library.delete(&alice, record.id).await.unwrap();

    assert!(!saved.exists());
    assert!(!record.persist_path.exists());
    assert!(library.list(&alice).await.unwrap().is_empty());

    let err = library.delete(&alice, record.id).await.unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound { .. }));
}

#[tokio::test]
async fn test_delete_tolerates_missing_artifacts() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(1);
    let saved = harness.pdf("solar.pdf", &SOLAR_PAGES);
    let record = library.upload(&alice, &saved, "solar.pdf", 1000).await.unwrap();

    std::fs::remove_file(&saved).unwrap();
    harness.service.delete_store(&record.persist_path).await.unwrap();

    library.delete(&alice, record.id).await.unwrap();
    assert!(library.list(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_names_sharing_a_store_directory_are_rejected() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(1);
    let solar = harness.pdf("solar.pdf", &SOLAR_PAGES);
    let garden = harness.pdf("garden.pdf", &GARDEN_PAGES);

    let first = library.upload(&alice, &solar, "annual report.pdf", 1000).await.unwrap();
    let embed_calls = harness.embedder.calls();

    for colliding in ["annual_report.pdf", "annual_report", "annual?report.PDF"] {
        let err = library.upload(&alice, &garden, colliding, 1000).await.unwrap_err();
        assert!(matches!(err, Error::DocumentExists { .. }), "{colliding}: {err}");
    }
    assert_eq!(harness.embedder.calls(), embed_calls);

    // The first document still owns its store
    let stored = VectorStore::read_manifest(&first.persist_path).unwrap();
    assert_eq!(stored.source_path, solar);
    assert_eq!(library.list(&alice).await.unwrap(), vec![first]);
}

#[tokio::test]
async fn test_unrecorded_store_on_disk_blocks_upload() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(1);
    let solar = harness.pdf("solar.pdf", &SOLAR_PAGES);
    let garden = harness.pdf("garden.pdf", &GARDEN_PAGES);
    let existing = harness.service.ingest(&solar, "1_manual", 1000).await.unwrap();

    let err = library.upload(&alice, &garden, "manual.pdf", 1000).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    let stored = VectorStore::read_manifest(&existing.persist_path).unwrap();
    assert_eq!(stored.source_path, solar);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_of_one_name_record_the_stored_content() {
    let harness = Harness::new();
    let (library, _) = library(&harness);
    let alice = Principal::new(1);
    let solar = harness.pdf("v1.pdf", &SOLAR_PAGES);
    let garden = harness.pdf("v2.pdf", &GARDEN_PAGES);

    let (a, b) = tokio::join!(
        library.upload(&alice, &solar, "manual.pdf", 1000),
        library.upload(&alice, &garden, "manual.pdf", 1000)
    );

    let (winner, loser) = match (a, b) {
        (Ok(record), Err(err)) | (Err(err), Ok(record)) => (record, err),
        (a, b) => panic!("expected exactly one upload to succeed: {:?} / {:?}", a.is_ok(), b.is_ok()),
    };
    assert!(matches!(loser, Error::DocumentExists { .. }));

    let stored = VectorStore::read_manifest(&winner.persist_path).unwrap();
    assert_eq!(stored.source_path, winner.file_path);
    assert_eq!(library.list(&alice).await.unwrap(), vec![winner]);
}

/// Metadata store whose inserts always fail
struct FailingInserts(InMemoryMetadataStore);

#[async_trait]
impl MetadataStore for FailingInserts {
    async fn find_by_name(&self, name: &str) -> Result<Option<DocumentRecord>> {
        self.0.find_by_name(name).await
    }

    async fn find_by_location(&self, persist_path: &Path) -> Result<Option<DocumentRecord>> {
        self.0.find_by_location(persist_path).await
    }

    async fn insert_document(&self, _document: NewDocument) -> Result<DocumentRecord> {
        Err(Error::internal("metadata store is read-only"))
    }

    async fn get_document(&self, owner: u64, id: u64) -> Result<Option<DocumentRecord>> {
        self.0.get_document(owner, id).await
    }

    async fn list_documents(&self, owner: u64) -> Result<Vec<DocumentRecord>> {
        self.0.list_documents(owner).await
    }

    async fn delete_document(&self, owner: u64, id: u64) -> Result<bool> {
        self.0.delete_document(owner, id).await
    }

    async fn record_answer(&self, document_id: u64, question: &str, answer: &str) -> Result<AnswerRecord> {
        self.0.record_answer(document_id, question, answer).await
    }
}

#[tokio::test]
async fn test_failed_insert_removes_fresh_store() {
    let harness = Harness::new();
    let metadata: Arc<dyn MetadataStore> = Arc::new(FailingInserts(InMemoryMetadataStore::new()));
    let library = DocumentLibrary::new(Arc::clone(&harness.service), metadata);
    let alice = Principal::new(1);
    let solar = harness.pdf("solar.pdf", &SOLAR_PAGES);

    let err = library.upload(&alice, &solar, "solar.pdf", 1000).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(harness.embedder.calls() > 0);
    assert!(!VectorStore::exists(&harness.root().join("1_solar")));
    assert!(harness.root_entries().is_empty());
}
