//! Pipeline orchestrator
//!
//! Drives one document through the fixed stage sequence: structure
//! extraction, concept extraction, embedding, clustering, graph merge,
//! final status write. Uploads are acknowledged immediately with a
//! PROCESSING placeholder; the run itself happens on a spawned task and
//! always ends in a terminal status.

use crate::cluster::assign_clusters;
use crate::concepts::{document_concepts, ConceptStage};
use crate::embedding::EmbeddingStage;
use crate::errors::PipelineError;
use crate::structure::StructureSource;
use bookgraph_common::db::repository::StatusStore;
use bookgraph_common::graph::GraphStore;
use bookgraph_common::model::{DocumentStatus, DocumentStatusSummary, ProcessedDocument};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Bounded memo capacity for terminal status lookups
pub const MEMO_CAPACITY: usize = 50;

/// FIFO-bounded memo of terminal statuses. Terminal states never change
/// again, so a hit can skip the store entirely. Non-terminal statuses
/// are never stored here.
struct StatusMemo {
    capacity: usize,
    entries: HashMap<String, DocumentStatus>,
    order: VecDeque<String>,
}

impl StatusMemo {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, document_id: &str) -> Option<DocumentStatus> {
        self.entries.get(document_id).copied()
    }

    fn insert(&mut self, document_id: &str, status: DocumentStatus) {
        if !status.is_terminal() || self.entries.contains_key(document_id) {
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }

        self.entries.insert(document_id.to_string(), status);
        self.order.push_back(document_id.to_string());
    }

    /// Drop a memoized status; needed when a document re-enters
    /// PROCESSING and its old terminal status stops being true
    fn remove(&mut self, document_id: &str) {
        self.entries.remove(document_id);
        self.order.retain(|id| id != document_id);
    }
}

struct Inner {
    store: Arc<dyn StatusStore>,
    graph: Arc<dyn GraphStore>,
    source: Arc<dyn StructureSource>,
    concepts: ConceptStage,
    embeddings: EmbeddingStage,
    memo: Mutex<StatusMemo>,
}

/// Cheaply cloneable handle; clones share the same stores and memo
#[derive(Clone)]
pub struct PipelineProcessor {
    inner: Arc<Inner>,
}

impl PipelineProcessor {
    pub fn new(
        store: Arc<dyn StatusStore>,
        graph: Arc<dyn GraphStore>,
        source: Arc<dyn StructureSource>,
        concepts: ConceptStage,
        embeddings: EmbeddingStage,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                graph,
                source,
                concepts,
                embeddings,
                memo: Mutex::new(StatusMemo::new(MEMO_CAPACITY)),
            }),
        }
    }

    /// Accept a new document for processing. Mints a fresh document_id,
    /// persists the PROCESSING placeholder, and spawns the pipeline run.
    /// Returns as soon as the placeholder is durable.
    pub async fn accept(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<DocumentStatusSummary, PipelineError> {
        let document_id = Uuid::new_v4().to_string();
        let placeholder = ProcessedDocument::placeholder(&document_id);
        let saved = self.inner.store.save(&placeholder).await?;

        info!(document_id = %document_id, "Document accepted for processing");

        let processor = self.clone();
        let path = path.into();
        tokio::spawn(async move {
            processor.run(document_id, path).await;
        });

        Ok(saved.summary())
    }

    /// Re-run the pipeline for an existing document. The status-guarded
    /// transition rejects a second concurrent run for the same id.
    pub async fn reprocess(
        &self,
        document_id: &str,
        path: impl Into<PathBuf>,
    ) -> Result<DocumentStatusSummary, PipelineError> {
        let document = self.inner.store.begin_processing(document_id).await?;
        self.inner.memo.lock().await.remove(document_id);

        info!(document_id = %document_id, "Document re-accepted for processing");

        let processor = self.clone();
        let id = document_id.to_string();
        let path = path.into();
        tokio::spawn(async move {
            processor.run(id, path).await;
        });

        Ok(document.summary())
    }

    /// Current status for pollers. Terminal statuses are served from the
    /// bounded memo after the first store lookup.
    pub async fn status(
        &self,
        document_id: &str,
    ) -> Result<DocumentStatusSummary, PipelineError> {
        if let Some(status) = self.inner.memo.lock().await.get(document_id) {
            return Ok(DocumentStatusSummary {
                document_id: document_id.to_string(),
                status,
            });
        }

        let document = self.inner.store.get(document_id).await?;
        self.inner
            .memo
            .lock()
            .await
            .insert(document_id, document.status);

        Ok(document.summary())
    }

    /// One full pipeline run. Never propagates an error: any failure is
    /// recorded as a terminal FAILED status.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn run(&self, document_id: String, path: PathBuf) {
        if let Err(e) = self.execute(&document_id, &path).await {
            error!(
                document_id = %document_id,
                error = %e,
                "Pipeline run failed, recording FAILED status"
            );

            let failed = ProcessedDocument::failed(&document_id);
            if let Err(e) = self.inner.store.update(&failed).await {
                error!(
                    document_id = %document_id,
                    error = %e,
                    "Could not record FAILED status"
                );
            }
        }
    }

    async fn execute(&self, document_id: &str, path: &Path) -> Result<(), PipelineError> {
        let structure = self.inner.source.read_document(path).await?;
        let mut sections = structure.sections;

        let started = Instant::now();

        self.inner.concepts.annotate_sections(&mut sections).await;
        let concepts = document_concepts(&sections);
        self.inner.concepts.release_model().await;

        self.inner.embeddings.annotate_sections(&mut sections).await;
        self.inner.embeddings.release_model().await;

        assign_clusters(&mut sections);

        info!(
            document_id = %document_id,
            section_count = sections.len(),
            concept_count = concepts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Feature extraction finished"
        );

        let mut document = ProcessedDocument::placeholder(document_id);
        document.apply_metadata(&structure.metadata);
        document.concepts = concepts;
        document.sections = sections;
        document.status = DocumentStatus::Completed;

        // The graph projection is best effort: the document record stays
        // authoritative even when the graph write fails.
        if let Err(e) = self.inner.graph.ensure_indexes().await {
            error!(document_id = %document_id, error = %e, "Graph index setup failed");
        } else if let Err(e) = self.inner.graph.merge_document(&document).await {
            error!(document_id = %document_id, error = %e, "Graph merge failed");
        }

        self.inner.store.update(&document).await?;

        info!(document_id = %document_id, "Document processing completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{DocumentStructure, StructureSource};
    use async_trait::async_trait;
    use bookgraph_common::db::memory::InMemoryStatusStore;
    use bookgraph_common::errors::{AppError, Result as AppResult};
    use bookgraph_common::llm::{ConceptExtractor, Embedder};
    use bookgraph_common::model::{BookMetadata, Section};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct StubSource {
        structure: DocumentStructure,
    }

    #[async_trait]
    impl StructureSource for StubSource {
        async fn read_document(&self, _path: &Path) -> Result<DocumentStructure, PipelineError> {
            Ok(self.structure.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl StructureSource for FailingSource {
        async fn read_document(&self, path: &Path) -> Result<DocumentStructure, PipelineError> {
            Err(PipelineError::StructureError {
                path: path.display().to_string(),
                message: "unreadable".to_string(),
            })
        }
    }

    /// Source that blocks until released, to observe mid-run status
    struct GatedSource {
        gate: Arc<Notify>,
        structure: DocumentStructure,
    }

    #[async_trait]
    impl StructureSource for GatedSource {
        async fn read_document(&self, _path: &Path) -> Result<DocumentStructure, PipelineError> {
            self.gate.notified().await;
            Ok(self.structure.clone())
        }
    }

    struct StubExtractor;

    #[async_trait]
    impl ConceptExtractor for StubExtractor {
        async fn extract(&self, _chunk: &str) -> AppResult<Vec<String>> {
            Ok(vec!["entropy".to_string(), "energy".to_string()])
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }

        fn model_name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct RecordingGraph {
        merges: AtomicUsize,
    }

    #[async_trait]
    impl GraphStore for RecordingGraph {
        async fn ensure_indexes(&self) -> AppResult<()> {
            Ok(())
        }

        async fn merge_document(&self, _document: &ProcessedDocument) -> AppResult<()> {
            self.merges.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingGraph;

    #[async_trait]
    impl GraphStore for FailingGraph {
        async fn ensure_indexes(&self) -> AppResult<()> {
            Err(AppError::Internal {
                message: "graph down".to_string(),
            })
        }

        async fn merge_document(&self, _document: &ProcessedDocument) -> AppResult<()> {
            Err(AppError::Internal {
                message: "graph down".to_string(),
            })
        }
    }

    fn sample_structure() -> DocumentStructure {
        DocumentStructure {
            metadata: BookMetadata {
                title: Some("Thermodynamics".to_string()),
                pages: Some(300),
                ..Default::default()
            },
            sections: vec![
                Section::new("Heat", "Heat flows from hot to cold.", vec![]),
                Section::new("Work", "Work is energy in transit.", vec![]),
            ],
        }
    }

    fn processor(
        store: Arc<dyn StatusStore>,
        graph: Arc<dyn GraphStore>,
        source: Arc<dyn StructureSource>,
    ) -> PipelineProcessor {
        PipelineProcessor::new(
            store,
            graph,
            source,
            ConceptStage::new(Arc::new(StubExtractor), 512),
            EmbeddingStage::new(Arc::new(StubEmbedder)),
        )
    }

    async fn wait_for_terminal(
        processor: &PipelineProcessor,
        document_id: &str,
    ) -> DocumentStatus {
        for _ in 0..100 {
            let summary = processor.status(document_id).await.unwrap();
            if summary.status.is_terminal() {
                return summary.status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("document never reached a terminal status");
    }

    #[tokio::test]
    async fn test_accept_returns_processing_placeholder() {
        let store = Arc::new(InMemoryStatusStore::new());
        let gate = Arc::new(Notify::new());
        let processor = processor(
            store.clone(),
            Arc::new(RecordingGraph { merges: AtomicUsize::new(0) }),
            Arc::new(GatedSource {
                gate: gate.clone(),
                structure: sample_structure(),
            }),
        );

        let summary = processor.accept("/tmp/book.pdf").await.unwrap();
        assert_eq!(summary.status, DocumentStatus::Processing);

        // the placeholder is durable and empty while the run is blocked
        let record = store.get(&summary.document_id).await.unwrap();
        assert_eq!(record.status, DocumentStatus::Processing);
        assert!(record.sections.is_empty());
        assert!(record.concepts.is_empty());

        gate.notify_one();
        wait_for_terminal(&processor, &summary.document_id).await;
    }

    #[tokio::test]
    async fn test_completed_run_populates_features() {
        let store = Arc::new(InMemoryStatusStore::new());
        let graph = Arc::new(RecordingGraph { merges: AtomicUsize::new(0) });
        let processor = processor(
            store.clone(),
            graph.clone(),
            Arc::new(StubSource {
                structure: sample_structure(),
            }),
        );

        let summary = processor.accept("/tmp/book.pdf").await.unwrap();
        let status = wait_for_terminal(&processor, &summary.document_id).await;
        assert_eq!(status, DocumentStatus::Completed);

        let record = store.get(&summary.document_id).await.unwrap();
        assert_eq!(record.title, "Thermodynamics");
        assert_eq!(record.pages, 300);
        assert_eq!(record.author, "Unknown");
        assert_eq!(
            record.concepts,
            vec!["energy".to_string(), "entropy".to_string()]
        );
        assert_eq!(record.sections.len(), 2);
        for section in &record.sections {
            assert!(!section.concepts.is_empty());
            assert!(section.concepts_embedding.is_some());
            assert!(section.cluster.is_some());
        }

        assert_eq!(graph.merges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_source_ends_in_failed() {
        let store = Arc::new(InMemoryStatusStore::new());
        let processor = processor(
            store.clone(),
            Arc::new(RecordingGraph { merges: AtomicUsize::new(0) }),
            Arc::new(FailingSource),
        );

        let summary = processor.accept("/tmp/missing.pdf").await.unwrap();
        let status = wait_for_terminal(&processor, &summary.document_id).await;
        assert_eq!(status, DocumentStatus::Failed);

        let record = store.get(&summary.document_id).await.unwrap();
        assert!(record.sections.is_empty());
    }

    #[tokio::test]
    async fn test_graph_failure_still_completes() {
        let store = Arc::new(InMemoryStatusStore::new());
        let processor = processor(
            store.clone(),
            Arc::new(FailingGraph),
            Arc::new(StubSource {
                structure: sample_structure(),
            }),
        );

        let summary = processor.accept("/tmp/book.pdf").await.unwrap();
        let status = wait_for_terminal(&processor, &summary.document_id).await;
        assert_eq!(status, DocumentStatus::Completed);
    }

    #[tokio::test]
    async fn test_reprocess_rejects_active_run() {
        let store = Arc::new(InMemoryStatusStore::new());
        let gate = Arc::new(Notify::new());
        let processor = processor(
            store.clone(),
            Arc::new(RecordingGraph { merges: AtomicUsize::new(0) }),
            Arc::new(GatedSource {
                gate: gate.clone(),
                structure: sample_structure(),
            }),
        );

        let summary = processor.accept("/tmp/book.pdf").await.unwrap();

        // the document is still PROCESSING behind the gate
        let err = processor
            .reprocess(&summary.document_id, "/tmp/book.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyProcessing(_)));

        gate.notify_one();
        wait_for_terminal(&processor, &summary.document_id).await;
    }

    #[tokio::test]
    async fn test_reprocess_after_completion_runs_again() {
        let store = Arc::new(InMemoryStatusStore::new());
        let graph = Arc::new(RecordingGraph { merges: AtomicUsize::new(0) });
        let processor = processor(
            store.clone(),
            graph.clone(),
            Arc::new(StubSource {
                structure: sample_structure(),
            }),
        );

        let summary = processor.accept("/tmp/book.pdf").await.unwrap();
        wait_for_terminal(&processor, &summary.document_id).await;

        let again = processor
            .reprocess(&summary.document_id, "/tmp/book.pdf")
            .await
            .unwrap();
        assert_eq!(again.document_id, summary.document_id);

        wait_for_terminal(&processor, &summary.document_id).await;
        assert_eq!(graph.merges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_document_status_is_not_found() {
        let processor = processor(
            Arc::new(InMemoryStatusStore::new()),
            Arc::new(RecordingGraph { merges: AtomicUsize::new(0) }),
            Arc::new(FailingSource),
        );

        let err = processor.status("no-such-id").await.unwrap_err();
        assert!(matches!(err, PipelineError::DocumentNotFound(_)));
    }

    #[test]
    fn test_memo_only_stores_terminal_statuses() {
        let mut memo = StatusMemo::new(2);
        memo.insert("a", DocumentStatus::Processing);
        assert!(memo.get("a").is_none());

        memo.insert("a", DocumentStatus::Completed);
        assert_eq!(memo.get("a"), Some(DocumentStatus::Completed));
    }

    #[test]
    fn test_memo_evicts_oldest_first() {
        let mut memo = StatusMemo::new(2);
        memo.insert("a", DocumentStatus::Completed);
        memo.insert("b", DocumentStatus::Failed);
        memo.insert("c", DocumentStatus::Completed);

        assert!(memo.get("a").is_none());
        assert_eq!(memo.get("b"), Some(DocumentStatus::Failed));
        assert_eq!(memo.get("c"), Some(DocumentStatus::Completed));
    }

    #[test]
    fn test_memo_remove_frees_capacity() {
        let mut memo = StatusMemo::new(2);
        memo.insert("a", DocumentStatus::Completed);
        memo.insert("b", DocumentStatus::Completed);
        memo.remove("a");
        memo.insert("c", DocumentStatus::Completed);

        // "b" survives because removing "a" made room
        assert_eq!(memo.get("b"), Some(DocumentStatus::Completed));
        assert_eq!(memo.get("c"), Some(DocumentStatus::Completed));
    }
}
