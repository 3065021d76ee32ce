use std::sync::Arc;
use std::time::Duration;

use futures::{stream, TryStreamExt};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        self,
        document::DocumentStoreClient,
        tenant::TenantIndexManager,
        types::{
            chunk::Chunk,
            extraction::Extraction,
            source::{Source, SourceStatus},
        },
        vector::{ContentType, VectorPayload, VectorRecord},
    },
    utils::embedding::EmbeddingProvider,
};

use crate::{
    config::IngestionConfig,
    types::{ExtractionDraft, ExtractionMode, ParsedDocument},
    vector_writer::VectorWriter,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source_id: String,
    pub chunks_written: usize,
    pub vectors_written: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Vectors re-created from document store content.
    pub repaired: usize,
    /// Orphan vectors removed because nothing in the document store
    /// backs them anymore.
    pub removed: usize,
}

/// Drives a document through both stores: document store first, vectors
/// second. A crash between the two leaves the source out of Complete and
/// the gap repairable by `reconcile`.
pub struct IngestionCoordinator {
    documents: DocumentStoreClient,
    vectors: Arc<dyn VectorWriter>,
    embedder: Arc<EmbeddingProvider>,
    tenants: TenantIndexManager,
    config: IngestionConfig,
}

impl IngestionCoordinator {
    pub fn new(
        documents: DocumentStoreClient,
        vectors: Arc<dyn VectorWriter>,
        embedder: Arc<EmbeddingProvider>,
        tenants: TenantIndexManager,
        config: IngestionConfig,
    ) -> Self {
        Self {
            documents,
            vectors,
            embedder,
            tenants,
            config,
        }
    }

    /// Ingest a parsed document for a tenant. Chunk ids are derived from
    /// the source, so re-running after a failure converges instead of
    /// duplicating data.
    #[tracing::instrument(skip_all, fields(tenant_id, title = %document.meta.title))]
    pub async fn ingest_source(
        &self,
        tenant_id: &str,
        document: ParsedDocument,
    ) -> Result<IngestReport, AppError> {
        self.tenants.guard(tenant_id).await?;

        let meta = document.meta;
        let source = Source::new(
            tenant_id.to_owned(),
            meta.source_type,
            meta.title,
            meta.authors,
            meta.origin_path,
            meta.metadata,
            meta.category,
            meta.tags,
            meta.year,
        );
        let source = self.documents.create_source(source).await?;
        self.resume_ingest(&source, document.chunks).await
    }

    /// Re-run ingestion for an existing source, e.g. after a failed
    /// attempt. The chunk drafts replace whatever is stored.
    pub async fn reingest_source(
        &self,
        source_id: &str,
        chunks: Vec<crate::types::ChunkDraft>,
    ) -> Result<IngestReport, AppError> {
        let source = self.documents.get_source(source_id).await?;
        self.tenants.guard(&source.tenant_id).await?;
        self.resume_ingest(&source, chunks).await
    }

    async fn resume_ingest(
        &self,
        source: &Source,
        drafts: Vec<crate::types::ChunkDraft>,
    ) -> Result<IngestReport, AppError> {
        let source = self
            .documents
            .update_source_status(&source.id, SourceStatus::Processing)
            .await?;

        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                Chunk::new(
                    source.tenant_id.clone(),
                    &source.id,
                    index as u32,
                    draft.text,
                    draft.token_count,
                    draft.position,
                )
            })
            .collect();

        // Document store commits first. Vector writes follow and may
        // partially fail; the Failed status marks the source as a
        // reconciliation candidate.
        let chunks_written = self
            .retry_transient(|| {
                let chunks = chunks.clone();
                let source_id = source.id.as_str();
                storage::timed("document store", self.document_timeout(), async move {
                    self.documents.replace_chunks(source_id, chunks).await
                })
            })
            .await?;

        let result = self.write_chunk_vectors(&source, &chunks).await;
        match result {
            Ok(vectors_written) => {
                self.documents
                    .update_source_status(&source.id, SourceStatus::Complete)
                    .await?;
                info!(
                    source_id = %source.id,
                    chunks = chunks_written,
                    vectors = vectors_written,
                    "source ingested"
                );
                Ok(IngestReport {
                    source_id: source.id.clone(),
                    chunks_written,
                    vectors_written,
                })
            }
            Err(err) => {
                warn!(
                    source_id = %source.id,
                    error = %err,
                    "vector writes failed after document store commit; source left as reconciliation candidate"
                );
                self.documents
                    .update_source_status(&source.id, SourceStatus::Failed)
                    .await?;
                Err(err)
            }
        }
    }

    async fn write_chunk_vectors(
        &self,
        source: &Source,
        chunks: &[Chunk],
    ) -> Result<usize, AppError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(texts)
            .await
            .map_err(|err| AppError::Embedding(err.to_string()))?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| chunk_vector_record(source, chunk, embedding))
            .collect();

        self.write_vectors(records).await
    }

    async fn write_vectors(&self, records: Vec<VectorRecord>) -> Result<usize, AppError> {
        let concurrency = self.config.tuning.vector_write_concurrency;
        let count = records.len();

        stream::iter(records.into_iter().map(Ok::<_, AppError>))
            .try_for_each_concurrent(concurrency, |record| async move {
                self.retry_transient(|| {
                    let record = record.clone();
                    storage::timed("vector store", self.vector_timeout(), async move {
                        self.vectors.upsert(record).await
                    })
                })
                .await
            })
            .await?;

        Ok(count)
    }

    /// Retry a store call on transient errors with bounded exponential
    /// backoff. Validation and not-found errors surface immediately.
    async fn retry_transient<T, F, Fut>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let tuning = &self.config.tuning;
        let strategy = ExponentialBackoff::from_millis(tuning.store_initial_backoff_ms)
            .map(jitter)
            .take(tuning.store_attempts.saturating_sub(1));
        RetryIf::spawn(strategy, operation, AppError::is_transient).await
    }

    /// Token budget per chunk for callers that hand over raw text.
    pub fn chunk_max_tokens(&self) -> usize {
        self.config.tuning.chunk_max_tokens
    }

    fn document_timeout(&self) -> Duration {
        Duration::from_millis(self.config.tuning.document_timeout_ms)
    }

    fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.config.tuning.vector_timeout_ms)
    }

    /// Store structured extractions for a source and index them in the
    /// vector store.
    #[tracing::instrument(skip_all, fields(source_id, mode = ?mode, count = drafts.len()))]
    pub async fn run_extractions(
        &self,
        source_id: &str,
        drafts: Vec<ExtractionDraft>,
        mode: ExtractionMode,
    ) -> Result<usize, AppError> {
        let source = self.documents.get_source(source_id).await?;
        self.tenants.guard(&source.tenant_id).await?;

        // Display fields come from the source and its chunks, fetched once
        // per run rather than per extraction.
        let chunks = self.documents.get_chunks_by_source(source_id).await?;

        // Build every record up front so a bad draft rejects the whole run
        // before anything is deleted or written.
        let mut pending = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let chunk_id = Chunk::deterministic_id(source_id, draft.chunk_index);
            let chunk = chunks
                .iter()
                .find(|chunk| chunk.id == chunk_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "chunk {chunk_id} referenced by extraction '{}'",
                        draft.title
                    ))
                })?;
            let extraction = Extraction::new(
                &source,
                chunk,
                draft.extraction_type,
                draft.title,
                draft.content,
                draft.topics,
                draft.confidence,
            );
            common::schema::validate_extraction(&extraction)?;
            pending.push(extraction);
        }

        if mode == ExtractionMode::Replace {
            let existing = self.documents.get_extractions_by_source(source_id).await?;
            for extraction in &existing {
                self.vectors.delete(&extraction.id).await?;
            }
            self.documents.delete_extractions_by_source(source_id).await?;
        }

        let mut stored = Vec::with_capacity(pending.len());
        for extraction in pending {
            let stored_extraction = self
                .retry_transient(|| {
                    let extraction = extraction.clone();
                    storage::timed("document store", self.document_timeout(), async move {
                        self.documents.create_extraction(extraction).await
                    })
                })
                .await?;
            stored.push(stored_extraction);
        }

        let mut records = Vec::with_capacity(stored.len());
        for extraction in &stored {
            let embedding = self
                .embedder
                .embed(&extraction_text(extraction))
                .await
                .map_err(|err| AppError::Embedding(err.to_string()))?;
            records.push(extraction_vector_record(&source, extraction, embedding));
        }
        let written = self.write_vectors(records).await?;
        info!(source_id, extractions = written, "extractions indexed");
        Ok(written)
    }

    /// Bring the vector store back in line with the document store for
    /// one source: re-create missing vectors, remove orphans, and mark a
    /// previously failed source Complete once both sides agree.
    #[tracing::instrument(skip_all, fields(source_id))]
    pub async fn reconcile(&self, source_id: &str) -> Result<ReconcileReport, AppError> {
        let source = self.documents.get_source(source_id).await?;
        self.tenants.guard(&source.tenant_id).await?;

        let chunks = self.documents.get_chunks_by_source(source_id).await?;
        let extractions = self.documents.get_extractions_by_source(source_id).await?;
        let existing: std::collections::HashSet<String> = self
            .vectors
            .list_ids_by_source(&source.tenant_id, source_id)
            .await?
            .into_iter()
            .collect();

        let mut report = ReconcileReport::default();

        let missing_chunks: Vec<&Chunk> = chunks
            .iter()
            .filter(|chunk| !existing.contains(&chunk.id))
            .collect();
        for chunk in missing_chunks {
            let embedding = self
                .embedder
                .embed(&chunk.text)
                .await
                .map_err(|err| AppError::Embedding(err.to_string()))?;
            self.vectors
                .upsert(chunk_vector_record(&source, chunk, embedding))
                .await?;
            report.repaired += 1;
        }

        for extraction in &extractions {
            if existing.contains(&extraction.id) {
                continue;
            }
            let embedding = self
                .embedder
                .embed(&extraction_text(extraction))
                .await
                .map_err(|err| AppError::Embedding(err.to_string()))?;
            self.vectors
                .upsert(extraction_vector_record(&source, extraction, embedding))
                .await?;
            report.repaired += 1;
        }

        let expected: std::collections::HashSet<&str> = chunks
            .iter()
            .map(|chunk| chunk.id.as_str())
            .chain(extractions.iter().map(|extraction| extraction.id.as_str()))
            .collect();
        for orphan in existing.iter().filter(|id| !expected.contains(id.as_str())) {
            self.vectors.delete(orphan).await?;
            report.removed += 1;
        }

        if source.status == SourceStatus::Failed {
            self.documents
                .update_source_status(source_id, SourceStatus::Processing)
                .await?;
            self.documents
                .update_source_status(source_id, SourceStatus::Complete)
                .await?;
        }

        info!(
            source_id,
            repaired = report.repaired,
            removed = report.removed,
            "source reconciled"
        );
        Ok(report)
    }

    /// Remove a source everywhere. Vectors go first so that a failure
    /// midway never strands vectors without their backing documents.
    pub async fn delete_source(&self, source_id: &str) -> Result<(), AppError> {
        let source = self.documents.get_source(source_id).await?;
        self.tenants.guard(&source.tenant_id).await?;

        storage::timed("vector store", self.vector_timeout(), async {
            self.vectors.delete_by_source(&source.tenant_id, source_id).await
        })
        .await?;
        storage::timed("document store", self.document_timeout(), async {
            self.documents.delete_source_cascade(source_id).await
        })
        .await?;
        info!(source_id, "source deleted from both stores");
        Ok(())
    }
}

fn chunk_vector_record(source: &Source, chunk: &Chunk, embedding: Vec<f32>) -> VectorRecord {
    VectorRecord::new(
        chunk.id.clone(),
        embedding,
        VectorPayload {
            tenant_id: source.tenant_id.clone(),
            content_type: Some(ContentType::Chunk),
            source_id: source.id.clone(),
            source_type: Some(source.source_type.as_str().to_owned()),
            source_category: Some(source.category.as_str().to_owned()),
            source_year: source.year,
            source_tags: source.tags.clone(),
            chapter: chunk.position.chapter.clone(),
            chunk_id: Some(chunk.id.clone()),
            source_title: Some(source.title.clone()),
            section: chunk.position.section.clone(),
            page: chunk.position.page,
            ..Default::default()
        },
    )
}

fn extraction_vector_record(
    source: &Source,
    extraction: &Extraction,
    embedding: Vec<f32>,
) -> VectorRecord {
    VectorRecord::new(
        extraction.id.clone(),
        embedding,
        VectorPayload {
            tenant_id: source.tenant_id.clone(),
            content_type: Some(ContentType::Extraction),
            source_id: source.id.clone(),
            source_type: Some(source.source_type.as_str().to_owned()),
            source_category: Some(source.category.as_str().to_owned()),
            source_year: source.year,
            source_tags: source.tags.clone(),
            extraction_type: Some(extraction.extraction_type.as_str().to_owned()),
            topics: extraction.topics.clone(),
            chapter: extraction.chapter.clone(),
            chunk_id: Some(extraction.chunk_id.clone()),
            extraction_id: Some(extraction.id.clone()),
            source_title: Some(source.title.clone()),
            extraction_title: Some(extraction.title.clone()),
            ..Default::default()
        },
    )
}

/// Text handed to the embedder for an extraction: the title plus every
/// string value in its content object.
fn extraction_text(extraction: &Extraction) -> String {
    let mut parts = vec![extraction.title.clone()];
    if let Some(object) = extraction.content.as_object() {
        for value in object.values() {
            collect_strings(value, &mut parts);
        }
    }
    parts.join("\n")
}

fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_strings(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkDraft, SourceMeta};
    use crate::vector_writer::SurrealVectorWriter;
    use async_trait::async_trait;
    use common::storage::types::chunk::ChunkPosition;
    use common::storage::types::extraction::ExtractionType;
    use common::storage::types::source::{SourceCategory, SourceType};
    use common::storage::{
        db::SurrealDbClient,
        vector::{DistanceMetric, VectorStoreClient},
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const DIM: usize = 16;
    const TENANT: &str = "tenant-a";

    struct Harness {
        documents: DocumentStoreClient,
        vector_store: VectorStoreClient,
        tenants: TenantIndexManager,
        embedder: Arc<EmbeddingProvider>,
    }

    async fn harness() -> Harness {
        let doc_db = SurrealDbClient::memory("coord_ns", &Uuid::new_v4().to_string())
            .await
            .expect("doc db");
        let vec_db = SurrealDbClient::memory("coord_ns", &Uuid::new_v4().to_string())
            .await
            .expect("vec db");
        let documents = DocumentStoreClient::new(doc_db);
        let vector_store = VectorStoreClient::new(vec_db, DIM, DistanceMetric::Cosine);
        let tenants = TenantIndexManager::new(documents.clone(), vector_store.clone());
        tenants.initialize(TENANT).await.expect("tenant init");
        let embedder = Arc::new(EmbeddingProvider::new_hashed(DIM).expect("embedder"));
        Harness {
            documents,
            vector_store,
            tenants,
            embedder,
        }
    }

    fn coordinator(h: &Harness, vectors: Arc<dyn VectorWriter>) -> IngestionCoordinator {
        IngestionCoordinator::new(
            h.documents.clone(),
            vectors,
            Arc::clone(&h.embedder),
            h.tenants.clone(),
            IngestionConfig::default(),
        )
    }

    fn sample_document() -> ParsedDocument {
        ParsedDocument {
            meta: SourceMeta {
                source_type: SourceType::Book,
                title: "Release It".into(),
                authors: vec!["M. Nygard".into()],
                origin_path: "/books/release-it.pdf".into(),
                category: SourceCategory::Engineering,
                tags: vec!["resilience".into()],
                year: Some(2018),
                metadata: None,
            },
            chunks: (0..3)
                .map(|i| ChunkDraft {
                    text: format!("chunk number {i} about circuit breakers"),
                    token_count: 6,
                    position: ChunkPosition {
                        chapter: Some("5".into()),
                        ..Default::default()
                    },
                })
                .collect(),
        }
    }

    fn pattern_draft(title: &str) -> ExtractionDraft {
        ExtractionDraft {
            extraction_type: ExtractionType::Pattern,
            title: title.into(),
            content: json!({
                "name": title,
                "problem": "Cascading failures across services",
                "solution": "Trip the circuit and fail fast"
            }),
            topics: vec!["resilience".into()],
            chunk_index: 0,
            confidence: 0.9,
        }
    }

    /// Fails every upsert whose record id matches, a fixed number of
    /// times in total, then behaves normally.
    struct FlakyWriter {
        inner: SurrealVectorWriter,
        fail_id: String,
        remaining_failures: AtomicUsize,
    }

    #[async_trait]
    impl VectorWriter for FlakyWriter {
        async fn upsert(&self, record: VectorRecord) -> Result<(), AppError> {
            if record.id == self.fail_id
                && self
                    .remaining_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(AppError::Validation("injected vector write failure".into()));
            }
            self.inner.upsert(record).await
        }

        async fn delete(&self, id: &str) -> Result<(), AppError> {
            self.inner.delete(id).await
        }

        async fn delete_by_source(
            &self,
            tenant_id: &str,
            source_id: &str,
        ) -> Result<(), AppError> {
            self.inner.delete_by_source(tenant_id, source_id).await
        }

        async fn list_ids_by_source(
            &self,
            tenant_id: &str,
            source_id: &str,
        ) -> Result<Vec<String>, AppError> {
            self.inner.list_ids_by_source(tenant_id, source_id).await
        }
    }

    #[tokio::test]
    async fn ingest_writes_both_stores_and_completes() {
        let h = harness().await;
        let coordinator = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );

        let report = coordinator
            .ingest_source(TENANT, sample_document())
            .await
            .expect("ingest");
        assert_eq!(report.chunks_written, 3);
        assert_eq!(report.vectors_written, 3);

        let source = h
            .documents
            .get_source(&report.source_id)
            .await
            .expect("source");
        assert_eq!(source.status, SourceStatus::Complete);

        let ids = h
            .vector_store
            .list_ids_by_source(TENANT, &report.source_id)
            .await
            .expect("vector ids");
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn ingest_rejects_unknown_tenant() {
        let h = harness().await;
        let coordinator = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );
        let err = coordinator
            .ingest_source("tenant-unknown", sample_document())
            .await
            .expect_err("tenant gate");
        assert!(matches!(err, AppError::TenantNotReady(_)));
    }

    #[tokio::test]
    async fn partial_vector_failure_marks_failed_and_rerun_converges() {
        let h = harness().await;

        // First attempt: writes for one chunk id keep failing with a
        // non-transient error, so retries do not mask the problem.
        let ParsedDocument { meta, chunks } = sample_document();
        let source = h
            .documents
            .create_source(Source::new(
                TENANT.into(),
                meta.source_type,
                meta.title,
                meta.authors,
                meta.origin_path,
                meta.metadata,
                meta.category,
                meta.tags,
                meta.year,
            ))
            .await
            .expect("create source");
        let fail_id = Chunk::deterministic_id(&source.id, 1);

        let flaky = coordinator(
            &h,
            Arc::new(FlakyWriter {
                inner: SurrealVectorWriter::new(h.vector_store.clone()),
                fail_id,
                remaining_failures: AtomicUsize::new(usize::MAX),
            }),
        );
        let err = flaky
            .reingest_source(&source.id, chunks.clone())
            .await
            .expect_err("vector failure surfaces");
        assert!(matches!(err, AppError::Validation(_)));

        let failed = h.documents.get_source(&source.id).await.expect("source");
        assert_eq!(failed.status, SourceStatus::Failed);

        // Chunks are committed in the document store regardless.
        let stored_chunks = h
            .documents
            .get_chunks_by_source(&source.id)
            .await
            .expect("chunks");
        assert_eq!(stored_chunks.len(), 3);

        // Re-run with a healthy writer: same ids, so the run converges.
        let healthy = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );
        let report = healthy
            .reingest_source(&source.id, chunks)
            .await
            .expect("second attempt");
        assert_eq!(report.vectors_written, 3);

        let recovered = h.documents.get_source(&source.id).await.expect("source");
        assert_eq!(recovered.status, SourceStatus::Complete);
        let ids = h
            .vector_store
            .list_ids_by_source(TENANT, &source.id)
            .await
            .expect("ids");
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_away() {
        let h = harness().await;

        // Two transient failures across the batch; the retry policy
        // absorbs them and the ingest completes.
        struct TransientWriter {
            inner: SurrealVectorWriter,
            remaining_failures: AtomicUsize,
        }

        #[async_trait]
        impl VectorWriter for TransientWriter {
            async fn upsert(&self, record: VectorRecord) -> Result<(), AppError> {
                if self
                    .remaining_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(AppError::Timeout("vector store"));
                }
                self.inner.upsert(record).await
            }

            async fn delete(&self, id: &str) -> Result<(), AppError> {
                self.inner.delete(id).await
            }

            async fn delete_by_source(
                &self,
                tenant_id: &str,
                source_id: &str,
            ) -> Result<(), AppError> {
                self.inner.delete_by_source(tenant_id, source_id).await
            }

            async fn list_ids_by_source(
                &self,
                tenant_id: &str,
                source_id: &str,
            ) -> Result<Vec<String>, AppError> {
                self.inner.list_ids_by_source(tenant_id, source_id).await
            }
        }

        let coordinator = coordinator(
            &h,
            Arc::new(TransientWriter {
                inner: SurrealVectorWriter::new(h.vector_store.clone()),
                remaining_failures: AtomicUsize::new(2),
            }),
        );
        let report = coordinator
            .ingest_source(TENANT, sample_document())
            .await
            .expect("retries should absorb transient failures");
        assert_eq!(report.vectors_written, 3);

        let source = h
            .documents
            .get_source(&report.source_id)
            .await
            .expect("source");
        assert_eq!(source.status, SourceStatus::Complete);
    }

    #[tokio::test]
    async fn replace_extractions_swaps_vectors_and_rows() {
        let h = harness().await;
        let coordinator = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );
        let report = coordinator
            .ingest_source(TENANT, sample_document())
            .await
            .expect("ingest");

        coordinator
            .run_extractions(
                &report.source_id,
                vec![pattern_draft("Circuit Breaker")],
                ExtractionMode::Replace,
            )
            .await
            .expect("first extraction run");

        coordinator
            .run_extractions(
                &report.source_id,
                vec![pattern_draft("Bulkhead")],
                ExtractionMode::Replace,
            )
            .await
            .expect("replace run");

        let extractions = h
            .documents
            .get_extractions_by_source(&report.source_id)
            .await
            .expect("extractions");
        assert_eq!(extractions.len(), 1);
        assert_eq!(extractions[0].title, "Bulkhead");
        assert_eq!(
            extractions[0].chunk_id,
            Chunk::deterministic_id(&report.source_id, 0)
        );
        assert_eq!(extractions[0].source_title, "Release It");
        assert_eq!(extractions[0].chapter.as_deref(), Some("5"));

        // 3 chunk vectors + 1 extraction vector.
        let ids = h
            .vector_store
            .list_ids_by_source(TENANT, &report.source_id)
            .await
            .expect("ids");
        assert_eq!(ids.len(), 4);

        // Append keeps what is there.
        coordinator
            .run_extractions(
                &report.source_id,
                vec![pattern_draft("Timeouts")],
                ExtractionMode::Append,
            )
            .await
            .expect("append run");
        let extractions = h
            .documents
            .get_extractions_by_source(&report.source_id)
            .await
            .expect("extractions");
        assert_eq!(extractions.len(), 2);
    }

    #[tokio::test]
    async fn misshaped_extraction_writes_to_neither_store() {
        let h = harness().await;
        let coordinator = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );
        let report = coordinator
            .ingest_source(TENANT, sample_document())
            .await
            .expect("ingest");
        coordinator
            .run_extractions(
                &report.source_id,
                vec![pattern_draft("Circuit Breaker")],
                ExtractionMode::Replace,
            )
            .await
            .expect("valid run");

        // Decision-typed draft carrying pattern-shaped content.
        let bad = ExtractionDraft {
            extraction_type: ExtractionType::Decision,
            title: "Not a decision".into(),
            content: json!({
                "name": "Bulkhead",
                "problem": "Shared thread pools",
                "solution": "Partition resources"
            }),
            topics: vec![],
            chunk_index: 0,
            confidence: 0.5,
        };
        let err = coordinator
            .run_extractions(&report.source_id, vec![bad], ExtractionMode::Replace)
            .await
            .expect_err("misshaped content");
        assert!(matches!(err, AppError::Validation(_)));

        // The failed replace run left the earlier extraction untouched.
        let extractions = h
            .documents
            .get_extractions_by_source(&report.source_id)
            .await
            .expect("extractions");
        assert_eq!(extractions.len(), 1);
        assert_eq!(extractions[0].title, "Circuit Breaker");
        let ids = h
            .vector_store
            .list_ids_by_source(TENANT, &report.source_id)
            .await
            .expect("ids");
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn extraction_referencing_missing_chunk_is_rejected() {
        let h = harness().await;
        let coordinator = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );
        let report = coordinator
            .ingest_source(TENANT, sample_document())
            .await
            .expect("ingest");

        let mut draft = pattern_draft("Circuit Breaker");
        draft.chunk_index = 42;
        let err = coordinator
            .run_extractions(&report.source_id, vec![draft], ExtractionMode::Append)
            .await
            .expect_err("dangling chunk reference");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn reconcile_repairs_gaps_and_removes_orphans() {
        let h = harness().await;
        let coordinator = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );
        let report = coordinator
            .ingest_source(TENANT, sample_document())
            .await
            .expect("ingest");

        // Open a gap and plant an orphan.
        let missing_id = Chunk::deterministic_id(&report.source_id, 0);
        h.vector_store.delete(&missing_id).await.expect("delete");
        h.vector_store
            .upsert(VectorRecord::new(
                "orphan-1".into(),
                vec![0.0; DIM],
                VectorPayload {
                    tenant_id: TENANT.into(),
                    content_type: Some(ContentType::Chunk),
                    source_id: report.source_id.clone(),
                    chunk_id: Some("orphan-1".into()),
                    ..Default::default()
                },
            ))
            .await
            .expect("orphan");

        let outcome = coordinator
            .reconcile(&report.source_id)
            .await
            .expect("reconcile");
        assert_eq!(
            outcome,
            ReconcileReport {
                repaired: 1,
                removed: 1
            }
        );

        let ids = h
            .vector_store
            .list_ids_by_source(TENANT, &report.source_id)
            .await
            .expect("ids");
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&missing_id));

        // A second pass finds nothing to do.
        let outcome = coordinator
            .reconcile(&report.source_id)
            .await
            .expect("second reconcile");
        assert_eq!(outcome, ReconcileReport::default());
    }

    #[tokio::test]
    async fn delete_source_clears_both_stores() {
        let h = harness().await;
        let coordinator = coordinator(
            &h,
            Arc::new(SurrealVectorWriter::new(h.vector_store.clone())),
        );
        let report = coordinator
            .ingest_source(TENANT, sample_document())
            .await
            .expect("ingest");
        coordinator
            .run_extractions(
                &report.source_id,
                vec![pattern_draft("Circuit Breaker")],
                ExtractionMode::Replace,
            )
            .await
            .expect("extractions");

        coordinator
            .delete_source(&report.source_id)
            .await
            .expect("delete");

        assert!(matches!(
            h.documents.get_source(&report.source_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(h
            .vector_store
            .list_ids_by_source(TENANT, &report.source_id)
            .await
            .expect("ids")
            .is_empty());
    }
}
