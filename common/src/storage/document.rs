use async_stream::try_stream;
use futures::Stream;
use serde_json::Value;
use tracing::info;

use crate::{
    error::AppError,
    schema,
    storage::{
        db::SurrealDbClient,
        types::{
            chunk::Chunk,
            extraction::{Extraction, ExtractionType},
            source::{Source, SourceStatus},
        },
    },
};

const EXTRACTION_PAGE_SIZE: usize = 100;

#[derive(Clone, Copy)]
struct IndexSpec {
    index_name: &'static str,
    table: &'static str,
    fields: &'static str,
}

impl IndexSpec {
    fn definition(&self) -> String {
        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {fields};",
            index = self.index_name,
            table = self.table,
            fields = self.fields,
        )
    }
}

const fn document_index_specs() -> [IndexSpec; 6] {
    [
        IndexSpec {
            index_name: "idx_source_tenant",
            table: "source",
            fields: "tenant_id",
        },
        IndexSpec {
            index_name: "idx_source_status",
            table: "source",
            fields: "status",
        },
        IndexSpec {
            index_name: "idx_chunk_source",
            table: "chunk",
            fields: "source_id",
        },
        IndexSpec {
            index_name: "idx_chunk_tenant",
            table: "chunk",
            fields: "tenant_id",
        },
        IndexSpec {
            index_name: "idx_extraction_source",
            table: "extraction",
            fields: "tenant_id, source_id",
        },
        // Compound index backing the extraction listing query.
        IndexSpec {
            index_name: "idx_extraction_tenant_type",
            table: "extraction",
            fields: "tenant_id, extraction_type, topics",
        },
    ]
}

/// Filters for listing extractions. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ExtractionFilter {
    pub source_id: Option<String>,
    pub extraction_type: Option<ExtractionType>,
    /// Matches extractions carrying at least one of these topics.
    pub topics: Option<Vec<String>>,
}

/// Client for the document store: sources, chunks and extractions on
/// their own SurrealDB connection.
#[derive(Clone)]
pub struct DocumentStoreClient {
    db: SurrealDbClient,
}

impl DocumentStoreClient {
    pub fn new(db: SurrealDbClient) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &SurrealDbClient {
        &self.db
    }

    /// Define the document store indexes. Idempotent, and fails fast when
    /// an index name is already taken by a conflicting definition.
    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        for spec in document_index_specs() {
            self.check_index_compat(&spec).await?;
            let res = self.db.query(spec.definition()).await?;
            res.check()?;
        }
        info!("Document store indexes are in place");
        Ok(())
    }

    async fn check_index_compat(&self, spec: &IndexSpec) -> Result<(), AppError> {
        let info_query = format!("INFO FOR TABLE {table};", table = spec.table);
        let mut response = self.db.query(info_query).await?;

        let info: surrealdb::Value = response.take(0)?;
        let info_json: Value = serde_json::to_value(info)
            .map_err(|err| AppError::internal(format!("parsing table info: {err}")))?;

        let Some(definition) = info_json
            .get("Object")
            .and_then(|o| o.get("indexes"))
            .and_then(|i| i.get("Object"))
            .and_then(|i| i.as_object())
            .and_then(|indexes| indexes.get(spec.index_name))
            .and_then(|details| details.get("Strand"))
            .and_then(|v| v.as_str())
        else {
            return Ok(());
        };

        let first_field = spec
            .fields
            .split(',')
            .next()
            .unwrap_or(spec.fields)
            .trim();
        if definition.contains("HNSW") || !definition.contains(first_field) {
            return Err(AppError::internal(format!(
                "index {} on {} already exists with a conflicting definition: {definition}",
                spec.index_name, spec.table
            )));
        }
        Ok(())
    }

    // Sources

    pub async fn create_source(&self, source: Source) -> Result<Source, AppError> {
        schema::validate_source(&source)?;
        let stored = self.db.store_item(source.clone()).await?;
        Ok(stored.unwrap_or(source))
    }

    pub async fn get_source(&self, id: &str) -> Result<Source, AppError> {
        self.db
            .get_item::<Source>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("source {id}")))
    }

    pub async fn list_sources(&self, tenant_id: &str) -> Result<Vec<Source>, AppError> {
        let mut response = self
            .db
            .query("SELECT * FROM source WHERE tenant_id = $tenant_id ORDER BY created_at")
            .bind(("tenant_id", tenant_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Move a source through its lifecycle, rejecting illegal transitions.
    pub async fn update_source_status(
        &self,
        id: &str,
        target: SourceStatus,
    ) -> Result<Source, AppError> {
        let mut source = self.get_source(id).await?;
        source.status = source.next_status(target)?;
        source.updated_at = chrono::Utc::now();
        let updated = self.db.upsert_item(source.clone()).await?;
        Ok(updated.unwrap_or(source))
    }

    // Chunks

    /// Replace a source's chunks in one transaction. Either the whole new
    /// set lands or nothing changes.
    pub async fn replace_chunks(
        &self,
        source_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<usize, AppError> {
        for chunk in &chunks {
            if chunk.source_id != source_id {
                return Err(AppError::Validation(format!(
                    "chunk {} does not belong to source {source_id}",
                    chunk.id
                )));
            }
        }
        let count = chunks.len();

        let response = self
            .db
            .query(
                "BEGIN TRANSACTION;
                 DELETE chunk WHERE source_id = $source_id;
                 INSERT INTO chunk $chunks;
                 COMMIT TRANSACTION;",
            )
            .bind(("source_id", source_id.to_owned()))
            .bind(("chunks", chunks))
            .await?;
        response.check()?;
        Ok(count)
    }

    pub async fn get_chunks_by_source(&self, source_id: &str) -> Result<Vec<Chunk>, AppError> {
        let mut response = self
            .db
            .query("SELECT * FROM chunk WHERE source_id = $source_id ORDER BY chunk_index")
            .bind(("source_id", source_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get_chunk(&self, id: &str) -> Result<Chunk, AppError> {
        self.db
            .get_item::<Chunk>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chunk {id}")))
    }

    // Extractions

    pub async fn create_extraction(&self, extraction: Extraction) -> Result<Extraction, AppError> {
        schema::validate_extraction(&extraction)?;
        let stored = self.db.upsert_item(extraction.clone()).await?;
        Ok(stored.unwrap_or(extraction))
    }

    pub async fn get_extraction(&self, id: &str) -> Result<Extraction, AppError> {
        self.db
            .get_item::<Extraction>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("extraction {id}")))
    }

    pub async fn get_extractions_by_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<Extraction>, AppError> {
        let mut response = self
            .db
            .query("SELECT * FROM extraction WHERE source_id = $source_id ORDER BY created_at")
            .bind(("source_id", source_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn delete_extractions_by_source(&self, source_id: &str) -> Result<(), AppError> {
        let response = self
            .db
            .query("DELETE extraction WHERE source_id = $source_id")
            .bind(("source_id", source_id.to_owned()))
            .await?;
        response.check()?;
        Ok(())
    }

    /// Stream a tenant's extractions page by page so large result sets do
    /// not have to fit in memory at once.
    pub fn query_extractions(
        &self,
        tenant_id: String,
        filter: ExtractionFilter,
    ) -> impl Stream<Item = Result<Extraction, AppError>> + '_ {
        try_stream! {
            let mut start = 0usize;
            loop {
                let mut response = self
                    .db
                    .query(
                        "SELECT * FROM extraction \
                         WHERE tenant_id = $tenant_id \
                           AND ($source_id IS NONE OR source_id = $source_id) \
                           AND ($extraction_type IS NONE OR extraction_type = $extraction_type) \
                           AND ($topics IS NONE OR topics CONTAINSANY $topics) \
                         ORDER BY created_at, id \
                         LIMIT $limit START $start",
                    )
                    .bind(("tenant_id", tenant_id.clone()))
                    .bind(("source_id", filter.source_id.clone()))
                    .bind(("extraction_type", filter.extraction_type))
                    .bind(("topics", filter.topics.clone()))
                    .bind(("limit", EXTRACTION_PAGE_SIZE))
                    .bind(("start", start))
                    .await?;

                let page: Vec<Extraction> = response.take(0)?;
                let page_len = page.len();
                for extraction in page {
                    yield extraction;
                }
                if page_len < EXTRACTION_PAGE_SIZE {
                    break;
                }
                start += EXTRACTION_PAGE_SIZE;
            }
        }
    }

    /// Delete a source together with its chunks and extractions in one
    /// transaction.
    pub async fn delete_source_cascade(&self, source_id: &str) -> Result<(), AppError> {
        // Surface NotFound before mutating anything.
        self.get_source(source_id).await?;

        let response = self
            .db
            .query(
                "BEGIN TRANSACTION;
                 DELETE chunk WHERE source_id = $source_id;
                 DELETE extraction WHERE source_id = $source_id;
                 DELETE type::thing('source', $source_id);
                 COMMIT TRANSACTION;",
            )
            .bind(("source_id", source_id.to_owned()))
            .await?;
        response.check()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{
        chunk::ChunkPosition,
        source::{SourceCategory, SourceType},
    };
    use futures::TryStreamExt;
    use serde_json::json;
    use uuid::Uuid;

    async fn test_store() -> DocumentStoreClient {
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("doc_test_ns", &database)
            .await
            .expect("in-memory surrealdb");
        let store = DocumentStoreClient::new(db);
        store.ensure_indexes().await.expect("indexes");
        store
    }

    fn sample_source(tenant: &str) -> Source {
        Source::new(
            tenant.to_owned(),
            SourceType::Book,
            "Domain Modeling".into(),
            vec!["An Author".into()],
            "/books/domain-modeling.pdf".into(),
            None,
            SourceCategory::Engineering,
            vec!["ddd".into()],
            Some(2020),
        )
    }

    fn sample_chunks(source: &Source, n: u32) -> Vec<Chunk> {
        (0..n)
            .map(|i| {
                Chunk::new(
                    source.tenant_id.clone(),
                    &source.id,
                    i,
                    format!("chunk text {i}"),
                    3,
                    ChunkPosition {
                        chapter: Some("1".into()),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    fn sample_extraction(source: &Source) -> Extraction {
        let chunk = &sample_chunks(source, 1)[0];
        Extraction::new(
            source,
            chunk,
            ExtractionType::Pattern,
            "Strangler Fig".into(),
            json!({
                "name": "Strangler Fig",
                "problem": "Risky big-bang rewrites",
                "solution": "Route traffic incrementally to the new system"
            }),
            vec!["migration".into()],
            0.9,
        )
    }

    #[tokio::test]
    async fn source_lifecycle_is_enforced_on_update() {
        let store = test_store().await;
        let source = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source");

        let processing = store
            .update_source_status(&source.id, SourceStatus::Processing)
            .await
            .expect("begin processing");
        assert_eq!(processing.status, SourceStatus::Processing);

        // Pending -> Complete is not a legal move.
        let other = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source");
        let err = store
            .update_source_status(&other.id, SourceStatus::Complete)
            .await
            .expect_err("illegal transition");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn replace_chunks_is_atomic_and_idempotent() {
        let store = test_store().await;
        let source = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source");

        let chunks = sample_chunks(&source, 3);
        let written = store
            .replace_chunks(&source.id, chunks.clone())
            .await
            .expect("first write");
        assert_eq!(written, 3);

        // Re-running with a smaller set replaces the old one.
        let written = store
            .replace_chunks(&source.id, sample_chunks(&source, 2))
            .await
            .expect("second write");
        assert_eq!(written, 2);

        let stored = store
            .get_chunks_by_source(&source.id)
            .await
            .expect("list chunks");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].chunk_index, 0);
        assert_eq!(stored[1].chunk_index, 1);
    }

    #[tokio::test]
    async fn replace_chunks_rejects_foreign_chunks() {
        let store = test_store().await;
        let source = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source");
        let other = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source");

        let err = store
            .replace_chunks(&source.id, sample_chunks(&other, 1))
            .await
            .expect_err("foreign chunk");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn invalid_extraction_content_is_rejected() {
        let store = test_store().await;
        let source = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source");

        let mut extraction = sample_extraction(&source);
        extraction.content = json!({"name": "missing the rest"});
        let err = store
            .create_extraction(extraction)
            .await
            .expect_err("invalid content");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn query_extractions_filters_by_tenant_and_type() {
        let store = test_store().await;
        let source_a = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source a");
        let source_b = store
            .create_source(sample_source("tenant-b"))
            .await
            .expect("create source b");

        store
            .create_extraction(sample_extraction(&source_a))
            .await
            .expect("extraction a");
        store
            .create_extraction(sample_extraction(&source_b))
            .await
            .expect("extraction b");

        let results: Vec<Extraction> = store
            .query_extractions(
                "tenant-a".into(),
                ExtractionFilter {
                    extraction_type: Some(ExtractionType::Pattern),
                    ..Default::default()
                },
            )
            .try_collect()
            .await
            .expect("stream collects");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tenant_id, "tenant-a");

        let none: Vec<Extraction> = store
            .query_extractions(
                "tenant-a".into(),
                ExtractionFilter {
                    extraction_type: Some(ExtractionType::Warning),
                    ..Default::default()
                },
            )
            .try_collect()
            .await
            .expect("stream collects");
        assert!(none.is_empty());

        let by_topic: Vec<Extraction> = store
            .query_extractions(
                "tenant-a".into(),
                ExtractionFilter {
                    topics: Some(vec!["migration".into(), "unrelated".into()]),
                    ..Default::default()
                },
            )
            .try_collect()
            .await
            .expect("stream collects");
        assert_eq!(by_topic.len(), 1);

        let no_topic: Vec<Extraction> = store
            .query_extractions(
                "tenant-a".into(),
                ExtractionFilter {
                    topics: Some(vec!["unrelated".into()]),
                    ..Default::default()
                },
            )
            .try_collect()
            .await
            .expect("stream collects");
        assert!(no_topic.is_empty());
    }

    #[tokio::test]
    async fn delete_source_cascade_removes_children() {
        let store = test_store().await;
        let source = store
            .create_source(sample_source("tenant-a"))
            .await
            .expect("create source");
        store
            .replace_chunks(&source.id, sample_chunks(&source, 2))
            .await
            .expect("chunks");
        store
            .create_extraction(sample_extraction(&source))
            .await
            .expect("extraction");

        store
            .delete_source_cascade(&source.id)
            .await
            .expect("cascade delete");

        assert!(matches!(
            store.get_source(&source.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(store
            .get_chunks_by_source(&source.id)
            .await
            .expect("chunks query")
            .is_empty());
        assert!(store
            .get_extractions_by_source(&source.id)
            .await
            .expect("extractions query")
            .is_empty());
    }

    #[tokio::test]
    async fn delete_missing_source_is_not_found() {
        let store = test_store().await;
        assert!(matches!(
            store.delete_source_cascade("nope").await,
            Err(AppError::NotFound(_))
        ));
    }
}
