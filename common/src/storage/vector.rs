use serde_json::Value;
use tracing::info;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

pub const VECTOR_TABLE: &str = "vector_record";
const HNSW_INDEX_NAME: &str = "idx_vector_record_embedding";
const KNN_EF: usize = 40;

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Chunk,
    Extraction,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Chunk => "chunk",
            ContentType::Extraction => "extraction",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl DistanceMetric {
    fn as_surreal(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "COSINE",
            DistanceMetric::Euclidean => "EUCLIDEAN",
        }
    }

    /// Map a raw distance to a similarity where higher is closer and an
    /// exact match scores 1.0. Cosine similarity is `1 - distance`;
    /// euclidean distance is unbounded, so it is squashed into (0, 1].
    fn similarity(&self, distance: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::Euclidean => 1.0 / (1.0 + distance),
        }
    }
}

/// Metadata carried with every vector. The first group of fields is
/// indexed and filterable; the rest exist only for display after a hit.
/// Rows written before a field existed deserialize with its default.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorPayload {
    pub tenant_id: String,
    pub content_type: Option<ContentType>,
    pub source_id: String,
    pub source_type: Option<String>,
    pub source_category: Option<String>,
    pub source_year: Option<i32>,
    pub source_tags: Vec<String>,
    pub extraction_type: Option<String>,
    pub topics: Vec<String>,
    pub chapter: Option<String>,
    // Display-only fields.
    pub chunk_id: Option<String>,
    pub extraction_id: Option<String>,
    pub source_title: Option<String>,
    pub extraction_title: Option<String>,
    pub section: Option<String>,
    pub page: Option<u32>,
}

stored_object!(VectorRecord, VECTOR_TABLE, {
    embedding: Vec<f32>,
    payload: VectorPayload
});

impl VectorRecord {
    pub fn new(id: String, embedding: Vec<f32>, payload: VectorPayload) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            embedding,
            payload,
        }
    }
}

/// Filter predicates for a vector search. `None` fields match everything;
/// omitting `tenant_id` makes the search cross-tenant.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub tenant_id: Option<String>,
    pub content_type: Option<ContentType>,
    pub source_id: Option<String>,
    pub source_type: Option<String>,
    pub source_category: Option<String>,
    pub source_year: Option<i32>,
    /// Matches records whose source shares at least one tag.
    pub source_tags: Option<Vec<String>>,
    pub extraction_type: Option<String>,
    /// Matches records sharing at least one topic.
    pub topics: Option<Vec<String>>,
    pub chapter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: VectorPayload,
}

#[derive(Debug, serde::Deserialize)]
struct ScoredRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    payload: VectorPayload,
    distance: f64,
}

/// Client for the vector store: one shared embedding table on its own
/// SurrealDB connection, partitioned by payload filters.
#[derive(Clone)]
pub struct VectorStoreClient {
    db: SurrealDbClient,
    dimension: usize,
    metric: DistanceMetric,
}

impl VectorStoreClient {
    pub fn new(db: SurrealDbClient, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            db,
            dimension,
            metric,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Define the HNSW index over the embedding field. Idempotent, and
    /// rebuilds the index when the configured dimension or distance
    /// metric has changed.
    pub async fn ensure_collection(&self) -> Result<(), AppError> {
        let verb = match self.existing_hnsw_definition().await? {
            Some(existing)
                if extract_dimension(&existing) != Some(self.dimension as u64)
                    || !existing.contains(self.metric.as_surreal()) =>
            {
                info!(
                    existing = %existing,
                    target_dimension = self.dimension,
                    target_metric = self.metric.as_surreal(),
                    "Overwriting HNSW index to match the configured definition"
                );
                "OVERWRITE"
            }
            _ => "IF NOT EXISTS",
        };
        let definition = format!(
            "DEFINE INDEX {verb} {HNSW_INDEX_NAME} ON TABLE {VECTOR_TABLE} \
             FIELDS embedding HNSW DIMENSION {dim} DIST {metric} TYPE F32 EFC 100 M 8;",
            dim = self.dimension,
            metric = self.metric.as_surreal(),
        );

        let res = self.db.query(definition).await?;
        res.check()?;
        Ok(())
    }

    async fn existing_hnsw_definition(&self) -> Result<Option<String>, AppError> {
        let mut response = self
            .db
            .query(format!("INFO FOR TABLE {VECTOR_TABLE};"))
            .await?;
        let info: surrealdb::Value = response.take(0)?;
        let info_json: Value = serde_json::to_value(info)
            .map_err(|err| AppError::internal(format!("parsing table info: {err}")))?;

        let definition = info_json
            .get("Object")
            .and_then(|o| o.get("indexes"))
            .and_then(|i| i.get("Object"))
            .and_then(|i| i.as_object())
            .and_then(|indexes| indexes.get(HNSW_INDEX_NAME))
            .and_then(|details| details.get("Strand"))
            .and_then(|v| v.as_str());

        Ok(definition.map(str::to_owned))
    }

    /// Define the payload filter indexes. The tenant index comes first so
    /// tenant-scoped queries stay selective on a shared table.
    pub async fn ensure_tenant_indexes(&self) -> Result<(), AppError> {
        let fields = [
            ("idx_vector_tenant", "payload.tenant_id"),
            ("idx_vector_content_type", "payload.content_type"),
            ("idx_vector_source", "payload.source_id"),
            ("idx_vector_source_type", "payload.source_type"),
            ("idx_vector_source_category", "payload.source_category"),
            ("idx_vector_source_year", "payload.source_year"),
            ("idx_vector_source_tags", "payload.source_tags"),
            ("idx_vector_extraction_type", "payload.extraction_type"),
            ("idx_vector_topics", "payload.topics"),
            ("idx_vector_chapter", "payload.chapter"),
        ];
        for (name, field) in fields {
            let res = self
                .db
                .query(format!(
                    "DEFINE INDEX IF NOT EXISTS {name} ON TABLE {VECTOR_TABLE} FIELDS {field};"
                ))
                .await?;
            res.check()?;
        }
        Ok(())
    }

    fn validate(&self, record: &VectorRecord) -> Result<(), AppError> {
        if record.embedding.len() != self.dimension {
            return Err(AppError::VectorDimension {
                expected: self.dimension,
                actual: record.embedding.len(),
            });
        }
        if record.payload.tenant_id.trim().is_empty() {
            return Err(AppError::Validation(
                "vector payload tenant_id must not be empty".into(),
            ));
        }
        match record.payload.content_type {
            Some(ContentType::Chunk) if record.payload.chunk_id.is_none() => {
                Err(AppError::Validation(
                    "chunk vector payload must carry chunk_id".into(),
                ))
            }
            Some(ContentType::Extraction) if record.payload.extraction_id.is_none() => {
                Err(AppError::Validation(
                    "extraction vector payload must carry extraction_id".into(),
                ))
            }
            None => Err(AppError::Validation(
                "vector payload must carry content_type".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Write a vector record, replacing any existing record with the same
    /// id. Record ids mirror document store ids so re-ingestion converges.
    pub async fn upsert(&self, record: VectorRecord) -> Result<(), AppError> {
        self.validate(&record)?;
        let _up: Option<VectorRecord> = self
            .db
            .upsert((VECTOR_TABLE, record.id.clone()))
            .content(record)
            .await?;
        Ok(())
    }

    pub async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<usize, AppError> {
        let count = records.len();
        for record in records {
            self.upsert(record).await?;
        }
        Ok(count)
    }

    pub async fn get(&self, id: &str) -> Result<Option<VectorRecord>, AppError> {
        Ok(self.db.select((VECTOR_TABLE, id)).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let _gone: Option<VectorRecord> = self.db.delete((VECTOR_TABLE, id)).await?;
        Ok(())
    }

    /// KNN search over the shared table. Filters narrow the candidate set
    /// before the vector comparison; without a tenant filter the search
    /// spans all tenants.
    pub async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredPoint>, AppError> {
        if vector.len() != self.dimension {
            return Err(AppError::VectorDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<(&'static str, Value)> = Vec::new();

        if let Some(tenant_id) = &filter.tenant_id {
            conditions.push("payload.tenant_id = $tenant_id".into());
            binds.push(("tenant_id", tenant_id.clone().into()));
        }
        if let Some(content_type) = filter.content_type {
            conditions.push("payload.content_type = $content_type".into());
            binds.push(("content_type", content_type.as_str().into()));
        }
        if let Some(source_id) = &filter.source_id {
            conditions.push("payload.source_id = $source_id".into());
            binds.push(("source_id", source_id.clone().into()));
        }
        if let Some(source_type) = &filter.source_type {
            conditions.push("payload.source_type = $source_type".into());
            binds.push(("source_type", source_type.clone().into()));
        }
        if let Some(source_category) = &filter.source_category {
            conditions.push("payload.source_category = $source_category".into());
            binds.push(("source_category", source_category.clone().into()));
        }
        if let Some(source_year) = filter.source_year {
            conditions.push("payload.source_year = $source_year".into());
            binds.push(("source_year", i64::from(source_year).into()));
        }
        if let Some(source_tags) = &filter.source_tags {
            conditions.push("payload.source_tags CONTAINSANY $source_tags".into());
            binds.push(("source_tags", source_tags.clone().into()));
        }
        if let Some(extraction_type) = &filter.extraction_type {
            conditions.push("payload.extraction_type = $extraction_type".into());
            binds.push(("extraction_type", extraction_type.clone().into()));
        }
        if let Some(topics) = &filter.topics {
            conditions.push("payload.topics CONTAINSANY $topics".into());
            binds.push(("topics", topics.clone().into()));
        }
        if let Some(chapter) = &filter.chapter {
            conditions.push("payload.chapter = $chapter".into());
            binds.push(("chapter", chapter.clone().into()));
        }

        let filter_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("{} AND ", conditions.join(" AND "))
        };
        // The KNN operator needs the vector inline; everything else is bound.
        let query_string = format!(
            "SELECT *, vector::distance::knn() AS distance FROM {VECTOR_TABLE} \
             WHERE {filter_clause}embedding <|{k},{KNN_EF}|> {vector:?} \
             ORDER BY distance"
        );

        let mut request = self.db.query(query_string);
        for (name, value) in binds {
            request = request.bind((name, value));
        }
        let mut response = request.await?;
        let rows: Vec<ScoredRow> = response.take(0)?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredPoint {
                id: row.id,
                score: self.metric.similarity(row.distance),
                payload: row.payload,
            })
            .collect())
    }

    /// Remove every vector belonging to a source.
    pub async fn delete_by_source(
        &self,
        tenant_id: &str,
        source_id: &str,
    ) -> Result<(), AppError> {
        let response = self
            .db
            .query(format!(
                "DELETE {VECTOR_TABLE} \
                 WHERE payload.tenant_id = $tenant_id AND payload.source_id = $source_id"
            ))
            .bind(("tenant_id", tenant_id.to_owned()))
            .bind(("source_id", source_id.to_owned()))
            .await?;
        response.check()?;
        Ok(())
    }

    pub async fn list_ids_by_source(
        &self,
        tenant_id: &str,
        source_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS id FROM {VECTOR_TABLE} \
                 WHERE payload.tenant_id = $tenant_id AND payload.source_id = $source_id"
            ))
            .bind(("tenant_id", tenant_id.to_owned()))
            .bind(("source_id", source_id.to_owned()))
            .await?;
        let rows: Vec<IdRow> = response.take(0)?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }
}

#[derive(Debug, serde::Deserialize)]
struct IdRow {
    id: String,
}

fn extract_dimension(definition: &str) -> Option<u64> {
    definition
        .split("DIMENSION")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|token| token.trim_end_matches(';').parse::<u64>().ok())
}
