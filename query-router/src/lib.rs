use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use common::{
    error::AppError,
    storage::{
        self,
        document::DocumentStoreClient,
        tenant::TenantIndexManager,
        types::{chunk::Chunk, extraction::Extraction},
        vector::{ContentType, ScoredPoint, SearchFilter, VectorStoreClient},
    },
    utils::embedding::EmbeddingProvider,
};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

/// Which tenants a search may see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TenantScope {
    /// The tenant configured as the deployment default.
    #[default]
    Configured,
    /// One explicit tenant.
    Tenant(String),
    /// No tenant predicate at all. Reserved for operator tooling.
    CrossTenant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_category: Option<String>,
    #[serde(default)]
    pub source_year: Option<i32>,
    #[serde(default)]
    pub extraction_type: Option<String>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub chapter: Option<String>,
    /// When false, extraction hits are answered from the vector payload
    /// alone (titles and position, no structured content), skipping the
    /// document-store join. Chunk hits always join for their text.
    #[serde(default = "default_hydrate")]
    pub hydrate: bool,
}

fn default_hydrate() -> bool {
    true
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: None,
            content_type: None,
            source_type: None,
            source_category: None,
            source_year: None,
            extraction_type: None,
            topics: None,
            chapter: None,
            hydrate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResultItem {
    pub id: String,
    pub score: f64,
    pub content_type: String,
    pub source_id: String,
    pub source_title: Option<String>,
    pub title: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchMetadata {
    pub query: String,
    pub sources_cited: Vec<String>,
    pub result_count: usize,
    pub search_type: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub metadata: SearchMetadata,
}

/// Routes a query to the vector store and hydrates hits from the
/// document store before returning the response envelope.
pub struct QueryRouter {
    documents: DocumentStoreClient,
    vectors: VectorStoreClient,
    embedder: Arc<EmbeddingProvider>,
    tenants: TenantIndexManager,
    default_tenant: String,
    document_timeout: Duration,
    vector_timeout: Duration,
}

impl QueryRouter {
    pub fn new(
        documents: DocumentStoreClient,
        vectors: VectorStoreClient,
        embedder: Arc<EmbeddingProvider>,
        tenants: TenantIndexManager,
        default_tenant: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            vectors,
            embedder,
            tenants,
            default_tenant: default_tenant.into(),
            document_timeout: Duration::from_secs(10),
            vector_timeout: Duration::from_secs(10),
        }
    }

    /// Override the per-store call timeouts.
    pub fn with_timeouts(mut self, document: Duration, vector: Duration) -> Self {
        self.document_timeout = document;
        self.vector_timeout = vector;
        self
    }

    #[tracing::instrument(skip_all, fields(query = %request.query))]
    pub async fn search(
        &self,
        scope: TenantScope,
        request: SearchRequest,
    ) -> Result<SearchResponse, AppError> {
        let started = Instant::now();

        if request.query.trim().is_empty() {
            return Err(AppError::Validation("query must not be empty".into()));
        }
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let tenant_id = match &scope {
            TenantScope::Configured => Some(self.default_tenant.clone()),
            TenantScope::Tenant(tenant) => Some(tenant.clone()),
            TenantScope::CrossTenant => None,
        };
        match &tenant_id {
            Some(tenant) => self.tenants.guard(tenant).await?,
            // Cross-tenant reads still wait for the deployment's indexes.
            None => self.tenants.guard(&self.default_tenant).await?,
        }

        let filter = build_filter(tenant_id, &request)?;
        let search_type = match filter.content_type {
            Some(ContentType::Chunk) => "chunks",
            Some(ContentType::Extraction) => "extractions",
            None => "mixed",
        };

        let embedding = self
            .embedder
            .embed(&request.query)
            .await
            .map_err(|err| AppError::Embedding(err.to_string()))?;
        let points = storage::timed("vector store", self.vector_timeout, async {
            self.vectors.search(&embedding, limit, &filter).await
        })
        .await?;

        let mut results = Vec::with_capacity(points.len());
        for point in points {
            match self.resolve(&point, request.hydrate).await? {
                Some(item) => results.push(item),
                // A hit without a backing document row is a sign the two
                // stores have drifted; skip it and leave a trace.
                None => warn!(
                    id = %point.id,
                    source_id = %point.payload.source_id,
                    "vector hit without document row; skipping (reconciliation candidate)"
                ),
            }
        }

        let mut sources_cited: Vec<String> = Vec::new();
        for item in &results {
            let cited = item
                .source_title
                .clone()
                .unwrap_or_else(|| item.source_id.clone());
            if !sources_cited.contains(&cited) {
                sources_cited.push(cited);
            }
        }

        let result_count = results.len();
        Ok(SearchResponse {
            results,
            metadata: SearchMetadata {
                query: request.query,
                sources_cited,
                result_count,
                search_type: search_type.to_owned(),
                latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
        })
    }

    async fn resolve(
        &self,
        point: &ScoredPoint,
        hydrate: bool,
    ) -> Result<Option<SearchResultItem>, AppError> {
        let payload = &point.payload;
        match payload.content_type {
            Some(ContentType::Chunk) => {
                let chunk: Option<Chunk> =
                    storage::timed("document store", self.document_timeout, async {
                        Ok(self.documents.db().get_item(&point.id).await?)
                    })
                    .await?;
                Ok(chunk.map(|chunk| SearchResultItem {
                    id: point.id.clone(),
                    score: point.score,
                    content_type: ContentType::Chunk.as_str().to_owned(),
                    source_id: payload.source_id.clone(),
                    source_title: payload.source_title.clone(),
                    title: None,
                    text: chunk.text,
                    extraction_type: None,
                    chapter: payload.chapter.clone(),
                    section: payload.section.clone(),
                    page: payload.page,
                }))
            }
            Some(ContentType::Extraction) if !hydrate => Ok(Some(SearchResultItem {
                id: point.id.clone(),
                score: point.score,
                content_type: ContentType::Extraction.as_str().to_owned(),
                source_id: payload.source_id.clone(),
                source_title: payload.source_title.clone(),
                title: payload.extraction_title.clone(),
                text: String::new(),
                extraction_type: payload.extraction_type.clone(),
                chapter: payload.chapter.clone(),
                section: None,
                page: None,
            })),
            Some(ContentType::Extraction) => {
                let extraction: Option<Extraction> =
                    storage::timed("document store", self.document_timeout, async {
                        Ok(self.documents.db().get_item(&point.id).await?)
                    })
                    .await?;
                Ok(extraction.map(|extraction| SearchResultItem {
                    id: point.id.clone(),
                    score: point.score,
                    content_type: ContentType::Extraction.as_str().to_owned(),
                    source_id: payload.source_id.clone(),
                    source_title: payload.source_title.clone(),
                    title: Some(extraction.title),
                    text: extraction.content.to_string(),
                    extraction_type: payload.extraction_type.clone(),
                    chapter: payload.chapter.clone(),
                    section: None,
                    page: None,
                }))
            }
            None => Ok(None),
        }
    }
}

fn build_filter(tenant_id: Option<String>, request: &SearchRequest) -> Result<SearchFilter, AppError> {
    let content_type = match request.content_type.as_deref() {
        None => None,
        Some("chunk") => Some(ContentType::Chunk),
        Some("extraction") => Some(ContentType::Extraction),
        Some(other) => {
            return Err(AppError::Validation(format!(
                "unknown content_type '{other}'; expected 'chunk' or 'extraction'"
            )))
        }
    };

    Ok(SearchFilter {
        tenant_id,
        content_type,
        source_id: None,
        source_type: request.source_type.clone(),
        source_category: request.source_category.clone(),
        source_year: request.source_year,
        source_tags: None,
        extraction_type: request.extraction_type.clone(),
        topics: request.topics.clone(),
        chapter: request.chapter.clone(),
    })
}
