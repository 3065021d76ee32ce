use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::{
    error::AppError,
    storage::types::{
        chunk::ChunkPosition,
        extraction::ExtractionType,
        source::{SourceCategory, SourceType},
    },
};
use ingestion_pipeline::{
    chunk_text, ChunkDraft, ExtractionDraft, ExtractionMode, ParsedDocument, SourceMeta,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct IngressChunk {
    pub text: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct IngressExtraction {
    pub extraction_type: String,
    pub title: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct IngressRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub source_type: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub origin_path: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Raw text, chunked server-side. Ignored when `chunks` are given.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub chunks: Option<Vec<IngressChunk>>,
    #[serde(default)]
    pub extractions: Vec<IngressExtraction>,
    #[serde(default)]
    pub append_extractions: bool,
}

fn chunk_drafts(input: &IngressRequest, max_tokens: usize) -> Result<Vec<ChunkDraft>, AppError> {
    if let Some(chunks) = &input.chunks {
        return Ok(chunks
            .iter()
            .map(|chunk| ChunkDraft {
                text: chunk.text.clone(),
                token_count: chunk.text.split_whitespace().count() as u32,
                position: ChunkPosition {
                    chapter: chunk.chapter.clone(),
                    section: chunk.section.clone(),
                    page: chunk.page,
                    offset: None,
                },
            })
            .collect());
    }
    match &input.text {
        Some(text) if !text.trim().is_empty() => Ok(chunk_text(text, max_tokens)),
        _ => Err(AppError::Validation(
            "request must carry either 'text' or 'chunks'".into(),
        )),
    }
}

fn extraction_drafts(input: &IngressRequest) -> Result<Vec<ExtractionDraft>, AppError> {
    input
        .extractions
        .iter()
        .map(|extraction| {
            let extraction_type = ExtractionType::parse(&extraction.extraction_type)
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "unknown extraction_type '{}'",
                        extraction.extraction_type
                    ))
                })?;
            Ok(ExtractionDraft {
                extraction_type,
                title: extraction.title.clone(),
                content: extraction.content.clone(),
                topics: extraction.topics.clone(),
                chunk_index: extraction.chunk_index,
                confidence: extraction.confidence,
            })
        })
        .collect()
}

pub async fn ingest_data(
    State(state): State<ApiState>,
    Json(input): Json<IngressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = input
        .tenant_id
        .clone()
        .unwrap_or_else(|| state.config.default_tenant.clone());

    info!(
        tenant_id = %tenant_id,
        title = %input.title,
        inline_chunks = input.chunks.as_ref().map_or(0, Vec::len),
        extraction_count = input.extractions.len(),
        "Received ingestion request"
    );

    let chunks = chunk_drafts(&input, state.coordinator.chunk_max_tokens())?;
    let extractions = extraction_drafts(&input)?;
    let mode = if input.append_extractions {
        ExtractionMode::Append
    } else {
        ExtractionMode::Replace
    };

    let document = ParsedDocument {
        meta: SourceMeta {
            source_type: SourceType::from(input.source_type),
            title: input.title,
            authors: input.authors,
            origin_path: input.origin_path.unwrap_or_default(),
            category: input
                .category
                .map(SourceCategory::from)
                .unwrap_or(SourceCategory::General),
            tags: input.tags,
            year: input.year,
            metadata: input.metadata,
        },
        chunks,
    };

    let report = state.coordinator.ingest_source(&tenant_id, document).await?;
    let extractions_written = if extractions.is_empty() {
        0
    } else {
        state
            .coordinator
            .run_extractions(&report.source_id, extractions, mode)
            .await?
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "source_id": report.source_id,
            "chunks_written": report.chunks_written,
            "vectors_written": report.vectors_written,
            "extractions_written": extractions_written,
        })),
    ))
}

pub async fn delete_source(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.delete_source(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reconcile_source(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.coordinator.reconcile(&id).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "repaired": report.repaired,
            "removed": report.removed,
        })),
    ))
}
