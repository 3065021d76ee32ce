use common::storage::types::{
    chunk::ChunkPosition,
    extraction::ExtractionType,
    source::{SourceCategory, SourceType},
};

/// Source-level metadata accompanying a document handed to the
/// coordinator.
#[derive(Debug, Clone)]
pub struct SourceMeta {
    pub source_type: SourceType,
    pub title: String,
    pub authors: Vec<String>,
    pub origin_path: String,
    pub category: SourceCategory,
    pub tags: Vec<String>,
    pub year: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// One chunk of a parsed document, not yet persisted.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub text: String,
    pub token_count: u32,
    pub position: ChunkPosition,
}

/// A parsed document ready for ingestion: metadata plus ordered chunks.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub meta: SourceMeta,
    pub chunks: Vec<ChunkDraft>,
}

/// A structured extraction not yet persisted. `chunk_index` refers to a
/// position in the source's chunk list.
#[derive(Debug, Clone)]
pub struct ExtractionDraft {
    pub extraction_type: ExtractionType,
    pub title: String,
    pub content: serde_json::Value,
    pub topics: Vec<String>,
    pub chunk_index: u32,
    pub confidence: f32,
}

/// How new extractions relate to existing ones for the same source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Drop the source's existing extractions first.
    #[default]
    Replace,
    /// Keep existing extractions and add the new ones.
    Append,
}
