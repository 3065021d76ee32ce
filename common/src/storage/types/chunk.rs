use crate::{schema, stored_object};

/// Location of a chunk within its source document. All coordinates are
/// optional; a plain-text source may carry only the byte offset.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ChunkPosition {
    pub chapter: Option<String>,
    pub section: Option<String>,
    pub page: Option<u32>,
    pub offset: Option<u64>,
}

stored_object!(Chunk, "chunk", {
    tenant_id: String,
    source_id: String,
    /// Zero-based position of this chunk within the source.
    chunk_index: u32,
    text: String,
    token_count: u32,
    position: ChunkPosition,
    schema_version: String
});

impl Chunk {
    pub fn new(
        tenant_id: String,
        source_id: &str,
        chunk_index: u32,
        text: String,
        token_count: u32,
        position: ChunkPosition,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::deterministic_id(source_id, chunk_index),
            created_at: now,
            updated_at: now,
            tenant_id,
            source_id: source_id.to_owned(),
            chunk_index,
            text,
            token_count,
            position,
            schema_version: schema::current_version(schema::Entity::Chunk).to_owned(),
        }
    }

    /// Chunk ids are derived from the source and index so that re-ingesting
    /// a source overwrites its chunks instead of duplicating them.
    pub fn deterministic_id(source_id: &str, chunk_index: u32) -> String {
        format!("{source_id}-{chunk_index}")
    }
}
