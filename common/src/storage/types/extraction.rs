use uuid::Uuid;

use crate::{
    schema, stored_object,
    storage::types::{chunk::Chunk, source::Source},
};

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
pub enum ExtractionType {
    Decision,
    Pattern,
    Warning,
    Methodology,
    Checklist,
    Persona,
    Workflow,
}

impl ExtractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionType::Decision => "decision",
            ExtractionType::Pattern => "pattern",
            ExtractionType::Warning => "warning",
            ExtractionType::Methodology => "methodology",
            ExtractionType::Checklist => "checklist",
            ExtractionType::Persona => "persona",
            ExtractionType::Workflow => "workflow",
        }
    }

    pub fn variants() -> &'static [ExtractionType] {
        &[
            ExtractionType::Decision,
            ExtractionType::Pattern,
            ExtractionType::Warning,
            ExtractionType::Methodology,
            ExtractionType::Checklist,
            ExtractionType::Persona,
            ExtractionType::Workflow,
        ]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "decision" => Some(ExtractionType::Decision),
            "pattern" => Some(ExtractionType::Pattern),
            "warning" => Some(ExtractionType::Warning),
            "methodology" => Some(ExtractionType::Methodology),
            "checklist" => Some(ExtractionType::Checklist),
            "persona" => Some(ExtractionType::Persona),
            "workflow" => Some(ExtractionType::Workflow),
            _ => None,
        }
    }
}

stored_object!(Extraction, "extraction", {
    tenant_id: String,
    source_id: String,
    /// The chunk this extraction was derived from.
    chunk_id: String,
    extraction_type: ExtractionType,
    title: String,
    /// Structured content whose required fields depend on the extraction
    /// type and are checked against the schema registry before storage.
    content: serde_json::Value,
    topics: Vec<String>,
    /// Extractor confidence in [0, 1].
    confidence: f32,
    /// Denormalized from the owning source and chunk for display without
    /// a join.
    source_title: String,
    source_type: String,
    chapter: Option<String>,
    schema_version: String
});

impl Extraction {
    pub fn new(
        source: &Source,
        chunk: &Chunk,
        extraction_type: ExtractionType,
        title: String,
        content: serde_json::Value,
        topics: Vec<String>,
        confidence: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            tenant_id: source.tenant_id.clone(),
            source_id: source.id.clone(),
            chunk_id: chunk.id.clone(),
            extraction_type,
            title,
            content,
            topics,
            confidence,
            source_title: source.title.clone(),
            source_type: source.source_type.as_str().to_owned(),
            chapter: chunk.position.chapter.clone(),
            schema_version: schema::current_version(schema::Entity::Extraction).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_type_parses_all_variants() {
        for variant in ExtractionType::variants() {
            assert_eq!(ExtractionType::parse(variant.as_str()), Some(*variant));
        }
        assert_eq!(ExtractionType::parse("DECISION"), Some(ExtractionType::Decision));
        assert_eq!(ExtractionType::parse("recipe"), None);
    }
}
