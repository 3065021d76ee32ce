//! Schema registry for stored records and structured extraction content.
//!
//! The registry is pure data plus validation functions; nothing in here
//! touches storage. Version bumps happen here first, then the migration
//! tool brings existing rows forward.

use serde_json::Value;

use crate::{
    error::AppError,
    storage::types::{
        extraction::{Extraction, ExtractionType},
        source::Source,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Source,
    Chunk,
    Extraction,
}

/// Current schema version written to new records.
pub fn current_version(entity: Entity) -> &'static str {
    match entity {
        Entity::Source | Entity::Chunk | Entity::Extraction => "2",
    }
}

/// Oldest version the migration tool still knows how to read.
pub fn legacy_version(entity: Entity) -> &'static str {
    match entity {
        Entity::Source | Entity::Chunk | Entity::Extraction => "1",
    }
}

pub fn is_supported_version(entity: Entity, version: &str) -> bool {
    version == current_version(entity) || version == legacy_version(entity)
}

/// Fields that must be present and non-empty in an extraction's content
/// object, keyed by extraction type.
pub fn required_fields(extraction_type: ExtractionType) -> &'static [&'static str] {
    match extraction_type {
        ExtractionType::Decision => &["situation", "options", "rationale", "outcome"],
        ExtractionType::Pattern => &["name", "problem", "solution"],
        ExtractionType::Warning => &["risk", "context", "mitigation"],
        ExtractionType::Methodology => &["name", "steps"],
        ExtractionType::Checklist => &["name", "items"],
        ExtractionType::Persona => &["name", "role", "traits"],
        ExtractionType::Workflow => &["name", "stages"],
    }
}

fn field_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Check an extraction's content object against the required fields for
/// its type. Extra fields are allowed; missing or empty required fields
/// are not.
pub fn validate_extraction_content(
    extraction_type: ExtractionType,
    content: &Value,
) -> Result<(), AppError> {
    let Some(object) = content.as_object() else {
        return Err(AppError::Validation(format!(
            "extraction content for '{}' must be a JSON object",
            extraction_type.as_str()
        )));
    };

    let missing: Vec<&str> = required_fields(extraction_type)
        .iter()
        .filter(|field| {
            object.get(**field).map_or(true, field_is_empty)
        })
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "extraction content for '{}' is missing required fields: {}",
            extraction_type.as_str(),
            missing.join(", ")
        )))
    }
}

/// Validate a full extraction record before it is written.
pub fn validate_extraction(extraction: &Extraction) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&extraction.confidence) {
        return Err(AppError::Validation(format!(
            "extraction confidence {} is outside [0, 1]",
            extraction.confidence
        )));
    }
    validate_extraction_content(extraction.extraction_type, &extraction.content)
}

/// Validate a source before it is written.
pub fn validate_source(source: &Source) -> Result<(), AppError> {
    if source.tenant_id.trim().is_empty() {
        return Err(AppError::Validation("source tenant_id must not be empty".into()));
    }
    if source.title.trim().is_empty() {
        return Err(AppError::Validation("source title must not be empty".into()));
    }
    if let Some(year) = source.year {
        if !(1000..=9999).contains(&year) {
            return Err(AppError::Validation(format!(
                "source year {year} is not a plausible publication year"
            )));
        }
    }
    if !is_supported_version(Entity::Source, &source.schema_version) {
        return Err(AppError::Validation(format!(
            "unsupported source schema version '{}'",
            source.schema_version
        )));
    }
    Ok(())
}
