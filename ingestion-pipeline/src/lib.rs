mod chunking;
mod config;
mod coordinator;
mod types;
mod vector_writer;

pub use chunking::chunk_text;
pub use config::{IngestionConfig, IngestionTuning};
pub use coordinator::{IngestReport, IngestionCoordinator, ReconcileReport};
pub use types::{ChunkDraft, ExtractionDraft, ExtractionMode, ParsedDocument, SourceMeta};
pub use vector_writer::{SurrealVectorWriter, VectorWriter};
