#[derive(Debug, Clone)]
pub struct IngestionTuning {
    /// Attempts per store write, transient errors only.
    pub store_attempts: usize,
    pub store_initial_backoff_ms: u64,
    /// Independent per-store call timeouts.
    pub document_timeout_ms: u64,
    pub vector_timeout_ms: u64,
    pub vector_write_concurrency: usize,
    pub chunk_max_tokens: usize,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            store_attempts: 3,
            store_initial_backoff_ms: 100,
            document_timeout_ms: 10_000,
            vector_timeout_ms: 10_000,
            vector_write_concurrency: 8,
            chunk_max_tokens: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
}
