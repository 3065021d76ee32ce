use async_trait::async_trait;
use common::{
    error::AppError,
    storage::vector::{VectorRecord, VectorStoreClient},
};

/// Seam between the coordinator and the vector store. Exists so tests
/// can inject failures without touching the storage layer.
#[async_trait]
pub trait VectorWriter: Send + Sync {
    async fn upsert(&self, record: VectorRecord) -> Result<(), AppError>;
    async fn delete(&self, id: &str) -> Result<(), AppError>;
    async fn delete_by_source(&self, tenant_id: &str, source_id: &str) -> Result<(), AppError>;
    async fn list_ids_by_source(
        &self,
        tenant_id: &str,
        source_id: &str,
    ) -> Result<Vec<String>, AppError>;
}

pub struct SurrealVectorWriter {
    store: VectorStoreClient,
}

impl SurrealVectorWriter {
    pub fn new(store: VectorStoreClient) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VectorWriter for SurrealVectorWriter {
    async fn upsert(&self, record: VectorRecord) -> Result<(), AppError> {
        self.store.upsert(record).await
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.store.delete(id).await
    }

    async fn delete_by_source(&self, tenant_id: &str, source_id: &str) -> Result<(), AppError> {
        self.store.delete_by_source(tenant_id, source_id).await
    }

    async fn list_ids_by_source(
        &self,
        tenant_id: &str,
        source_id: &str,
    ) -> Result<Vec<String>, AppError> {
        self.store.list_ids_by_source(tenant_id, source_id).await
    }
}
