use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::{
    error::AppError,
    storage::{document::DocumentStoreClient, vector::VectorStoreClient},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TenantState {
    Initializing,
    Ready,
}

/// Tracks which tenants have their indexes in place across both stores
/// and refuses reads and writes for tenants that do not.
///
/// Initialization is single-flight per process: the map lock is held for
/// the duration of a tenant's setup, so concurrent callers wait instead
/// of issuing duplicate DDL.
#[derive(Clone)]
pub struct TenantIndexManager {
    documents: DocumentStoreClient,
    vectors: VectorStoreClient,
    states: Arc<Mutex<HashMap<String, TenantState>>>,
}

impl TenantIndexManager {
    pub fn new(documents: DocumentStoreClient, vectors: VectorStoreClient) -> Self {
        Self {
            documents,
            vectors,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bring a tenant to Ready, creating the document store indexes, the
    /// vector collection and the payload indexes. Idempotent.
    pub async fn initialize(&self, tenant_id: &str) -> Result<(), AppError> {
        if tenant_id.trim().is_empty() {
            return Err(AppError::Validation("tenant_id must not be empty".into()));
        }

        let mut states = self.states.lock().await;
        if states.get(tenant_id) == Some(&TenantState::Ready) {
            return Ok(());
        }
        states.insert(tenant_id.to_owned(), TenantState::Initializing);

        let result = async {
            self.documents.ensure_indexes().await?;
            self.vectors.ensure_collection().await?;
            self.vectors.ensure_tenant_indexes().await?;
            Ok::<(), AppError>(())
        }
        .await;

        match result {
            Ok(()) => {
                states.insert(tenant_id.to_owned(), TenantState::Ready);
                info!(tenant_id, "Tenant indexes ready");
                Ok(())
            }
            Err(err) => {
                states.remove(tenant_id);
                Err(err)
            }
        }
    }

    pub async fn is_ready(&self, tenant_id: &str) -> bool {
        self.states.lock().await.get(tenant_id) == Some(&TenantState::Ready)
    }

    /// Error unless the tenant has been initialized.
    pub async fn guard(&self, tenant_id: &str) -> Result<(), AppError> {
        if self.is_ready(tenant_id).await {
            Ok(())
        } else {
            Err(AppError::TenantNotReady(tenant_id.to_owned()))
        }
    }
}
