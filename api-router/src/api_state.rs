use std::sync::Arc;

use common::{storage::tenant::TenantIndexManager, utils::config::AppConfig};
use ingestion_pipeline::IngestionCoordinator;
use query_router::QueryRouter;

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<IngestionCoordinator>,
    pub router: Arc<QueryRouter>,
    pub tenants: TenantIndexManager,
    pub config: AppConfig,
}

impl ApiState {
    pub fn new(
        coordinator: Arc<IngestionCoordinator>,
        router: Arc<QueryRouter>,
        tenants: TenantIndexManager,
        config: AppConfig,
    ) -> Self {
        Self {
            coordinator,
            router,
            tenants,
            config,
        }
    }
}
