use tracing::info;

use crate::{
    error::AppError,
    schema::{self, Entity},
    storage::{db::SurrealDbClient, vector::VECTOR_TABLE},
};

/// Per-table counts of rows touched by a migration run.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MigrationReport {
    pub sources_updated: usize,
    pub chunks_updated: usize,
    pub extractions_updated: usize,
    pub vectors_updated: usize,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.sources_updated + self.chunks_updated + self.extractions_updated + self.vectors_updated
    }
}

/// Brings pre-multi-tenant data forward: rows without a tenant get the
/// default tenant, rows without a schema version get the legacy version
/// and legacy versions are bumped to current. Versions are never lowered
/// and already-migrated rows are left untouched, so re-running converges.
pub struct MigrationTool<'a> {
    document_db: &'a SurrealDbClient,
    vector_db: &'a SurrealDbClient,
    default_tenant: String,
}

impl<'a> MigrationTool<'a> {
    pub fn new(
        document_db: &'a SurrealDbClient,
        vector_db: &'a SurrealDbClient,
        default_tenant: impl Into<String>,
    ) -> Self {
        Self {
            document_db,
            vector_db,
            default_tenant: default_tenant.into(),
        }
    }

    pub async fn run(&self) -> Result<MigrationReport, AppError> {
        let mut report = MigrationReport::default();

        report.sources_updated = self.migrate_document_table("source", Entity::Source).await?;
        report.chunks_updated = self.migrate_document_table("chunk", Entity::Chunk).await?;
        report.extractions_updated = self
            .migrate_document_table("extraction", Entity::Extraction)
            .await?;
        report.vectors_updated = self.migrate_vectors().await?;

        info!(
            sources = report.sources_updated,
            chunks = report.chunks_updated,
            extractions = report.extractions_updated,
            vectors = report.vectors_updated,
            "Migration run finished"
        );
        Ok(report)
    }

    async fn migrate_document_table(
        &self,
        table: &str,
        entity: Entity,
    ) -> Result<usize, AppError> {
        let tenant_backfilled = self
            .count_updated(
                self.document_db,
                format!(
                    "UPDATE {table} SET tenant_id = $tenant \
                     WHERE tenant_id = NONE OR tenant_id = ''"
                ),
            )
            .await?;

        // Rows predating versioning are stamped legacy first, then every
        // legacy row moves to current. Anything newer is left alone.
        let stamped = self
            .count_updated(
                self.document_db,
                format!(
                    "UPDATE {table} SET schema_version = '{legacy}' \
                     WHERE schema_version = NONE OR schema_version = ''",
                    legacy = schema::legacy_version(entity),
                ),
            )
            .await?;
        let upgraded = self
            .count_updated(
                self.document_db,
                format!(
                    "UPDATE {table} SET schema_version = '{current}' \
                     WHERE schema_version = '{legacy}'",
                    current = schema::current_version(entity),
                    legacy = schema::legacy_version(entity),
                ),
            )
            .await?;

        Ok(tenant_backfilled.max(stamped).max(upgraded))
    }

    async fn migrate_vectors(&self) -> Result<usize, AppError> {
        self.count_updated(
            self.vector_db,
            format!(
                "UPDATE {VECTOR_TABLE} SET payload.tenant_id = $tenant \
                 WHERE payload.tenant_id = NONE OR payload.tenant_id = ''"
            ),
        )
        .await
    }

    async fn count_updated(
        &self,
        db: &SurrealDbClient,
        query: String,
    ) -> Result<usize, AppError> {
        let mut response = db
            .query(query)
            .bind(("tenant", self.default_tenant.clone()))
            .await?;
        let updated: Vec<serde::de::IgnoredAny> = response.take(0)?;
        Ok(updated.len())
    }
}
