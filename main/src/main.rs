use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    storage::{
        db::SurrealDbClient,
        document::DocumentStoreClient,
        migration::MigrationTool,
        tenant::TenantIndexManager,
        vector::VectorStoreClient,
    },
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use ingestion_pipeline::{IngestionConfig, IngestionCoordinator, IngestionTuning, SurrealVectorWriter};
use query_router::QueryRouter;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    // One connection per store; they may point at different servers.
    let document_db = SurrealDbClient::new(
        &config.document_store.address,
        &config.document_store.username,
        &config.document_store.password,
        &config.document_store.namespace,
        &config.document_store.database,
    )
    .await?;
    let vector_db = SurrealDbClient::new(
        &config.vector_store.address,
        &config.vector_store.username,
        &config.vector_store.password,
        &config.vector_store.namespace,
        &config.vector_store.database,
    )
    .await?;

    let embedding_provider = Arc::new(EmbeddingProvider::from_config(&config)?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    // Bring legacy rows forward before anything reads them.
    let report = MigrationTool::new(&document_db, &vector_db, config.default_tenant.clone())
        .run()
        .await?;
    if report.total() > 0 {
        info!(rows = report.total(), "Migrated legacy rows");
    }

    let documents = DocumentStoreClient::new(document_db);
    let vectors = VectorStoreClient::new(
        vector_db,
        embedding_provider.dimension(),
        config.distance_metric,
    );

    let tenants = TenantIndexManager::new(documents.clone(), vectors.clone());
    tenants.initialize(&config.default_tenant).await?;

    let ingestion_config = IngestionConfig {
        tuning: IngestionTuning {
            document_timeout_ms: config.document_store.timeout_ms,
            vector_timeout_ms: config.vector_store.timeout_ms,
            ..Default::default()
        },
    };
    let coordinator = Arc::new(IngestionCoordinator::new(
        documents.clone(),
        Arc::new(SurrealVectorWriter::new(vectors.clone())),
        Arc::clone(&embedding_provider),
        tenants.clone(),
        ingestion_config,
    ));
    let router = Arc::new(
        QueryRouter::new(
            documents,
            vectors,
            embedding_provider,
            tenants.clone(),
            config.default_tenant.clone(),
        )
        .with_timeouts(
            std::time::Duration::from_millis(config.document_store.timeout_ms),
            std::time::Duration::from_millis(config.vector_store.timeout_ms),
        ),
    );

    let api_state = ApiState::new(coordinator, router, tenants, config.clone());
    let app = Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
