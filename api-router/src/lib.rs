use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{delete, get, post},
    Router,
};
use routes::{
    ingress::{delete_source, ingest_data, reconcile_source},
    liveness::live,
    readiness::ready,
    search::search,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Probe endpoints (for k8s/systemd probes)
    let probes = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let api = Router::new()
        .route("/ingress", post(ingest_data))
        .route("/search", post(search))
        .route("/sources/{id}", delete(delete_source))
        .route("/sources/{id}/reconcile", post(reconcile_source));

    probes.merge(api)
}
