use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: 200 once the default tenant's indexes exist in both
/// stores, 503 before that.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    if state.tenants.is_ready(&state.config.default_tenant).await {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "tenant_indexes": "ok" }
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "tenant_indexes": "pending" }
            })),
        )
    }
}
