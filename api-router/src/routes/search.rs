use axum::{extract::State, response::IntoResponse, Json};
use query_router::{SearchRequest, TenantScope};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Drops the tenant predicate entirely. Operator tooling only.
    #[serde(default)]
    pub cross_tenant: bool,
    #[serde(flatten)]
    pub request: SearchRequest,
}

pub async fn search(
    State(state): State<ApiState>,
    Json(body): Json<SearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = if body.cross_tenant {
        TenantScope::CrossTenant
    } else {
        match body.tenant_id {
            Some(tenant) => TenantScope::Tenant(tenant),
            None => TenantScope::Configured,
        }
    };

    let response = state.router.search(scope, body.request).await?;
    Ok(Json(response))
}
