use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::{AppError, ErrorBody};
use serde::Serialize;
use thiserror::Error;

/// Wire-level error: every failure leaves the API as
/// `{"error": {"code", "message", "details?"}}` with a matching status.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ApiError(#[from] AppError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::Validation(_) | AppError::VectorDimension { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TenantNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(_)
            | AppError::Embedding(_)
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = ErrorEnvelope {
            error: self.0.to_body(),
        };
        (status, Json(envelope)).into_response()
    }
}
