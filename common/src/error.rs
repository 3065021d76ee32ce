use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Core internal errors.
///
/// Store-native errors are wrapped here at the component boundary so that
/// callers never depend on a specific driver's error type, and so that the
/// retry policy can be decided from the variant alone.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    VectorDimension { expected: usize, actual: usize },
    #[error("Storage error: {0}")]
    Storage(#[from] surrealdb::Error),
    #[error("Tenant '{0}' is not initialized")]
    TenantNotReady(String),
    #[error("Timed out waiting on {0}")]
    Timeout(&'static str),
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("Internal error [{correlation_id}]: {message}")]
    Internal {
        correlation_id: String,
        message: String,
    },
}

impl AppError {
    /// Wrap an unexpected failure with a correlation id for log lookup.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            correlation_id: Uuid::new_v4().to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used by the API error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::VectorDimension { .. } => "VECTOR_DIMENSION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::TenantNotReady(_) => "TENANT_NOT_READY",
            Self::Timeout(_) => "TIMEOUT",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether a retry with backoff is worth attempting.
    ///
    /// Only infrastructure-level failures qualify; validation, missing
    /// references and dimension mismatches are deterministic and never
    /// retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Timeout(_))
    }

    /// Convert into the wire-level error body.
    ///
    /// Storage and internal errors are sanitized: the raw driver message
    /// stays in the logs, the caller gets the code and a generic message.
    pub fn to_body(&self) -> ErrorBody {
        let (message, details) = match self {
            Self::Storage(err) => {
                tracing::error!(error = %err, "storage error crossing API boundary");
                ("storage backend unavailable".to_owned(), None)
            }
            Self::Internal {
                correlation_id,
                message,
            } => {
                tracing::error!(correlation_id, message, "internal error crossing API boundary");
                (
                    "internal error".to_owned(),
                    Some(serde_json::json!({ "correlation_id": correlation_id })),
                )
            }
            Self::VectorDimension { expected, actual } => (
                self.to_string(),
                Some(serde_json::json!({ "expected": expected, "actual": actual })),
            ),
            other => (other.to_string(), None),
        };

        ErrorBody {
            code: self.code().to_owned(),
            message,
            details,
        }
    }
}

/// The `{code, message, details}` error shape every external caller sees.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_drives_retry_policy() {
        assert!(AppError::Timeout("document store").is_transient());
        assert!(!AppError::Validation("bad input".into()).is_transient());
        assert!(!AppError::NotFound("source x".into()).is_transient());
        assert!(!AppError::VectorDimension {
            expected: 8,
            actual: 3
        }
        .is_transient());
        assert!(!AppError::TenantNotReady("tenant-a".into()).is_transient());
    }

    #[test]
    fn internal_errors_are_sanitized_with_correlation_id() {
        let err = AppError::internal("db password incorrect");
        let body = err.to_body();

        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.message, "internal error");
        let details = body.details.expect("details should carry correlation id");
        assert!(details.get("correlation_id").is_some());
        assert!(!details.to_string().contains("password"));
    }

    #[test]
    fn dimension_mismatch_carries_structured_details() {
        let body = AppError::VectorDimension {
            expected: 1536,
            actual: 384,
        }
        .to_body();

        assert_eq!(body.code, "VECTOR_DIMENSION_ERROR");
        assert_eq!(body.details.expect("details")["expected"], 1536);
    }
}
