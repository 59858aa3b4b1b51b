//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before a JSON `{"error": ...}` body is sent; their
//! details never reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::ServiceError;

/// Application-level error type for the HTTP layer.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Caller identity is missing or malformed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client (e.g. a malformed path parameter).
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Service(err) => match err {
                ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
                ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                ServiceError::InsufficientStock { .. } => StatusCode::CONFLICT,
                ServiceError::MixedCurrency { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                ServiceError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        let message = if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
            // Don't expose internal error details to clients
            "Internal server error".to_string()
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use marketplace_core::{CurrencyCode, ProductId};

    use super::*;
    use crate::services::{Entity, InfrastructureError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ServiceError::NotFound {
                    entity: Entity::Product,
                    id: 1,
                },
                StatusCode::NOT_FOUND,
            ),
            (ServiceError::invalid("bad"), StatusCode::BAD_REQUEST),
            (
                ServiceError::InsufficientStock {
                    product_id: ProductId::new(1),
                    name: "Tea".to_owned(),
                    available: 0,
                    requested: 1,
                },
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::MixedCurrency {
                    product_id: ProductId::new(2),
                    expected: CurrencyCode::USD,
                    found: CurrencyCode::EUR,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::PermissionDenied("no".to_owned()),
                StatusCode::FORBIDDEN,
            ),
            (
                ServiceError::Infrastructure(InfrastructureError::Timeout(Duration::from_secs(1))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_server_error_hides_details() {
        let err = AppError::from(ServiceError::Infrastructure(InfrastructureError::Timeout(
            Duration::from_secs(3),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
