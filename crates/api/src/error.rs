//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{ErrorKind, SagaError};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Bodies are `{"message": ...}`. Persistence and upstream failures are
/// logged in full and answered with a generic message.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout or lifecycle error.
    Saga(SagaError),
    /// Direct store error from an admin endpoint.
    Store(StoreError),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ExternalService => StatusCode::BAD_GATEWAY,
        ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Store(err) => saga_error_to_response(SagaError::from(err)),
        };

        let body = serde_json::json!({ "message": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let kind = err.kind();
    let status = status_for(kind);
    match kind {
        ErrorKind::Persistence => {
            tracing::error!(error = %err, "internal server error");
            (status, "Internal server error".to_string())
        }
        ErrorKind::ExternalService => {
            tracing::error!(error = %err, "upstream service failure");
            (status, "An upstream service is unavailable, please retry".to_string())
        }
        _ => (status, err.to_string()),
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_statuses() {
        let cases = [
            (SagaError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (SagaError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (SagaError::Conflict("taken".into()), StatusCode::CONFLICT),
            (SagaError::external("carrier", "down"), StatusCode::BAD_GATEWAY),
            (
                SagaError::from(StoreError::Unavailable("db".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let db = SagaError::from(StoreError::Unavailable("pg at 10.0.0.3".into()));
        let (_, message) = saga_error_to_response(db);
        assert!(!message.contains("10.0.0.3"));

        let (_, message) = saga_error_to_response(SagaError::external("payment", "key rzp_live"));
        assert!(!message.contains("rzp_live"));
    }
}
