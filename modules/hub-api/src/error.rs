//! Maps the shared `HubError` taxonomy onto HTTP status codes per spec.md
//! §7. Grounded on `original_source/app/services/ingest.py::IngestError`
//! (status_code + detail pair) and the teacher's `IntoResponse` error glue
//! in `rootsignal-api/src/rest/mod.rs`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use hub_common::HubError;

pub struct ApiError(pub HubError);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            HubError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            HubError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            HubError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            HubError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            HubError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            HubError::Config(msg) => {
                tracing::error!(%msg, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            HubError::Other(err) => {
                tracing::error!(error = %err, "unexpected error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({"detail": message}))).into_response()
    }
}
