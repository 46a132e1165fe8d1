use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Every error response this server emits shares the `{"error": {...}}` envelope,
/// regardless of which handler produced it.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Request body must be valid JSON")]
    MalformedJson,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("No authentication tokens available")]
    NoCredentials,
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::MalformedJson | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NoCredentials => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": "internal_error",
            }
        });
        (status, Json(body)).into_response()
    }
}
