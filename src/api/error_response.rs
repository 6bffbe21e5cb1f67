//! JSON envelope shared by every endpoint and the mapping from [`Error`] to
//! an HTTP response.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::errors::Error;

/// `{success, message}` plus either `data` or `error`/`details`.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
            details: None,
        }
    }

    pub fn with_data<T: Serialize>(message: impl Into<String>, data: &T) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Failed to serialize response payload: {e}");
                None
            }
        };
        Self {
            data,
            ..Self::ok(message)
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = if status.is_server_error() {
            log::error!("Request failed: {self}");
            ApiResponse {
                success: false,
                message: "internal error while processing the request".to_owned(),
                data: None,
                error: Some(self.error_code().to_owned()),
                details: Some(self.to_string()),
            }
        } else {
            log::warn!("Request rejected ({status}): {self}");
            ApiResponse {
                success: false,
                message: self.to_string(),
                data: None,
                error: Some(self.error_code().to_owned()),
                details: None,
            }
        };

        (status, Json(body)).into_response()
    }
}

// Extractor rejections become 400s in the shared envelope.

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}
