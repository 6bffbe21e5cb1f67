//! Shared-secret guard for the cron endpoints.
//!
//! The external scheduler sends `Authorization: Bearer <cron_secret>`.
//! Anything else is rejected with 401 before a handler runs.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::Error;
use crate::unsubscribe::constant_time_eq;

pub async fn require_cron_secret(
    State(expected): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.trim().as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => Error::Unauthorized("invalid cron secret".to_owned()).into_response(),
        None => Error::Unauthorized("missing bearer token".to_owned()).into_response(),
    }
}
