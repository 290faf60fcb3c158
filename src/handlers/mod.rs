//! HTTP handlers, one module per route family.

pub mod assets;
pub mod dialpad;
pub mod session;
pub mod status;
pub mod tasks;

use axum::{
    body::Bytes,
    extract::rejection::BytesRejection,
    http::{Method, StatusCode},
    response::Response,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Preflight answers carry no content, so they go out as `204`.
pub async fn preflight(method: Method, mut response: Response) -> Response {
    if method == Method::OPTIONS && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

/// Decode a JSON request body. Oversized bodies keep the extractor's 413,
/// anything that is not valid JSON for `T` becomes a 400.
pub(crate) fn read_json<T: DeserializeOwned>(
    body: Result<Bytes, BytesRejection>,
) -> Result<T, ApiError> {
    let body = body.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
    serde_json::from_slice(&body).map_err(|e| ApiError::invalid_json(&e))
}
