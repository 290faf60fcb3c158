//! Session cookie handlers
//!
//! The GUI shell reports every change of its browser cookie jar here and
//! reads the restored jar back at launch.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::read_json;
use crate::cookies::{CookieError, CookieRecord, CookieStore};
use crate::error::ApiError;
use crate::server::AppState;

/// Cookie snapshot response
#[derive(Serialize)]
pub struct CookieList {
    pub cookies: Vec<CookieRecord>,
}

/// One observed jar change
#[derive(Deserialize)]
pub struct CookieChangeRequest {
    pub cookie: CookieRecord,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub cause: Option<String>,
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<CookieList>, ApiError> {
    let cookies = state.cookies.get_all().await.map_err(ApiError::internal)?;
    Ok(Json(CookieList {
        cookies: cookies
            .iter()
            .filter_map(|cookie| CookieRecord::try_from(cookie).ok())
            .collect(),
    }))
}

/// Apply a change to the live jar; persistence follows after the debounce.
pub async fn record_change(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, ApiError> {
    let change: CookieChangeRequest = read_json(body)?;
    debug!(
        name = %change.cookie.name,
        removed = change.removed,
        cause = change.cause.as_deref().unwrap_or("unknown"),
        "Cookie change reported"
    );
    let result = if change.removed {
        state.cookies.remove(&change.cookie).await
    } else {
        state.cookies.set(&change.cookie).await
    };
    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e @ CookieError::Rejected { .. }) => Err(ApiError::bad_request(e.to_string())),
        Err(e) => Err(ApiError::internal(e)),
    }
}
