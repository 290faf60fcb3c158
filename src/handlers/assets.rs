//! Static content handler

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::server::AppState;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Content types by lowercase file extension.
const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("mjs", "text/javascript; charset=utf-8"),
    ("jsx", "text/javascript; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("map", "application/json; charset=utf-8"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("wasm", "application/wasm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
];

pub fn mime_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return FALLBACK_MIME;
    };
    MIME_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map_or(FALLBACK_MIME, |(_, mime)| *mime)
}

fn plain(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

/// Serve a file from the content or an auxiliary root
pub async fn serve(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        let mut response = plain(StatusCode::METHOD_NOT_ALLOWED);
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        return response;
    }

    let resolved = match state.resolver.resolve(uri.path()) {
        Ok(resolved) => resolved,
        Err(e) => {
            debug!(path = %uri.path(), error = %e, "Refused request path");
            return plain(StatusCode::FORBIDDEN);
        },
    };

    let real = match state.resolver.confine(&resolved).await {
        Ok(Some(real)) => real,
        Ok(None) => {
            debug!(path = %uri.path(), "Resolved file escapes its root");
            return plain(StatusCode::FORBIDDEN);
        },
        Err(e) if e.kind() == ErrorKind::NotFound => return plain(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(path = %resolved.path.display(), error = %e, "Failed to locate file");
            return plain(StatusCode::INTERNAL_SERVER_ERROR);
        },
    };

    let bytes = match tokio::fs::read(&real).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return plain(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(path = %real.display(), error = %e, "Failed to read file");
            return plain(StatusCode::INTERNAL_SERVER_ERROR);
        },
    };

    let length = bytes.len();
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(bytes)
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(mime_for(&resolved.path))),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_lookup_uses_extension_case_insensitively() {
        assert_eq!(mime_for(Path::new("menu.html")), "text/html; charset=utf-8");
        assert_eq!(mime_for(Path::new("icons/Phone.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("app.js")), "text/javascript; charset=utf-8");
    }

    #[test]
    fn unknown_or_missing_extension_is_binary() {
        assert_eq!(mime_for(Path::new("firmware.bin")), FALLBACK_MIME);
        assert_eq!(mime_for(Path::new("LICENSE")), FALLBACK_MIME);
    }
}
