//! `/ui/images/{filename}` — static serving of stored images.
//!
//! IP-allowlisted (see `auth::require_ui_ip`). Filenames are opaque
//! content-addressed names produced by the images pipeline; anything that
//! looks like a path is refused before touching the filesystem.

use crate::state::AppState;
use crate::storage::mime_for_extension;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub async fn serve(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_arguments", "message": "invalid filename" })),
        )
            .into_response();
    }

    let path = state.settings.ui_image_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime_for_extension(&filename)),
                (header::CACHE_CONTROL, "private, max-age=900"),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found", "message": "no such image" })),
        )
            .into_response(),
    }
}
