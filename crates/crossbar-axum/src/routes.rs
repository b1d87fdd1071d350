//! Route definitions and router construction.

use crate::auth;
use crate::handlers;
use crate::request_log;
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

fn build_cors_layer(origins: Option<&Vec<String>>) -> CorsLayer {
    match origins {
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(origins) => {
            let allowed: Vec<HeaderValue> =
                origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// Assemble the full router.
///
/// Three zones: the public `/health` probe, the bearer-gated `/v1`
/// surface, and the IP-gated `/ui/images` subtree.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(state.settings.cors_origins.as_ref());

    let v1 = Router::new()
        .route("/v1/models", get(handlers::models::list))
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .route("/v1/embeddings", post(handlers::embeddings::embeddings))
        .route("/v1/images/generations", post(handlers::images::generations))
        .route("/v1/tools", get(handlers::tools::list))
        .route("/v1/tools/replay/{replay_id}", get(handlers::tools::replay))
        .route("/v1/tools/{name}", post(handlers::tools::invoke))
        .route("/v1/gateway/status", get(handlers::status::status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let ui = Router::new()
        .route("/ui/images/{filename}", get(handlers::ui_images::serve))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_ui_ip,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(v1)
        .merge(ui)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_log::record_request,
        ))
        .layer(cors)
        .with_state(state)
}
