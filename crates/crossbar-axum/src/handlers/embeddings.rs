//! `/v1/embeddings`.

use crate::error::HttpError;
use crate::handlers::{gate_and_admit, set_decision_headers};
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crossbar_core::{route, GatewayError, RouteKind};
use crossbar_upstream::embeddings::embeddings as call_embeddings;
use crossbar_upstream::EmbeddingsRequest;
use serde_json::Value;
use tracing::debug;

fn valid_input(input: &Value) -> bool {
    match input {
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => {
            !items.is_empty() && items.iter().all(|i| i.as_str().is_some_and(|s| !s.is_empty()))
        }
        _ => false,
    }
}

pub async fn embeddings(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingsRequest>,
) -> Result<Response, HttpError> {
    if !valid_input(&request.input) {
        return Err(GatewayError::InvalidArguments(
            "input must be a non-empty string or a list of non-empty strings".into(),
        )
        .into());
    }

    // "default" and legacy-name normalization happen inside the router.
    let decision = route(&state.registry, RouteKind::Embeddings, &request.model)?;
    let backend = state
        .registry
        .lookup(&decision.backend)
        .ok_or_else(|| GatewayError::Internal(format!("backend {} vanished", decision.backend)))?;

    let slot = gate_and_admit(&state, &decision, RouteKind::Embeddings)?;
    let result = call_embeddings(
        &state.http,
        backend,
        &decision.upstream_model,
        &request.input,
        state.settings.embeddings_read_timeout,
    )
    .await;
    drop(slot);

    let body = result?;
    debug!(backend = %decision.backend, "embeddings completed");

    let mut response = Json(body).into_response();
    set_decision_headers(&mut response, &decision);
    Ok(response)
}
