//! `/v1/models` — the client-visible model list.
//!
//! Static: built from the registry (backend names, aliases, declared
//! defaults), never from upstream round-trips. Alias entries carry
//! `backend` and `upstream_model` extras for client discovery.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn list(State(state): State<AppState>) -> Json<Value> {
    let created = chrono::Utc::now().timestamp();
    let data: Vec<Value> = state
        .registry
        .client_visible_models()
        .into_iter()
        .map(|entry| {
            let mut item = json!({
                "id": entry.id,
                "object": "model",
                "created": created,
                "owned_by": "gateway",
                "backend": entry.backend,
            });
            if let Some(upstream) = entry.upstream_model {
                item["upstream_model"] = json!(upstream);
            }
            item
        })
        .collect();

    Json(json!({ "object": "list", "data": data }))
}
