//! `/v1/gateway/status` — admission and health introspection.
//!
//! Bearer-protected but deliberately outside admission, so the gateway
//! stays observable while saturated.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "admission_control": state.admission.stats(),
        "backend_health": state.health.all(),
        "build": env!("CARGO_PKG_VERSION"),
    }))
}
