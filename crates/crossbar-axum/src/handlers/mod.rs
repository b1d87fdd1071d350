//! Route handlers.

pub mod chat;
pub mod embeddings;
pub mod images;
pub mod models;
pub mod status;
pub mod tools;
pub mod ui_images;

use crate::error::HttpError;
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::response::Response;
use crossbar_core::admission::AdmissionRejection;
use crossbar_core::{AdmissionSlot, GatewayError, RouteDecision, RouteKind};

/// Public liveness endpoint.
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Apply the health gate, then take an admission slot.
///
/// Both refusals happen before any upstream socket is opened, and neither
/// consumes capacity.
pub(crate) fn gate_and_admit(
    state: &AppState,
    decision: &RouteDecision,
    route_kind: RouteKind,
) -> Result<AdmissionSlot, HttpError> {
    if !state.health.is_routable(&decision.backend) {
        let health_error = state
            .health
            .snapshot(&decision.backend)
            .and_then(|s| s.last_error);
        return Err(GatewayError::BackendNotReady {
            backend: decision.backend.clone(),
            health_error,
        }
        .into());
    }

    state
        .admission
        .try_acquire(&decision.backend, route_kind)
        .map_err(|rejection| match rejection {
            AdmissionRejection::Overloaded => GatewayError::BackendOverloaded {
                backend_class: decision.backend_class.clone(),
                route_kind,
            }
            .into(),
            AdmissionRejection::NotAdmitted => {
                // A declared capability always has a limit (validated at
                // load), so this only fires on a route kind the backend
                // never declared.
                let supported = state
                    .registry
                    .lookup(&decision.backend)
                    .map(|b| b.capabilities.iter().copied().collect())
                    .unwrap_or_default();
                GatewayError::CapabilityNotSupported {
                    backend_class: decision.backend_class.clone(),
                    route_kind,
                    supported,
                }
                .into()
            }
        })
}

/// Attach the router-decision headers. Set before the first body byte on
/// both streaming and one-shot paths.
pub(crate) fn set_decision_headers(response: &mut Response, decision: &RouteDecision) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.backend) {
        headers.insert("x-backend-used", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.upstream_model) {
        headers.insert("x-model-used", v);
    }
    if let Ok(v) = HeaderValue::from_str(decision.reason.as_str()) {
        headers.insert("x-router-reason", v);
    }
}
