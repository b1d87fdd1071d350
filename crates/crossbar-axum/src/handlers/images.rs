//! `/v1/images/generations` — generation plus payload policy.
//!
//! The gateway, not the upstream, is the authority on response format:
//! `url` is the default, under which bytes are persisted content-addressed
//! and served from `/ui/images`. Base64 passthrough requires an explicit
//! opt-in in the backend's payload policy.

use crate::error::HttpError;
use crate::handlers::{gate_and_admit, set_decision_headers};
use crate::state::AppState;
use crate::storage::store_image;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbar_core::{route, GatewayError, RouteKind};
use crossbar_upstream::images::{effective_model, parse_size};
use crossbar_upstream::{ImageJob, ImagesRequest};
use serde_json::json;
use tracing::info;

pub async fn generations(
    State(state): State<AppState>,
    Json(request): Json<ImagesRequest>,
) -> Result<Response, HttpError> {
    if request.prompt.trim().is_empty() {
        return Err(GatewayError::InvalidArguments("prompt must be a non-empty string".into()).into());
    }
    let response_format = match request.response_format.as_deref() {
        None | Some("url") => "url",
        Some("b64_json") => "b64_json",
        Some(other) => {
            return Err(GatewayError::InvalidArguments(format!(
                "response_format must be url or b64_json, got {other:?}"
            ))
            .into());
        }
    };
    let (width, height) = parse_size(&request.size, state.settings.images_max_pixels)
        .map_err(GatewayError::InvalidArguments)?;
    let n = request.n.clamp(1, 4);

    // Images are pinned to the configured serving class; the client's
    // `model` hint names an upstream model, never a backend.
    let decision = route(
        &state.registry,
        RouteKind::Images,
        &state.settings.images_backend_class,
    )?;
    let backend = state
        .registry
        .lookup(&decision.backend)
        .ok_or_else(|| GatewayError::Internal(format!("backend {} vanished", decision.backend)))?;

    if response_format == "b64_json" && !backend.payload_policy.images_allow_base64 {
        return Err(GatewayError::InvalidArguments(
            "base64 image responses are not allowed for this backend".into(),
        )
        .into());
    }

    let slot = gate_and_admit(&state, &decision, RouteKind::Images)?;

    let job = ImageJob {
        prompt: request.prompt.clone(),
        width,
        height,
        n,
        model: request.model.clone(),
        steps: request.steps,
        seed: request.seed,
        guidance_scale: request.guidance_scale,
        negative_prompt: request.negative_prompt.clone(),
    };
    let result = state.images.generate(&state.http, &job).await;
    drop(slot);
    let generated = result?;

    let mut model_used = effective_model(
        request.model.as_deref(),
        &state.settings.images_openai_model,
    );
    if model_used.is_empty() {
        model_used = decision.upstream_model.clone();
    }

    let mut gateway_meta = json!({
        "backend": decision.backend,
        "backend_class": decision.backend_class,
        "model": model_used,
        "request": { "prompt": request.prompt, "size": format!("{width}x{height}"), "n": n },
        "upstream": generated.upstream,
    });

    let data = if response_format == "url" {
        let mut items = Vec::with_capacity(generated.images.len());
        let mut first_stored = None;
        for bytes in &generated.images {
            let stored = store_image(&state.settings.ui_image_dir, bytes)
                .map_err(|e| GatewayError::Internal(format!("cannot store image: {e}")))?;
            items.push(json!({ "url": format!("/ui/images/{}", stored.filename) }));
            if first_stored.is_none() {
                first_stored = Some(stored);
            }
        }
        if let Some(stored) = first_stored {
            gateway_meta["ui_image_sha256"] = json!(stored.sha256);
            gateway_meta["ui_image_mime"] = json!(stored.mime);
        }
        items
    } else {
        gateway_meta["ui_image_mime"] = json!(generated.mime);
        generated
            .images
            .iter()
            .map(|bytes| json!({ "b64_json": BASE64.encode(bytes) }))
            .collect()
    };

    info!(
        backend = %decision.backend,
        n = data.len(),
        format = response_format,
        "images generated"
    );

    let body = json!({
        "created": generated.created,
        "data": data,
        "_gateway": gateway_meta,
    });
    let mut response = Json(body).into_response();
    set_decision_headers(&mut response, &decision);
    response.headers_mut().insert(
        "x-model-used",
        axum::http::HeaderValue::from_str(&model_used)
            .unwrap_or_else(|_| axum::http::HeaderValue::from_static("unknown")),
    );
    Ok(response)
}
