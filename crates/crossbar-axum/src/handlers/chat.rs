//! `/v1/chat/completions` — the chat streaming proxy.

use crate::error::HttpError;
use crate::handlers::{gate_and_admit, set_decision_headers};
use crate::sse;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use crossbar_core::{route, GatewayError, RouteKind, StreamEvent};
use crossbar_upstream::{chat_completion, open_chat_stream, translate_chat_stream, ChatCompletionRequest};
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, info};

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, HttpError> {
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidArguments("messages must be non-empty".into()).into());
    }

    let decision = route(&state.registry, RouteKind::Chat, &request.model)?;
    let backend = state
        .registry
        .lookup(&decision.backend)
        .ok_or_else(|| GatewayError::Internal(format!("backend {} vanished", decision.backend)))?;

    info!(
        model = %request.model,
        stream = request.stream,
        backend = %decision.backend,
        upstream_model = %decision.upstream_model,
        reason = %decision.reason,
        "chat routed"
    );

    let slot = gate_and_admit(&state, &decision, RouteKind::Chat)?;

    if request.stream {
        let upstream =
            open_chat_stream(&state.http, backend, &request, &decision.upstream_model).await?;

        let emit_thinking = state.settings.emit_thinking_for.contains(&decision.backend);
        let events = translate_chat_stream(
            backend,
            upstream,
            emit_thinking,
            state.settings.stream_idle_timeout,
        );

        let route_event = StreamEvent::Route {
            backend: decision.backend.clone(),
            model: decision.upstream_model.clone(),
            reason: decision.reason.to_string(),
        };

        // The slot rides inside the stream: when the body is dropped —
        // completion, error, or client disconnect — the permit returns.
        let framed = futures_util::stream::once(std::future::ready(route_event))
            .chain(events)
            .map(|event| sse::frame(&event))
            .chain(futures_util::stream::once(std::future::ready(
                sse::done_sentinel(),
            )))
            .map(move |bytes| {
                let _held = &slot;
                Ok::<Bytes, Infallible>(bytes)
            });

        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header("x-accel-buffering", "no")
            .body(Body::from_stream(framed))
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        set_decision_headers(&mut response, &decision);
        Ok(response)
    } else {
        let result = chat_completion(
            &state.http,
            backend,
            &request,
            &decision.upstream_model,
            state.settings.chat_read_timeout,
        )
        .await;
        // Slot released here on success and error alike.
        drop(slot);

        let mut body = result?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert(
                "_gateway".into(),
                json!({
                    "backend": decision.backend,
                    "model": decision.upstream_model,
                    "reason": decision.reason,
                }),
            );
        }
        debug!(backend = %decision.backend, "chat completed");

        let mut response = Json(body).into_response();
        set_decision_headers(&mut response, &decision);
        Ok(response)
    }
}
