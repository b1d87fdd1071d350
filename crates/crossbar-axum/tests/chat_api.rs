//! End-to-end chat tests against mock upstreams: routing echo, SSE
//! translation, capability refusal, and upstream error mapping.

mod common;

use axum::http::StatusCode;
use common::*;
use crossbar_axum::create_router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn chat_body(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "stream": stream,
        "messages": [{"role": "user", "content": "ping"}]
    })
}

#[tokio::test]
async fn non_streaming_chat_echoes_the_route_decision() {
    let counter = UpstreamCounter::default();
    let upstream = spawn_openai_upstream(counter.clone()).await;
    let state = state_with_registry(chat_registry(&upstream, "openai", 4), |_| {});
    let app = create_router(state);

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/chat/completions",
            Some(chat_body("fast", false)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-backend-used"], "gpu_fast");
    assert_eq!(response.headers()["x-model-used"], "llama-3-8b-instruct");
    assert_eq!(response.headers()["x-router-reason"], "alias_expanded");

    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "pong");
    assert_eq!(body["_gateway"]["backend"], "gpu_fast");
    assert_eq!(body["_gateway"]["model"], "llama-3-8b-instruct");
    assert_eq!(body["_gateway"]["reason"], "alias_expanded");
    assert_eq!(counter.get(), 1);
}

#[tokio::test]
async fn streaming_chat_follows_the_event_protocol() {
    let upstream = spawn_openai_upstream(UpstreamCounter::default()).await;
    let state = state_with_registry(chat_registry(&upstream, "openai", 4), |_| {});
    let app = create_router(state);

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/chat/completions",
            Some(chat_body("fast", true)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
    assert_eq!(response.headers()["x-backend-used"], "gpu_fast");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = std::str::from_utf8(&bytes).unwrap();
    let frames: Vec<&str> = text
        .split("\n\n")
        .filter(|f| !f.is_empty())
        .map(|f| f.strip_prefix("data: ").unwrap())
        .collect();

    assert_eq!(frames.len(), 5, "frames: {frames:?}");
    let route: Value = serde_json::from_str(frames[0]).unwrap();
    assert_eq!(route["type"], "route");
    assert_eq!(route["backend"], "gpu_fast");
    assert_eq!(route["reason"], "alias_expanded");

    let first: Value = serde_json::from_str(frames[1]).unwrap();
    assert_eq!(first, json!({"type": "delta", "delta": "Hel"}));
    let second: Value = serde_json::from_str(frames[2]).unwrap();
    assert_eq!(second, json!({"type": "delta", "delta": "lo"}));

    let done: Value = serde_json::from_str(frames[3]).unwrap();
    assert_eq!(done["type"], "done");
    assert_eq!(frames[4], "[DONE]");
}

#[tokio::test]
async fn the_default_model_hint_resolves_to_the_backend_default() {
    let counter = UpstreamCounter::default();
    let upstream = spawn_openai_upstream(counter.clone()).await;
    let state = state_with_registry(chat_registry(&upstream, "openai", 4), |_| {});
    let app = create_router(state);

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/chat/completions",
            Some(chat_body("default", false)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-model-used"], "llama-3-8b-instruct");
    assert_eq!(response.headers()["x-router-reason"], "default_preference");
    let body = body_json(response).await;
    // The placeholder never reaches the upstream as a model name.
    assert_eq!(body["model"], "llama-3-8b-instruct");
    assert_eq!(body["_gateway"]["model"], "llama-3-8b-instruct");
}

#[tokio::test]
async fn pinning_a_backend_without_chat_is_a_400_and_consumes_nothing() {
    let counter = UpstreamCounter::default();
    let upstream = spawn_openai_upstream(counter.clone()).await;
    let state = state_with_registry(chat_registry(&upstream, "openai", 4), |_| {});
    let app = create_router(state.clone());

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/chat/completions",
            Some(chat_body("gpu_heavy", false)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "capability_not_supported");
    assert_eq!(body["backend_class"], "gpu_heavy");
    assert_eq!(body["supported_capabilities"], json!(["images"]));

    // No upstream call, no admission slot consumed.
    assert_eq!(counter.get(), 0);
    let stats = state.admission.stats();
    assert_eq!(stats["gpu_heavy.images"].inflight, 0);
    assert_eq!(stats["gpu_fast.chat"].inflight, 0);
}

#[tokio::test]
async fn unready_backend_is_a_503_with_the_health_error() {
    let counter = UpstreamCounter::default();
    let upstream = spawn_openai_upstream(counter.clone()).await;
    let state = state_with_registry(chat_registry(&upstream, "openai", 4), |_| {});
    state.health.record(
        "gpu_fast",
        false,
        false,
        Some("liveness check failed: Connection refused".into()),
    );
    let app = create_router(state);

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/chat/completions",
            Some(chat_body("fast", false)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["retry-after"], "30");
    let body = body_json(response).await;
    assert_eq!(body["error"], "backend_not_ready");
    assert_eq!(
        body["health_error"],
        "liveness check failed: Connection refused"
    );
    assert_eq!(counter.get(), 0);
}

#[tokio::test]
async fn unreachable_upstream_maps_to_502() {
    let state = state_with_registry(chat_registry("http://127.0.0.1:1", "openai", 4), |_| {});
    let app = create_router(state.clone());

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/chat/completions",
            Some(chat_body("fast", false)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "upstream_http_error");
    // The slot was released on the error path.
    assert_eq!(state.admission.stats()["gpu_fast.chat"].inflight, 0);
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let upstream = spawn_openai_upstream(UpstreamCounter::default()).await;
    let state = state_with_registry(chat_registry(&upstream, "openai", 4), |_| {});
    let app = create_router(state);

    let response = app
        .oneshot(authed(
            "POST",
            "/v1/chat/completions",
            Some(json!({"model": "fast", "messages": []})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_arguments");
}
