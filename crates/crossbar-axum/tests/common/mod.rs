//! Shared fixtures: an in-process gateway state and mock upstreams bound
//! to real listeners.
#![allow(dead_code)] // Each test binary uses a different subset.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use crossbar_axum::auth::IpAllowlist;
use crossbar_axum::state::{AppState, GatewayContext};
use crossbar_core::registry::RegistryDocument;
use crossbar_core::{AdmissionController, BackendRegistry, HealthStore, Settings, ToolsLogMode};
use crossbar_tools::builtin::build_bus;
use crossbar_upstream::ImagesUpstream;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TOKEN: &str = "test-secret";

/// Build a gateway state around the given registry document, with the
/// health store in its optimistic startup mode.
pub fn state_with_registry(doc: Value, tweak: impl FnOnce(&mut Settings)) -> AppState {
    let doc: RegistryDocument = serde_json::from_value(doc).expect("registry document");
    let registry = Arc::new(BackendRegistry::from_document(doc).expect("valid registry"));

    let mut settings = Settings::with_token(TOKEN);
    settings.tools_log_mode = ToolsLogMode::None;
    settings.stream_idle_timeout = Duration::from_secs(5);
    tweak(&mut settings);

    let http = reqwest::Client::new();
    let admission = AdmissionController::from_registry(&registry);
    let tools = build_bus(&settings, http.clone()).expect("tool bus");
    let images = ImagesUpstream {
        kind: settings.images_backend,
        base_url: settings.images_http_base_url.clone(),
        default_model: settings.images_openai_model.clone(),
        read_timeout: settings.images_http_timeout,
        a1111_steps: settings.images_a1111_steps,
    };
    let ui_allowlist = IpAllowlist::parse(&settings.ui_ip_allowlist).expect("allowlist");

    Arc::new(GatewayContext {
        settings,
        registry,
        admission,
        health: HealthStore::new(),
        http,
        tools,
        images,
        request_log: None,
        ui_allowlist,
    })
}

/// A single chat backend named `gpu_fast` pointing at `base_url`, with a
/// `fast` alias and a configurable chat limit.
pub fn chat_registry(base_url: &str, wire: &str, chat_limit: u32) -> Value {
    json!({
        "backends": [
            {
                "name": "gpu_fast",
                "base_url": base_url,
                "wire": wire,
                "capabilities": ["chat"],
                "concurrency": {"chat": chat_limit},
                "health": {"liveness": "/healthz", "readiness": "/readyz"},
                "default_model": "llama-3-8b-instruct",
                "model_aliases": {"fast": "llama-3-8b-instruct"}
            },
            {
                "name": "gpu_heavy",
                "base_url": "http://127.0.0.1:1",
                "capabilities": ["images"],
                "concurrency": {"images": 2},
                "health": {"liveness": "/healthz", "readiness": "/readyz"},
                "payload_policy": {"images_allow_base64": true}
            }
        ],
        "route_preferences": {"chat": ["gpu_fast"], "images": ["gpu_heavy"]}
    })
}

/// Counts how many chat requests actually reached the upstream.
#[derive(Clone, Default)]
pub struct UpstreamCounter(pub Arc<AtomicUsize>);

impl UpstreamCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Spawn a mock OpenAI-shaped upstream. Behavior per request body:
/// - `stream: false` → one-shot JSON `{"choices":[{"message":...}]}`;
/// - `stream: true` → a canned two-delta SSE stream;
/// - body containing `"hold": true` → sleeps 30 s before answering,
///   keeping the admission slot occupied.
pub async fn spawn_openai_upstream(counter: UpstreamCounter) -> String {
    async fn handler(
        counter: axum::extract::State<UpstreamCounter>,
        axum::Json(body): axum::Json<Value>,
    ) -> axum::response::Response {
        counter.0 .0.fetch_add(1, Ordering::SeqCst);

        if body.get("hold").and_then(Value::as_bool) == Some(true) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        if body.get("stream").and_then(Value::as_bool) == Some(true) {
            let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                       data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                       data: [DONE]\n\n";
            return axum::response::Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from(sse))
                .unwrap();
        }

        axum::Json(json!({
            "id": "chatcmpl-upstream",
            "object": "chat.completion",
            "model": body["model"],
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}]
        }))
        .into_response()
    }

    let app = Router::new()
        .route("/v1/chat/completions", post(handler))
        .with_state(counter);
    spawn_router(app).await
}

/// Spawn a mock upstream that sends SSE headers immediately and then
/// drips keep-alive deltas forever. Used for cancellation tests.
pub async fn spawn_dripping_upstream() -> String {
    async fn handler() -> axum::response::Response {
        let stream = futures_util::stream::unfold(0u64, |n| async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            let frame = format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"tick{n}\"}}}}]}}\n\n");
            Some((Ok::<_, std::convert::Infallible>(frame), n + 1))
        });
        axum::response::Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .body(Body::from_stream(stream))
            .unwrap()
    }

    let app = Router::new().route("/v1/chat/completions", post(handler));
    spawn_router(app).await
}

pub async fn spawn_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Build a bearer-authenticated request.
pub fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Read a JSON response body.
pub async fn body_json(response: axum::response::Response) -> Value {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
