//! Optional per-request JSONL instrumentation.
//!
//! One line per finished request: method, path, status, duration, and the
//! router decision headers when the handler set them. Writes are
//! serialized and flushed; a failing log never fails the request.

use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

pub struct RequestLog {
    file: Mutex<File>,
}

impl RequestLog {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn append(&self, line: &str) {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if guard
            .write_all(line.as_bytes())
            .and_then(|()| guard.write_all(b"\n"))
            .and_then(|()| guard.flush())
            .is_err()
        {
            warn!("request log write failed");
        }
    }
}

/// Middleware recording one line per request when the log is configured.
pub async fn record_request(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(log) = &state.request_log else {
        return next.run(request).await;
    };

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let mut line = json!({
        "ts": chrono::Utc::now().to_rfc3339(),
        "method": method,
        "path": path,
        "status": response.status().as_u16(),
        "duration_ms": start.elapsed().as_secs_f64() * 1000.0,
    });
    if let Some(backend) = header("x-backend-used") {
        line["backend"] = json!(backend);
    }
    if let Some(model) = header("x-model-used") {
        line["model"] = json!(model);
    }
    if let Some(reason) = header("x-router-reason") {
        line["reason"] = json!(reason);
    }
    log.append(&line.to_string());

    response
}
