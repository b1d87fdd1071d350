//! Embeddings calls, normalized to the OpenAI response shape.

use crate::error::UpstreamError;
use crossbar_core::registry::{BackendConfig, WireFamily};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Call the backend's embeddings endpoint.
///
/// `input` is the client-supplied value (a string or an array of strings),
/// already shape-checked by the handler.
pub async fn embeddings(
    client: &Client,
    backend: &BackendConfig,
    model: &str,
    input: &Value,
    read_timeout: Duration,
) -> Result<Value, UpstreamError> {
    match backend.wire {
        WireFamily::Openai => {
            let url = format!("{}/v1/embeddings", backend.base_url_trimmed());
            let resp = client
                .post(url)
                .timeout(read_timeout)
                .json(&json!({ "model": model, "input": input }))
                .send()
                .await
                .map_err(|e| UpstreamError::from_reqwest(e, read_timeout))?;
            let status = resp.status();
            if !status.is_success() {
                let mut body = resp.text().await.unwrap_or_default();
                body.truncate(5000);
                return Err(UpstreamError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            resp.json()
                .await
                .map_err(|e| UpstreamError::Protocol(format!("invalid embeddings JSON: {e}")))
        }
        WireFamily::LineJson => {
            let url = format!("{}/api/embed", backend.base_url_trimmed());
            let texts = as_texts(input);
            let resp = client
                .post(url)
                .timeout(read_timeout)
                .json(&json!({ "model": model, "input": texts }))
                .send()
                .await
                .map_err(|e| UpstreamError::from_reqwest(e, read_timeout))?;
            let status = resp.status();
            if !status.is_success() {
                let mut body = resp.text().await.unwrap_or_default();
                body.truncate(5000);
                return Err(UpstreamError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            let payload: Value = resp
                .json()
                .await
                .map_err(|e| UpstreamError::Protocol(format!("invalid embeddings JSON: {e}")))?;

            let vectors = payload
                .get("embeddings")
                .and_then(Value::as_array)
                .ok_or_else(|| UpstreamError::Protocol("no embeddings in response".into()))?;

            let data: Vec<Value> = vectors
                .iter()
                .enumerate()
                .map(|(i, emb)| json!({"object": "embedding", "index": i, "embedding": emb}))
                .collect();
            Ok(json!({ "object": "list", "data": data, "model": model }))
        }
    }
}

fn as_texts(input: &Value) -> Vec<String> {
    match input {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
