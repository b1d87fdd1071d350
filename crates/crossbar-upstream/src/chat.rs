//! Chat calls and stream translation.
//!
//! Two upstream families exist: OpenAI-shaped servers that stream SSE
//! `chat.completion.chunk`s, and line-JSON servers (Ollama-style) that
//! stream newline-delimited objects. Both are re-framed on the fly into the
//! gateway's own event protocol (`thinking` / `delta` / `error` / `done`);
//! the `route` event is prepended by the HTTP layer, which knows the
//! decision.

use crate::error::UpstreamError;
use crate::models::ChatCompletionRequest;
use bytes::{Bytes, BytesMut};
use crossbar_core::registry::{BackendConfig, WireFamily};
use crossbar_core::StreamEvent;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn error_body(resp: reqwest::Response) -> String {
    let mut body = resp.text().await.unwrap_or_default();
    body.truncate(5000);
    body
}

/// Build the upstream request body for one family.
fn upstream_body(
    backend: &BackendConfig,
    req: &ChatCompletionRequest,
    upstream_model: &str,
    stream: bool,
) -> Value {
    match backend.wire {
        WireFamily::Openai => {
            let mut body = serde_json::to_value(req).unwrap_or_else(|_| json!({}));
            body["model"] = json!(upstream_model);
            body["stream"] = json!(stream);
            body
        }
        WireFamily::LineJson => {
            let mut body = json!({
                "model": upstream_model,
                "messages": req.messages,
                "stream": stream,
            });
            if let Some(t) = req.temperature {
                body["options"] = json!({ "temperature": t });
            }
            body
        }
    }
}

fn chat_url(backend: &BackendConfig) -> String {
    match backend.wire {
        WireFamily::Openai => format!("{}/v1/chat/completions", backend.base_url_trimmed()),
        WireFamily::LineJson => format!("{}/api/chat", backend.base_url_trimmed()),
    }
}

/// One-shot (non-streaming) chat completion, normalized to the OpenAI
/// response shape regardless of family.
pub async fn chat_completion(
    client: &Client,
    backend: &BackendConfig,
    req: &ChatCompletionRequest,
    upstream_model: &str,
    read_timeout: Duration,
) -> Result<Value, UpstreamError> {
    let body = upstream_body(backend, req, upstream_model, false);
    let resp = client
        .post(chat_url(backend))
        .timeout(read_timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| UpstreamError::from_reqwest(e, read_timeout))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(UpstreamError::Http {
            status: status.as_u16(),
            body: error_body(resp).await,
        });
    }

    let payload: Value = resp
        .json()
        .await
        .map_err(|e| UpstreamError::Protocol(format!("invalid JSON from upstream: {e}")))?;

    match backend.wire {
        WireFamily::Openai => Ok(payload),
        WireFamily::LineJson => {
            let message = payload
                .get("message")
                .cloned()
                .ok_or_else(|| UpstreamError::Protocol("missing message in chat response".into()))?;
            let finish = payload
                .get("done_reason")
                .and_then(Value::as_str)
                .unwrap_or("stop");
            Ok(json!({
                "id": new_id("chatcmpl"),
                "object": "chat.completion",
                "created": now_unix(),
                "model": upstream_model,
                "choices": [{"index": 0, "message": message, "finish_reason": finish}],
                "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0},
            }))
        }
    }
}

/// Open a streaming chat call. The response status has already been
/// checked; the body is the raw upstream stream.
pub async fn open_chat_stream(
    client: &Client,
    backend: &BackendConfig,
    req: &ChatCompletionRequest,
    upstream_model: &str,
) -> Result<reqwest::Response, UpstreamError> {
    let body = upstream_body(backend, req, upstream_model, true);
    let resp = client
        .post(chat_url(backend))
        .header("accept", "text/event-stream")
        .json(&body)
        .send()
        .await
        .map_err(|e| UpstreamError::from_reqwest(e, Duration::ZERO))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(UpstreamError::Http {
            status: status.as_u16(),
            body: error_body(resp).await,
        });
    }
    Ok(resp)
}

/// Translate an open upstream response into gateway stream events.
pub fn translate_chat_stream(
    backend: &BackendConfig,
    response: reqwest::Response,
    emit_thinking: bool,
    idle_timeout: Duration,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    translate_bytes(
        backend.wire,
        response.bytes_stream().boxed(),
        emit_thinking,
        idle_timeout,
    )
}

struct TranslateState<S> {
    stream: S,
    buf: BytesMut,
    pending: VecDeque<StreamEvent>,
    wire: WireFamily,
    emit_thinking: bool,
    idle_timeout: Duration,
    upstream_done: bool,
    finished: bool,
}

/// Core translator, generic over the byte source so tests can feed canned
/// chunks split at arbitrary boundaries.
///
/// Guarantees: at most one terminal event (`error` or `done`), always
/// present, always last; deltas already emitted stay emitted.
pub fn translate_bytes<S, E>(
    wire: WireFamily,
    upstream: S,
    emit_thinking: bool,
    idle_timeout: Duration,
) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = TranslateState {
        stream: upstream,
        buf: BytesMut::new(),
        pending: VecDeque::new(),
        wire,
        emit_thinking,
        idle_timeout,
        upstream_done: false,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(event) = st.pending.pop_front() {
                if event.is_terminal() {
                    st.finished = true;
                }
                return Some((event, st));
            }

            if let Some(line) = take_line(&mut st.buf) {
                push_line_events(&mut st, &line);
                continue;
            }

            if st.upstream_done {
                // Upstream ended without a done marker; close cleanly.
                st.pending.push_back(StreamEvent::Done);
                continue;
            }

            match tokio::time::timeout(st.idle_timeout, st.stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    st.buf.extend_from_slice(&chunk);
                }
                Ok(Some(Err(e))) => {
                    warn!("upstream stream error: {e}");
                    st.pending.push_back(StreamEvent::Error {
                        error: json!({
                            "code": "upstream_protocol_error",
                            "message": format!("upstream stream failed: {e}"),
                        }),
                    });
                }
                Ok(None) => {
                    st.upstream_done = true;
                    // Flush a trailing unterminated line, if any.
                    if !st.buf.is_empty() {
                        let rest = st.buf.split().freeze();
                        let line = String::from_utf8_lossy(&rest).to_string();
                        push_line_events(&mut st, &line);
                    }
                }
                Err(_) => {
                    st.pending.push_back(StreamEvent::Error {
                        error: json!({
                            "code": "upstream_timeout",
                            "message": format!(
                                "no upstream bytes for {}s",
                                st.idle_timeout.as_secs()
                            ),
                        }),
                    });
                }
            }
        }
    })
}

/// Split one `\n`-terminated line off the buffer.
fn take_line(buf: &mut BytesMut) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let line = buf.split_to(pos + 1);
    Some(String::from_utf8_lossy(&line).to_string())
}

fn push_line_events<S>(st: &mut TranslateState<S>, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return;
    }
    match st.wire {
        WireFamily::Openai => push_openai_line(st, trimmed),
        WireFamily::LineJson => push_line_json(st, trimmed),
    }
}

/// One SSE line from an OpenAI-shaped upstream.
fn push_openai_line<S>(st: &mut TranslateState<S>, line: &str) {
    let Some(data) = line.strip_prefix("data:") else {
        return;
    };
    let data = data.trim();

    if data == "[DONE]" {
        st.pending.push_back(StreamEvent::Done);
        return;
    }

    let Ok(chunk) = serde_json::from_str::<Value>(data) else {
        return;
    };

    if let Some(error) = chunk.get("error") {
        st.pending.push_back(StreamEvent::Error {
            error: error.clone(),
        });
        return;
    }

    let content = chunk["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or("");
    if !content.is_empty() {
        st.pending.push_back(StreamEvent::Delta {
            delta: content.to_string(),
        });
    }
}

/// One NDJSON line from a line-JSON upstream. A single line can carry
/// thinking text, content, and the done marker at once; events are queued
/// in that order.
fn push_line_json<S>(st: &mut TranslateState<S>, line: &str) {
    let Ok(obj) = serde_json::from_str::<Value>(line) else {
        return;
    };

    if st.emit_thinking {
        if let Some(thinking) = obj.get("thinking").and_then(Value::as_str) {
            if !thinking.is_empty() {
                st.pending.push_back(StreamEvent::Thinking {
                    thinking: thinking.to_string(),
                });
            }
        }
    }

    let content = obj["message"]["content"]
        .as_str()
        .or_else(|| obj.get("response").and_then(Value::as_str))
        .unwrap_or("");
    if !content.is_empty() {
        st.pending.push_back(StreamEvent::Delta {
            delta: content.to_string(),
        });
    }

    if obj.get("done").and_then(Value::as_bool) == Some(true) {
        st.pending.push_back(StreamEvent::Done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        let owned: Vec<Result<Bytes, Infallible>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        stream::iter(owned)
    }

    async fn collect(s: impl Stream<Item = StreamEvent>) -> Vec<StreamEvent> {
        futures_util::pin_mut!(s);
        let mut out = Vec::new();
        while let Some(ev) = s.next().await {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn openai_sse_translates_deltas_in_order() {
        let upstream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let events = collect(translate_bytes(
            WireFamily::Openai,
            upstream,
            false,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta { delta: "Hel".into() },
                StreamEvent::Delta { delta: "lo".into() },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn frames_split_across_chunks_reassemble() {
        let upstream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"Hi\"}}]}\n\ndata: [DO",
            "NE]\n\n",
        ]);
        let events = collect(translate_bytes(
            WireFamily::Openai,
            upstream,
            false,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::Delta { delta: "Hi".into() }, StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn empty_deltas_are_suppressed() {
        let upstream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let events = collect(translate_bytes(
            WireFamily::Openai,
            upstream,
            false,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn line_json_maps_content_and_done() {
        let upstream = chunks(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"po\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"ng\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        ]);
        let events = collect(translate_bytes(
            WireFamily::LineJson,
            upstream,
            false,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta { delta: "po".into() },
                StreamEvent::Delta { delta: "ng".into() },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn thinking_is_gated_by_configuration() {
        let lines = [
            "{\"thinking\":\"mull\",\"message\":{\"content\":\"\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"ok\"},\"done\":true}\n",
        ];

        let with = collect(translate_bytes(
            WireFamily::LineJson,
            chunks(&lines),
            true,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(
            with,
            vec![
                StreamEvent::Thinking { thinking: "mull".into() },
                StreamEvent::Delta { delta: "ok".into() },
                StreamEvent::Done,
            ]
        );

        let without = collect(translate_bytes(
            WireFamily::LineJson,
            chunks(&lines),
            false,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(
            without,
            vec![StreamEvent::Delta { delta: "ok".into() }, StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn eof_without_done_synthesizes_done() {
        let upstream = chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"]);
        let events = collect(translate_bytes(
            WireFamily::Openai,
            upstream,
            false,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::Delta { delta: "x".into() }, StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn upstream_error_event_terminates() {
        let upstream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"boom\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
        ]);
        let events = collect(translate_bytes(
            WireFamily::Openai,
            upstream,
            false,
            Duration::from_secs(5),
        ))
        .await;
        // Partial text stays delivered; the error terminates; nothing follows.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Delta { delta: "par".into() });
        match &events[1] {
            StreamEvent::Error { error } => assert_eq!(error["message"], "boom"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nothing_after_done_marker_is_emitted() {
        let upstream = chunks(&[
            "{\"message\":{\"content\":\"hi\"},\"done\":true}\n",
            "{\"message\":{\"content\":\"late\"},\"done\":false}\n",
        ]);
        let events = collect(translate_bytes(
            WireFamily::LineJson,
            upstream,
            false,
            Duration::from_secs(5),
        ))
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::Delta { delta: "hi".into() }, StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn idle_gap_emits_timeout_error() {
        let slow = stream::unfold(0u8, |n| async move {
            if n == 0 {
                Some((
                    Ok::<Bytes, Infallible>(Bytes::from_static(
                        b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
                    )),
                    1,
                ))
            } else {
                tokio::time::sleep(Duration::from_secs(60)).await;
                None
            }
        });
        tokio::time::pause();
        let events_fut = collect(translate_bytes(
            WireFamily::Openai,
            Box::pin(slow),
            false,
            Duration::from_millis(50),
        ));
        let events = events_fut.await;
        assert_eq!(events[0], StreamEvent::Delta { delta: "a".into() });
        match &events[1] {
            StreamEvent::Error { error } => {
                assert_eq!(error["code"], "upstream_timeout");
            }
            other => panic!("expected timeout error, got {other:?}"),
        }
        assert_eq!(events.len(), 2);
    }
}
