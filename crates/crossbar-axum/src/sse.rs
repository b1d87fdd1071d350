//! SSE framing for the gateway's chat stream protocol.
//!
//! Frames are `data: <json>\n\n`; the stream ends with the literal
//! `data: [DONE]\n\n` sentinel after the terminal event.

use bytes::Bytes;
use crossbar_core::StreamEvent;

/// Frame one event.
#[must_use]
pub fn frame(event: &StreamEvent) -> Bytes {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

/// The terminating sentinel line.
#[must_use]
pub fn done_sentinel() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}
