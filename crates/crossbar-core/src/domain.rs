//! Domain types shared across the gateway: route kinds, route decisions,
//! and the client-facing stream event protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of routable work.
///
/// Capabilities and route kinds are 1:1 in this gateway, so a single enum
/// serves both roles: a backend *declares* a set of these, and every request
/// *is* one of these. The two gates remain independent — a backend must both
/// declare the capability and carry a concurrency limit for it before a
/// request is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Chat,
    Embeddings,
    Images,
    Tts,
    Music,
    Video,
}

impl RouteKind {
    /// All route kinds, in declaration order.
    pub const ALL: [RouteKind; 6] = [
        RouteKind::Chat,
        RouteKind::Embeddings,
        RouteKind::Images,
        RouteKind::Tts,
        RouteKind::Music,
        RouteKind::Video,
    ];

    /// Stable lowercase token used in config documents, admission keys,
    /// and error bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RouteKind::Chat => "chat",
            RouteKind::Embeddings => "embeddings",
            RouteKind::Images => "images",
            RouteKind::Tts => "tts",
            RouteKind::Music => "music",
            RouteKind::Video => "video",
        }
    }

    /// Parse a config token. Unknown names are load-time errors, never
    /// runtime surprises.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "chat" => Some(RouteKind::Chat),
            "embeddings" => Some(RouteKind::Embeddings),
            "images" => Some(RouteKind::Images),
            "tts" => Some(RouteKind::Tts),
            "music" => Some(RouteKind::Music),
            "video" => Some(RouteKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the router picked the backend it picked.
///
/// The token set is closed and stable: these strings appear in the
/// `X-Router-Reason` header and in `route` stream events, and clients are
/// allowed to match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// The client's model hint named a backend directly.
    ClientPinned,
    /// The hint matched a configured model alias.
    AliasExpanded,
    /// The hint named an upstream model; the backend came from the
    /// preference table.
    CapabilityOnly,
    /// No hint; both backend and model are configured defaults.
    DefaultPreference,
}

impl RouteReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RouteReason::ClientPinned => "client_pinned",
            RouteReason::AliasExpanded => "alias_expanded",
            RouteReason::CapabilityOnly => "capability_only",
            RouteReason::DefaultPreference => "default_preference",
        }
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    /// Registry name of the chosen backend.
    pub backend: String,
    /// The backend's class label (often equal to the name).
    pub backend_class: String,
    /// Model name to send upstream.
    pub upstream_model: String,
    /// Stable reason token.
    pub reason: RouteReason,
}

/// One event in the gateway's client-facing chat stream protocol.
///
/// Wire order is strict: `route` first, then any number of `thinking` /
/// `delta`, then exactly one terminal `error` or `done`, then the
/// `data: [DONE]` sentinel emitted by the SSE framer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Route {
        backend: String,
        model: String,
        reason: String,
    },
    /// Chain-of-thought text. Emitted only for backends listed in
    /// `EMIT_THINKING_FOR`; never synthesized.
    Thinking { thinking: String },
    Delta { delta: String },
    Error { error: serde_json::Value },
    Done,
}

impl StreamEvent {
    /// Whether this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. } | StreamEvent::Done)
    }
}
