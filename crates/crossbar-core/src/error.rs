//! The gateway error taxonomy.
//!
//! Lower layers raise these typed errors; the axum adapter maps them to
//! HTTP exactly once. Each variant carries a stable `error` token that
//! appears verbatim in response bodies.

use crate::domain::RouteKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing or invalid bearer token")]
    AuthFailed,

    #[error("backend {backend_class} does not support {route_kind}")]
    CapabilityNotSupported {
        backend_class: String,
        route_kind: RouteKind,
        supported: Vec<RouteKind>,
    },

    #[error("{0}")]
    InvalidArguments(String),

    #[error("backend {backend_class} is at capacity for {route_kind}")]
    BackendOverloaded {
        backend_class: String,
        route_kind: RouteKind,
    },

    #[error("backend {backend} is not ready")]
    BackendNotReady {
        backend: String,
        health_error: Option<String>,
    },

    #[error("upstream returned {status}")]
    UpstreamHttp { status: u16, body: String },

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("tool not allowed: {0}")]
    ToolDenied(String),

    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The stable token surfaced as the `error` field of every error body.
    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            GatewayError::AuthFailed => "auth_failed",
            GatewayError::CapabilityNotSupported { .. } => "capability_not_supported",
            GatewayError::InvalidArguments(_) => "invalid_arguments",
            GatewayError::BackendOverloaded { .. } => "backend_overloaded",
            GatewayError::BackendNotReady { .. } => "backend_not_ready",
            GatewayError::UpstreamHttp { .. } => "upstream_http_error",
            GatewayError::UpstreamTimeout(_) => "upstream_timeout",
            GatewayError::UpstreamProtocol(_) => "upstream_protocol_error",
            GatewayError::ToolDenied(_) => "tool_denied",
            GatewayError::ToolNotFound(_) => "tool_not_found",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_stable() {
        let err = GatewayError::BackendOverloaded {
            backend_class: "gpu_heavy".into(),
            route_kind: RouteKind::Images,
        };
        assert_eq!(err.token(), "backend_overloaded");
        assert_eq!(
            err.to_string(),
            "backend gpu_heavy is at capacity for images"
        );
    }
}
