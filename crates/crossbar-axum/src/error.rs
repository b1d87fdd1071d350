//! The single error → HTTP boundary.
//!
//! Every route handler returns `Result<Response, HttpError>`; typed errors
//! from lower layers convert in via `From` and are rendered here exactly
//! once. Bodies always carry a stable `error` token plus `message`, with
//! variant-specific fields (supported capabilities, health error, ...)
//! alongside.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use crossbar_core::GatewayError;
use serde_json::json;

/// Wrapper giving `GatewayError` an HTTP rendering.
#[derive(Debug)]
pub struct HttpError(pub GatewayError);

impl<E: Into<GatewayError>> From<E> for HttpError {
    fn from(err: E) -> Self {
        HttpError(err.into())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let err = self.0;
        let token = err.token();
        let message = err.to_string();

        let (status, retry_after, mut body) = match &err {
            GatewayError::AuthFailed => (StatusCode::UNAUTHORIZED, None, json!({})),
            GatewayError::CapabilityNotSupported {
                backend_class,
                route_kind,
                supported,
            } => (
                StatusCode::BAD_REQUEST,
                None,
                json!({
                    "backend_class": backend_class,
                    "route_kind": route_kind,
                    "supported_capabilities": supported,
                }),
            ),
            GatewayError::InvalidArguments(_) => (StatusCode::BAD_REQUEST, None, json!({})),
            GatewayError::BackendOverloaded {
                backend_class,
                route_kind,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                Some("5"),
                json!({
                    "backend_class": backend_class,
                    "route_kind": route_kind,
                }),
            ),
            GatewayError::BackendNotReady {
                backend,
                health_error,
            } => {
                let mut extra = json!({ "backend_class": backend });
                if let Some(health_error) = health_error {
                    extra["health_error"] = json!(health_error);
                }
                (StatusCode::SERVICE_UNAVAILABLE, Some("30"), extra)
            }
            GatewayError::UpstreamHttp { status, body } => {
                // 4xx from the upstream is the client's problem and is
                // echoed; anything else is a bad gateway.
                let code = if (400..500).contains(status) {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (
                    code,
                    None,
                    json!({ "upstream_status": status, "upstream_body": body }),
                )
            }
            GatewayError::UpstreamTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, None, json!({})),
            GatewayError::UpstreamProtocol(_) => (StatusCode::BAD_GATEWAY, None, json!({})),
            GatewayError::ToolDenied(_) => (StatusCode::FORBIDDEN, None, json!({})),
            GatewayError::ToolNotFound(_) => (StatusCode::NOT_FOUND, None, json!({})),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None, json!({})),
        };

        body["error"] = json!(token);
        body["message"] = json!(message);

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = seconds.parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbar_core::domain::RouteKind;

    #[test]
    fn overload_carries_retry_after() {
        let response = HttpError(GatewayError::BackendOverloaded {
            backend_class: "gpu_heavy".into(),
            route_kind: RouteKind::Images,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "5");
    }

    #[test]
    fn not_ready_carries_retry_after_30() {
        let response = HttpError(GatewayError::BackendNotReady {
            backend: "local_mlx".into(),
            health_error: Some("liveness check failed: Connection refused".into()),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[test]
    fn upstream_4xx_is_echoed_and_5xx_becomes_502() {
        let echoed = HttpError(GatewayError::UpstreamHttp {
            status: 404,
            body: "missing".into(),
        })
        .into_response();
        assert_eq!(echoed.status(), StatusCode::NOT_FOUND);

        let mapped = HttpError(GatewayError::UpstreamHttp {
            status: 500,
            body: "oops".into(),
        })
        .into_response();
        assert_eq!(mapped.status(), StatusCode::BAD_GATEWAY);
    }
}
