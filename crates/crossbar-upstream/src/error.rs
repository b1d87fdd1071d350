//! Outbound failure taxonomy.

use crossbar_core::GatewayError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-2xx status.
    #[error("upstream returned {status}")]
    Http { status: u16, body: String },

    /// No response within the deadline.
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure: connect refused, TLS, connection reset.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// The upstream answered 2xx with a payload we cannot interpret.
    #[error("unexpected upstream payload: {0}")]
    Protocol(String),
}

impl UpstreamError {
    pub(crate) fn from_reqwest(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(deadline)
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Http { status, body } => GatewayError::UpstreamHttp { status, body },
            UpstreamError::Timeout(d) => GatewayError::UpstreamTimeout(format!("after {d:?}")),
            UpstreamError::Transport(msg) => GatewayError::UpstreamHttp {
                status: 502,
                body: msg,
            },
            UpstreamError::Protocol(msg) => GatewayError::UpstreamProtocol(msg),
        }
    }
}
