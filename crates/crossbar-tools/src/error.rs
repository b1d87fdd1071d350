//! Tool bus failures that surface at the transport layer.
//!
//! A tool *running and failing* is not one of these — that is an `outcome:
//! "failed"` record returned with HTTP 200, to keep the transport honest.

use crossbar_core::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolBusError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("tool not allowed: {0}")]
    Denied(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("cannot write invocation log: {0}")]
    Log(#[from] std::io::Error),
}

impl From<ToolBusError> for GatewayError {
    fn from(err: ToolBusError) -> Self {
        match err {
            ToolBusError::NotFound(name) => GatewayError::ToolNotFound(name),
            ToolBusError::Denied(name) => GatewayError::ToolDenied(name),
            ToolBusError::InvalidArguments(msg) => GatewayError::InvalidArguments(msg),
            ToolBusError::Log(e) => GatewayError::Internal(format!("invocation log: {e}")),
        }
    }
}
