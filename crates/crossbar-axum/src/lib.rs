//! Axum HTTP surface for the crossbar gateway.
//!
//! The request plane in one place: bearer-gated `/v1/*` routes, the SSE
//! chat proxy, the images pipeline with content-addressed storage, the
//! tool bus endpoints, and the status endpoint. `bootstrap` is the
//! composition root; nothing else wires infrastructure together.

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod request_log;
pub mod routes;
pub mod sse;
pub mod state;
pub mod storage;

pub use bootstrap::{bootstrap, start_server, Gateway};
pub use error::HttpError;
pub use routes::create_router;
pub use state::{AppState, GatewayContext};
