//! Shared application state.

use crate::auth::IpAllowlist;
use crate::request_log::RequestLog;
use crossbar_core::{AdmissionController, BackendRegistry, HealthStore, Settings};
use crossbar_tools::ToolBus;
use crossbar_upstream::ImagesUpstream;
use std::sync::Arc;

/// Everything a handler needs, assembled once by `bootstrap`.
pub struct GatewayContext {
    pub settings: Settings,
    pub registry: Arc<BackendRegistry>,
    pub admission: AdmissionController,
    pub health: HealthStore,
    /// Shared outbound client (connection pool, TLS config).
    pub http: reqwest::Client,
    pub tools: ToolBus,
    pub images: ImagesUpstream,
    pub request_log: Option<RequestLog>,
    pub ui_allowlist: IpAllowlist,
}

pub type AppState = Arc<GatewayContext>;
