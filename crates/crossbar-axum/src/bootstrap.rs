//! Bootstrap — the composition root.
//!
//! The ONLY place where infrastructure is wired together: registry load,
//! admission table, health store + probe loop, outbound client, tool bus,
//! request log. Everything else receives the assembled `GatewayContext`.

use crate::auth::IpAllowlist;
use crate::request_log::RequestLog;
use crate::state::{AppState, GatewayContext};
use anyhow::{Context, Result};
use crossbar_core::{AdmissionController, BackendRegistry, HealthStore, RouteKind, Settings};
use crossbar_tools::builtin::build_bus;
use crossbar_upstream::{build_client, spawn_health_checker, ImagesUpstream, TlsOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A running gateway's handles.
pub struct Gateway {
    pub state: AppState,
    pub cancel: CancellationToken,
    pub health_task: JoinHandle<()>,
}

/// Assemble the full context and start the background health prober.
pub async fn bootstrap(settings: Settings) -> Result<Gateway> {
    let registry = Arc::new(match &settings.backends_path {
        Some(path) => {
            BackendRegistry::load(path).context("loading backend registry")?
        }
        None => BackendRegistry::builtin_default(),
    });
    info!(
        backends = registry.iter().count(),
        "backend registry loaded"
    );

    match registry.lookup(&settings.images_backend_class) {
        Some(b) if b.supports(RouteKind::Images) => {}
        _ => warn!(
            class = %settings.images_backend_class,
            "IMAGES_BACKEND_CLASS does not name an images-capable backend; image requests will be refused"
        ),
    }

    let tls = TlsOptions {
        verify: settings.verify_tls,
        ca_bundle: settings.ca_bundle.clone(),
        client_cert: settings.client_cert.clone(),
    };
    let http = build_client(&tls).context("building upstream HTTP client")?;

    let admission = AdmissionController::from_registry(&registry);
    let health = HealthStore::new();
    let cancel = CancellationToken::new();
    let health_task = spawn_health_checker(
        http.clone(),
        registry.clone(),
        health.clone(),
        settings.health_check_interval,
        settings.health_probe_timeout,
        cancel.clone(),
    );

    let tools = build_bus(&settings, http.clone()).context("opening tool logs")?;

    let images = ImagesUpstream {
        kind: settings.images_backend,
        base_url: settings.images_http_base_url.clone(),
        default_model: settings.images_openai_model.clone(),
        read_timeout: settings.images_http_timeout,
        a1111_steps: settings.images_a1111_steps,
    };

    let request_log = if settings.request_log_enabled {
        Some(RequestLog::open(&settings.request_log_path).context("opening request log")?)
    } else {
        None
    };

    let ui_allowlist =
        IpAllowlist::parse(&settings.ui_ip_allowlist).context("parsing UI_IP_ALLOWLIST")?;
    if ui_allowlist.is_empty() {
        info!("UI image subtree disabled (UI_IP_ALLOWLIST empty)");
    }

    let state = Arc::new(GatewayContext {
        settings,
        registry,
        admission,
        health,
        http,
        tools,
        images,
        request_log,
        ui_allowlist,
    });

    Ok(Gateway {
        state,
        cancel,
        health_task,
    })
}

/// Bind and serve until ctrl-c.
pub async fn start_server(settings: Settings) -> Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let gateway = bootstrap(settings).await?;
    let app = crate::routes::create_router(gateway.state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("crossbar gateway listening on http://{addr}");

    let cancel = gateway.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            cancel.cancel();
        }
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(gateway.cancel.clone().cancelled_owned())
    .await?;

    gateway.health_task.abort();
    info!("crossbar gateway shut down");
    Ok(())
}
