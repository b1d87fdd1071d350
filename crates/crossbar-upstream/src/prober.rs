//! The background health prober.
//!
//! One task per process. Each sweep walks the fleet serially (no
//! thundering-herd against a busy GPU box), probing liveness first and
//! readiness only when live, with a tight per-probe timeout. Results land
//! in the shared `HealthStore`; the request path never probes.

use crossbar_core::registry::{BackendConfig, BackendRegistry};
use crossbar_core::HealthStore;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn the probe loop. The first sweep runs immediately so the store
/// leaves optimistic mode quickly; afterwards the loop ticks on `interval`
/// until the token is cancelled.
pub fn spawn_health_checker(
    client: Client,
    registry: Arc<BackendRegistry>,
    store: HealthStore,
    interval: Duration,
    probe_timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "health checker started");
        loop {
            sweep(&client, &registry, &store, probe_timeout).await;

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("health checker stopped");
                    return;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    })
}

async fn sweep(
    client: &Client,
    registry: &BackendRegistry,
    store: &HealthStore,
    probe_timeout: Duration,
) {
    for backend in registry.iter() {
        let (healthy, ready, error) = probe_backend(client, backend, probe_timeout).await;
        if ready {
            debug!(backend = %backend.name, "backend ready");
        } else {
            warn!(backend = %backend.name, healthy, error = ?error, "backend not ready");
        }
        store.record(&backend.name, healthy, ready, error);
    }
}

async fn probe_backend(
    client: &Client,
    backend: &BackendConfig,
    probe_timeout: Duration,
) -> (bool, bool, Option<String>) {
    let base = backend.base_url_trimmed();

    let liveness_url = format!("{base}{}", backend.health.liveness);
    let healthy = match probe(client, &liveness_url, probe_timeout).await {
        Ok(()) => true,
        Err(e) => return (false, false, Some(format!("liveness check failed: {e}"))),
    };

    let readiness_url = format!("{base}{}", backend.health.readiness);
    match probe(client, &readiness_url, probe_timeout).await {
        Ok(()) => (healthy, true, None),
        Err(e) => (healthy, false, Some(format!("readiness check failed: {e}"))),
    }
}

async fn probe(client: &Client, url: &str, timeout: Duration) -> Result<(), String> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(format!("status {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use crossbar_core::registry::RegistryDocument;

    async fn serve(router: Router) -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), handle)
    }

    fn single_backend_registry(base_url: &str) -> Arc<BackendRegistry> {
        let doc: RegistryDocument = serde_json::from_value(serde_json::json!({
            "backends": [{
                "name": "probe_me",
                "base_url": base_url,
                "capabilities": ["chat"],
                "concurrency": {"chat": 1},
                "health": {"liveness": "/healthz", "readiness": "/readyz"}
            }]
        }))
        .unwrap();
        Arc::new(BackendRegistry::from_document(doc).unwrap())
    }

    #[tokio::test]
    async fn sweep_marks_live_and_ready() {
        let app = Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .route("/readyz", get(|| async { "ok" }));
        let (base, server) = serve(app).await;

        let registry = single_backend_registry(&base);
        let store = HealthStore::new();
        sweep(
            &Client::new(),
            &registry,
            &store,
            Duration::from_secs(2),
        )
        .await;

        let snap = store.snapshot("probe_me").unwrap();
        assert!(snap.healthy && snap.ready);
        assert!(snap.last_error.is_none());
        server.abort();
    }

    #[tokio::test]
    async fn failed_readiness_records_the_error() {
        let app = Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .route("/readyz", get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "warming up") }));
        let (base, server) = serve(app).await;

        let registry = single_backend_registry(&base);
        let store = HealthStore::new();
        sweep(&Client::new(), &registry, &store, Duration::from_secs(2)).await;

        let snap = store.snapshot("probe_me").unwrap();
        assert!(snap.healthy);
        assert!(!snap.ready);
        assert!(snap.last_error.as_deref().unwrap().starts_with("readiness check failed"));
        assert!(!store.is_routable("probe_me"));
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_backend_fails_liveness() {
        // Nothing listens here.
        let registry = single_backend_registry("http://127.0.0.1:1");
        let store = HealthStore::new();
        sweep(&Client::new(), &registry, &store, Duration::from_millis(500)).await;

        let snap = store.snapshot("probe_me").unwrap();
        assert!(!snap.healthy && !snap.ready);
        assert!(snap.last_error.as_deref().unwrap().starts_with("liveness check failed"));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let registry = single_backend_registry("http://127.0.0.1:1");
        let cancel = CancellationToken::new();
        let handle = spawn_health_checker(
            Client::new(),
            registry,
            HealthStore::new(),
            Duration::from_secs(3600),
            Duration::from_millis(200),
            cancel.clone(),
        );
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop exits after cancel")
            .unwrap();
    }
}
