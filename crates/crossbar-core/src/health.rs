//! Cached backend health state.
//!
//! The probe loop (in `crossbar-upstream`) is the only writer; the request
//! path reads. Until a backend's first probe completes the store reports it
//! as routable, so a gateway restart does not manufacture a cold-start
//! outage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Most recent probe result for one backend.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub ready: bool,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// Shared health-snapshot table. Cheap to clone; all clones see the same
/// state.
#[derive(Clone, Default)]
pub struct HealthStore {
    inner: Arc<RwLock<HashMap<String, HealthSnapshot>>>,
}

impl HealthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe outcome. Called only by the probe loop.
    pub fn record(&self, backend: &str, healthy: bool, ready: bool, error: Option<String>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let failures = if ready {
            0
        } else {
            guard
                .get(backend)
                .map_or(0, |s| s.consecutive_failures)
                .saturating_add(1)
        };
        guard.insert(
            backend.to_string(),
            HealthSnapshot {
                healthy,
                ready,
                last_check: Utc::now(),
                last_error: error,
                consecutive_failures: failures,
            },
        );
    }

    /// Latest snapshot for one backend, if any probe has completed.
    #[must_use]
    pub fn snapshot(&self, backend: &str) -> Option<HealthSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(backend)
            .cloned()
    }

    /// Whether requests may be routed to this backend right now.
    ///
    /// Optimistically true before the first probe completes; strictly the
    /// probed readiness afterwards.
    #[must_use]
    pub fn is_routable(&self, backend: &str) -> bool {
        self.snapshot(backend).is_none_or(|s| s.ready)
    }

    /// All snapshots, for the status endpoint.
    #[must_use]
    pub fn all(&self) -> HashMap<String, HealthSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
