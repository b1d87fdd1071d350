//! Admission control: counted, non-blocking semaphores per
//! `(backend, route kind)`.
//!
//! There is no queue. A request either takes a slot immediately or is
//! rejected, and the rejection happens before any upstream socket is
//! opened. Slots release their permit on drop, so every exit path — normal
//! completion, upstream error, client disconnect mid-stream — returns
//! capacity without explicit bookkeeping.

use crate::domain::RouteKind;
use crate::registry::BackendRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

struct Entry {
    limit: u32,
    semaphore: Arc<Semaphore>,
}

/// Why an acquisition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionRejection {
    /// The semaphore is at zero.
    Overloaded,
    /// No entry exists for this `(backend, route kind)` key: the route kind
    /// is not admitted for this backend.
    NotAdmitted,
}

/// A held admission slot. Dropping it releases the permit.
#[derive(Debug)]
pub struct AdmissionSlot {
    backend: String,
    route_kind: RouteKind,
    permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionSlot {
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    #[must_use]
    pub fn route_kind(&self) -> RouteKind {
        self.route_kind
    }

    /// Release the slot explicitly. Equivalent to dropping it; consuming
    /// `self` makes a double release unrepresentable.
    pub fn release(mut self) {
        self.permit.take();
    }
}

/// Point-in-time counters for one admission key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStat {
    pub limit: u32,
    pub available: u32,
    pub inflight: u32,
}

/// The per-process admission table. Built from the registry at startup;
/// the key set never changes afterwards.
pub struct AdmissionController {
    entries: BTreeMap<(String, RouteKind), Entry>,
}

impl AdmissionController {
    /// One semaphore per declared `(backend, route kind)` limit.
    #[must_use]
    pub fn from_registry(registry: &BackendRegistry) -> Self {
        let mut entries = BTreeMap::new();
        for backend in registry.iter() {
            for kind in RouteKind::ALL {
                if let Some(limit) = backend.limit(kind) {
                    entries.insert(
                        (backend.name.clone(), kind),
                        Entry {
                            limit,
                            semaphore: Arc::new(Semaphore::new(limit as usize)),
                        },
                    );
                }
            }
        }
        Self { entries }
    }

    /// Try to take a slot. Non-blocking: the caller gets an answer now.
    pub fn try_acquire(
        &self,
        backend: &str,
        route_kind: RouteKind,
    ) -> Result<AdmissionSlot, AdmissionRejection> {
        let entry = self
            .entries
            .get(&(backend.to_string(), route_kind))
            .ok_or(AdmissionRejection::NotAdmitted)?;

        match entry.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(AdmissionSlot {
                backend: backend.to_string(),
                route_kind,
                permit: Some(permit),
            }),
            Err(TryAcquireError::NoPermits) => Err(AdmissionRejection::Overloaded),
            Err(TryAcquireError::Closed) => Err(AdmissionRejection::NotAdmitted),
        }
    }

    /// Counters for every key, keyed `"<backend>.<route_kind>"`. The map is
    /// ordered so the status endpoint renders stably.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, AdmissionStat> {
        self.entries
            .iter()
            .map(|((backend, kind), entry)| {
                let available = entry.semaphore.available_permits() as u32;
                (
                    format!("{backend}.{kind}"),
                    AdmissionStat {
                        limit: entry.limit,
                        available,
                        inflight: entry.limit - available,
                    },
                )
            })
            .collect()
    }
}
