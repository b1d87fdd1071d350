//! Core domain for the crossbar gateway.
//!
//! This crate holds the policy engine of the request plane: the declarative
//! backend registry, the pure router, the admission controller, and the
//! health-snapshot store. It performs no network I/O; the outbound plane
//! lives in `crossbar-upstream` and the HTTP surface in `crossbar-axum`.

pub mod admission;
pub mod domain;
pub mod error;
pub mod health;
pub mod registry;
pub mod router;
pub mod settings;

pub use admission::{AdmissionController, AdmissionSlot, AdmissionStat};
pub use domain::{RouteDecision, RouteKind, RouteReason, StreamEvent};
pub use error::GatewayError;
pub use health::{HealthSnapshot, HealthStore};
pub use registry::{BackendConfig, BackendRegistry, PayloadPolicy, RegistryDocument, WireFamily};
pub use router::route;
pub use settings::{ImagesBackendKind, Settings, SettingsError, ToolsLogMode};
