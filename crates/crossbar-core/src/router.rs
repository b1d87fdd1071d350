//! The router: a pure function from `(route kind, model hint)` to a
//! concrete backend and upstream model name.
//!
//! The router consults only the registry. Load and health are gates applied
//! by the caller afterwards — they never influence which backend is chosen,
//! so a given request routes identically on a busy gateway and an idle one.

use crate::domain::{RouteDecision, RouteKind, RouteReason};
use crate::error::GatewayError;
use crate::registry::{BackendConfig, BackendRegistry};

/// Decide where a request goes.
///
/// Resolution order:
/// 1. normalize the hint (trim, the `default` placeholder, legacy backend
///    names);
/// 2. a hint naming a backend pins it (`client_pinned`);
/// 3. a hint matching a model alias picks that alias's backend
///    (`alias_expanded`);
/// 4. otherwise the first capable backend from the preference table serves
///    the hint as an upstream model name (`capability_only`), or its
///    default model when the hint is empty (`default_preference`).
pub fn route(
    registry: &BackendRegistry,
    route_kind: RouteKind,
    model_hint: &str,
) -> Result<RouteDecision, GatewayError> {
    // Clients conventionally send "default" to mean "you pick"; it is an
    // empty hint, never an upstream model name.
    let hint = match model_hint.trim() {
        "default" => "",
        other => other,
    };
    let hint = registry.resolve_legacy(hint);

    // Step 2: direct backend pin.
    if let Some(backend) = registry.lookup(hint) {
        require_capability(backend, route_kind)?;
        return Ok(RouteDecision {
            backend: backend.name.clone(),
            backend_class: backend.class().to_string(),
            upstream_model: backend.default_model.clone().unwrap_or_default(),
            reason: RouteReason::ClientPinned,
        });
    }

    let candidates: Vec<&BackendConfig> = registry
        .preferences(route_kind)
        .into_iter()
        .filter(|b| b.supports(route_kind))
        .collect();

    // Step 3: alias expansion, in preference order.
    if !hint.is_empty() {
        for backend in &candidates {
            if let Some(upstream) = backend.model_aliases.get(hint) {
                return Ok(RouteDecision {
                    backend: backend.name.clone(),
                    backend_class: backend.class().to_string(),
                    upstream_model: upstream.clone(),
                    reason: RouteReason::AliasExpanded,
                });
            }
        }
    }

    // Step 4: first capable backend from the preference table.
    let Some(backend) = candidates.first() else {
        return Err(GatewayError::CapabilityNotSupported {
            backend_class: if hint.is_empty() {
                "none".to_string()
            } else {
                hint.to_string()
            },
            route_kind,
            supported: Vec::new(),
        });
    };

    if hint.is_empty() {
        Ok(RouteDecision {
            backend: backend.name.clone(),
            backend_class: backend.class().to_string(),
            upstream_model: backend.default_model.clone().unwrap_or_default(),
            reason: RouteReason::DefaultPreference,
        })
    } else {
        Ok(RouteDecision {
            backend: backend.name.clone(),
            backend_class: backend.class().to_string(),
            upstream_model: hint.to_string(),
            reason: RouteReason::CapabilityOnly,
        })
    }
}

fn require_capability(
    backend: &BackendConfig,
    route_kind: RouteKind,
) -> Result<(), GatewayError> {
    if backend.supports(route_kind) {
        Ok(())
    } else {
        Err(GatewayError::CapabilityNotSupported {
            backend_class: backend.class().to_string(),
            route_kind,
            supported: backend.capabilities.iter().copied().collect(),
        })
    }
}
