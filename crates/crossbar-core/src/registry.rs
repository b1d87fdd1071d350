//! The declarative backend registry.
//!
//! Loaded once from a JSON document at startup, validated, and never
//! mutated afterwards. The registry is the single source of truth for what
//! each backend can do, how many requests of each kind it may serve
//! concurrently, where its health endpoints live, and which client-visible
//! model names map onto it.

use crate::domain::RouteKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use url::Url;

/// How the upstream speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFamily {
    /// OpenAI-shaped paths; chat streams as SSE `chat.completion.chunk`s.
    #[default]
    Openai,
    /// Ollama-shaped paths; chat streams as newline-delimited JSON.
    LineJson,
}

/// Image payload policy for a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadPolicy {
    /// Preferred response format when the client does not ask. The gateway
    /// defaults to `url` either way; this exists so a registry can make the
    /// preference explicit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_format: Option<String>,
    /// Whether clients may opt into `b64_json` passthrough.
    #[serde(default)]
    pub images_allow_base64: bool,
}

/// Relative health-probe paths on the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPaths {
    pub liveness: String,
    pub readiness: String,
}

/// One backend as declared in the registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique name within the process.
    pub name: String,
    /// Coarse hardware-role label; defaults to the name.
    #[serde(default)]
    pub class: Option<String>,
    /// Absolute base URL of the upstream.
    pub base_url: String,
    #[serde(default)]
    pub wire: WireFamily,
    /// Declared capability set.
    pub capabilities: BTreeSet<RouteKind>,
    /// Route kind -> maximum concurrent in-flight requests. A kind absent
    /// here is not admitted even if declared as a capability.
    pub concurrency: BTreeMap<RouteKind, u32>,
    pub health: HealthPaths,
    /// Upstream model used when the client hint is empty.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Client-visible model name -> upstream model name.
    #[serde(default)]
    pub model_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub payload_policy: PayloadPolicy,
}

impl BackendConfig {
    /// The class label, falling back to the backend name.
    #[must_use]
    pub fn class(&self) -> &str {
        self.class.as_deref().unwrap_or(&self.name)
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn supports(&self, kind: RouteKind) -> bool {
        self.capabilities.contains(&kind)
    }

    #[must_use]
    pub fn limit(&self, kind: RouteKind) -> Option<u32> {
        self.concurrency.get(&kind).copied()
    }
}

/// The registry document as it appears on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub backends: Vec<BackendConfig>,
    /// Legacy backend names mapped to canonical names, applied at the
    /// router's edge only.
    #[serde(default)]
    pub legacy_names: BTreeMap<String, String>,
    /// Route kind -> ordered backend preference. Static; load and health
    /// are gates, not inputs.
    #[serde(default)]
    pub route_preferences: BTreeMap<RouteKind, Vec<String>>,
}

/// Registry document validation failure. Fatal at startup.
#[derive(Debug)]
pub struct RegistryError(pub String);

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid backend registry: {}", self.0)
    }
}

impl std::error::Error for RegistryError {}

/// The validated, immutable registry.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<BackendConfig>,
    legacy_names: BTreeMap<String, String>,
    route_preferences: BTreeMap<RouteKind, Vec<String>>,
}

impl BackendRegistry {
    /// Validate a document and build the registry.
    pub fn from_document(doc: RegistryDocument) -> Result<Self, RegistryError> {
        if doc.backends.is_empty() {
            return Err(RegistryError("no backends declared".into()));
        }

        let mut seen = BTreeSet::new();
        for backend in &doc.backends {
            if backend.name.trim().is_empty() {
                return Err(RegistryError("backend with empty name".into()));
            }
            if !seen.insert(backend.name.clone()) {
                return Err(RegistryError(format!(
                    "duplicate backend name: {}",
                    backend.name
                )));
            }

            let url = Url::parse(&backend.base_url).map_err(|e| {
                RegistryError(format!("backend {}: bad base_url: {e}", backend.name))
            })?;
            if url.host_str().is_none() {
                return Err(RegistryError(format!(
                    "backend {}: base_url must be absolute",
                    backend.name
                )));
            }

            for path in [&backend.health.liveness, &backend.health.readiness] {
                if !path.starts_with('/') {
                    return Err(RegistryError(format!(
                        "backend {}: health path {path:?} must be relative to base_url (start with '/')",
                        backend.name
                    )));
                }
            }

            for kind in &backend.capabilities {
                if !backend.concurrency.contains_key(kind) {
                    return Err(RegistryError(format!(
                        "backend {}: capability {kind} has no concurrency limit",
                        backend.name
                    )));
                }
            }
            for (kind, limit) in &backend.concurrency {
                if *limit == 0 {
                    return Err(RegistryError(format!(
                        "backend {}: concurrency limit for {kind} must be positive",
                        backend.name
                    )));
                }
            }
        }

        for (legacy, canonical) in &doc.legacy_names {
            if !seen.contains(canonical) {
                return Err(RegistryError(format!(
                    "legacy name {legacy:?} maps to unknown backend {canonical:?}"
                )));
            }
        }
        for (kind, names) in &doc.route_preferences {
            for name in names {
                if !seen.contains(name) {
                    return Err(RegistryError(format!(
                        "route preference for {kind} names unknown backend {name:?}"
                    )));
                }
            }
        }

        Ok(Self {
            backends: doc.backends,
            legacy_names: doc.legacy_names,
            route_preferences: doc.route_preferences,
        })
    }

    /// Load and validate a registry document from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RegistryError(format!("cannot read {}: {e}", path.display())))?;
        let doc: RegistryDocument = serde_json::from_str(&raw)
            .map_err(|e| RegistryError(format!("cannot parse {}: {e}", path.display())))?;
        Self::from_document(doc)
    }

    /// The built-in three-backend fleet used when no registry document is
    /// configured: a local CPU/MLX runtime, a small chat GPU, and a large
    /// image GPU.
    #[must_use]
    pub fn builtin_default() -> Self {
        let doc: RegistryDocument = serde_json::from_value(serde_json::json!({
            "backends": [
                {
                    "name": "local_mlx",
                    "base_url": "http://127.0.0.1:10240",
                    "wire": "line_json",
                    "capabilities": ["chat", "embeddings"],
                    "concurrency": {"chat": 2, "embeddings": 2},
                    "health": {"liveness": "/healthz", "readiness": "/readyz"},
                    "default_model": "mlx-community/gemma-2-9b-it-4bit"
                },
                {
                    "name": "gpu_fast",
                    "base_url": "http://127.0.0.1:11434",
                    "wire": "openai",
                    "capabilities": ["chat", "embeddings"],
                    "concurrency": {"chat": 4, "embeddings": 4},
                    "health": {"liveness": "/healthz", "readiness": "/readyz"},
                    "default_model": "llama-3-8b-instruct",
                    "model_aliases": {"fast": "llama-3-8b-instruct"}
                },
                {
                    "name": "gpu_heavy",
                    "base_url": "http://127.0.0.1:7860",
                    "wire": "openai",
                    "capabilities": ["images"],
                    "concurrency": {"images": 2},
                    "health": {"liveness": "/healthz", "readiness": "/readyz"},
                    "payload_policy": {"images_allow_base64": true}
                }
            ],
            "legacy_names": {"ollama": "gpu_fast", "mlx": "local_mlx"},
            "route_preferences": {
                "chat": ["gpu_fast", "local_mlx"],
                "embeddings": ["local_mlx", "gpu_fast"],
                "images": ["gpu_heavy"]
            }
        }))
        .expect("builtin registry document is well-formed");
        Self::from_document(doc).expect("builtin registry validates")
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Map a legacy backend name to its canonical name; identity when the
    /// name is already canonical or unknown.
    #[must_use]
    pub fn resolve_legacy<'a>(&'a self, name: &'a str) -> &'a str {
        self.legacy_names.get(name).map_or(name, String::as_str)
    }

    #[must_use]
    pub fn supports(&self, name: &str, kind: RouteKind) -> bool {
        self.lookup(name).is_some_and(|b| b.supports(kind))
    }

    #[must_use]
    pub fn limit(&self, name: &str, kind: RouteKind) -> Option<u32> {
        self.lookup(name).and_then(|b| b.limit(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.iter()
    }

    /// Ordered preference list for a route kind. Backends that declare the
    /// capability but appear in no preference list are appended in
    /// declaration order so every capable backend stays reachable.
    #[must_use]
    pub fn preferences(&self, kind: RouteKind) -> Vec<&BackendConfig> {
        let mut out: Vec<&BackendConfig> = Vec::new();
        if let Some(names) = self.route_preferences.get(&kind) {
            for name in names {
                if let Some(b) = self.lookup(name) {
                    out.push(b);
                }
            }
        }
        for b in &self.backends {
            if b.supports(kind) && !out.iter().any(|o| o.name == b.name) {
                out.push(b);
            }
        }
        out
    }

    /// Client-visible model ids: backend names, alias keys, and declared
    /// default models, deduplicated. Feeds `GET /v1/models`.
    #[must_use]
    pub fn client_visible_models(&self) -> Vec<ModelEntry> {
        let mut out: Vec<ModelEntry> = Vec::new();
        let mut push = |entry: ModelEntry| {
            if !out.iter().any(|e| e.id == entry.id) {
                out.push(entry);
            }
        };

        for b in &self.backends {
            push(ModelEntry {
                id: b.name.clone(),
                backend: b.name.clone(),
                upstream_model: b.default_model.clone(),
            });
            for (alias, upstream) in &b.model_aliases {
                push(ModelEntry {
                    id: alias.clone(),
                    backend: b.name.clone(),
                    upstream_model: Some(upstream.clone()),
                });
            }
            if let Some(model) = &b.default_model {
                push(ModelEntry {
                    id: model.clone(),
                    backend: b.name.clone(),
                    upstream_model: Some(model.clone()),
                });
            }
        }
        out
    }
}

/// One entry of the client-visible model list.
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: serde_json::Value) -> Result<BackendRegistry, RegistryError> {
        BackendRegistry::from_document(serde_json::from_value(json).unwrap())
    }

    #[test]
    fn builtin_registry_validates() {
        let reg = BackendRegistry::builtin_default();
        assert!(reg.lookup("gpu_fast").is_some());
        assert_eq!(reg.resolve_legacy("ollama"), "gpu_fast");
        assert_eq!(reg.resolve_legacy("gpu_fast"), "gpu_fast");
        assert!(reg.supports("gpu_heavy", RouteKind::Images));
        assert!(!reg.supports("gpu_heavy", RouteKind::Chat));
        assert_eq!(reg.limit("gpu_fast", RouteKind::Chat), Some(4));
        assert_eq!(reg.limit("gpu_fast", RouteKind::Images), None);
    }

    #[test]
    fn capability_without_limit_is_rejected() {
        let err = doc(serde_json::json!({
            "backends": [{
                "name": "a",
                "base_url": "http://127.0.0.1:1",
                "capabilities": ["chat", "images"],
                "concurrency": {"chat": 1},
                "health": {"liveness": "/l", "readiness": "/r"}
            }]
        }))
        .unwrap_err();
        assert!(err.0.contains("images"), "{}", err.0);
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let err = doc(serde_json::json!({
            "backends": [{
                "name": "a",
                "base_url": "localhost:1234",
                "capabilities": ["chat"],
                "concurrency": {"chat": 1},
                "health": {"liveness": "/l", "readiness": "/r"}
            }]
        }))
        .unwrap_err();
        assert!(err.0.contains("base_url"), "{}", err.0);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = doc(serde_json::json!({
            "backends": [{
                "name": "a",
                "base_url": "http://127.0.0.1:1",
                "capabilities": ["chat"],
                "concurrency": {"chat": 0},
                "health": {"liveness": "/l", "readiness": "/r"}
            }]
        }))
        .unwrap_err();
        assert!(err.0.contains("positive"), "{}", err.0);
    }

    #[test]
    fn dangling_legacy_name_is_rejected() {
        let err = doc(serde_json::json!({
            "backends": [{
                "name": "a",
                "base_url": "http://127.0.0.1:1",
                "capabilities": ["chat"],
                "concurrency": {"chat": 1},
                "health": {"liveness": "/l", "readiness": "/r"}
            }],
            "legacy_names": {"old": "missing"}
        }))
        .unwrap_err();
        assert!(err.0.contains("legacy"), "{}", err.0);
    }

    #[test]
    fn preferences_append_unlisted_capable_backends() {
        let reg = BackendRegistry::builtin_default();
        let chat: Vec<&str> = reg
            .preferences(RouteKind::Chat)
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(chat, vec!["gpu_fast", "local_mlx"]);
    }

    #[test]
    fn registry_loads_from_a_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backends.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "backends": [{
                    "name": "solo",
                    "base_url": "http://127.0.0.1:9",
                    "capabilities": ["chat"],
                    "concurrency": {"chat": 3},
                    "health": {"liveness": "/l", "readiness": "/r"}
                }]
            })
            .to_string(),
        )
        .unwrap();

        let reg = BackendRegistry::load(&path).unwrap();
        assert_eq!(reg.limit("solo", RouteKind::Chat), Some(3));

        assert!(BackendRegistry::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn client_visible_models_include_aliases() {
        let reg = BackendRegistry::builtin_default();
        let models = reg.client_visible_models();
        assert!(models.iter().any(|m| m.id == "fast"));
        assert!(models.iter().any(|m| m.id == "gpu_heavy"));
        assert!(models.iter().any(|m| m.id == "llama-3-8b-instruct"));
    }
}
