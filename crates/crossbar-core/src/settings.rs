//! Process settings, loaded from the environment.
//!
//! Every knob has a default except the bearer token; the backend fleet
//! itself comes from the registry document (`GATEWAY_BEARER_TOKEN` and
//! `GATEWAY_BACKENDS_PATH` respectively). Settings are read once at startup
//! and shared immutably.

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which upstream family serves `/v1/images/generations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagesBackendKind {
    /// Deterministic placeholder SVGs; always available.
    Mock,
    /// Automatic1111-compatible `POST /sdapi/v1/txt2img`.
    HttpA1111,
    /// OpenAI-style `POST /v1/images/generations`.
    HttpOpenaiImages,
}

impl ImagesBackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ImagesBackendKind::Mock => "mock",
            ImagesBackendKind::HttpA1111 => "http_a1111",
            ImagesBackendKind::HttpOpenaiImages => "http_openai_images",
        }
    }
}

/// Where tool invocations are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolsLogMode {
    Ndjson,
    PerFile,
    Both,
    None,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// All process configuration. Immutable after load.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub bearer_token: String,
    /// Path to the registry JSON document; `None` selects the built-in
    /// three-backend fleet.
    pub backends_path: Option<PathBuf>,
    /// Allowed CORS origins; `None` allows all.
    pub cors_origins: Option<Vec<String>>,

    pub health_check_interval: Duration,
    pub health_probe_timeout: Duration,

    /// Backends whose upstream `thinking` payloads are surfaced as
    /// `thinking` events.
    pub emit_thinking_for: BTreeSet<String>,
    pub chat_read_timeout: Duration,
    pub embeddings_read_timeout: Duration,
    pub stream_idle_timeout: Duration,

    pub images_backend: ImagesBackendKind,
    /// Which registry backend serves images (admission + health gates).
    pub images_backend_class: String,
    pub images_http_base_url: String,
    pub images_openai_model: String,
    pub images_http_timeout: Duration,
    pub images_a1111_steps: u32,
    pub images_max_pixels: u64,
    pub ui_image_dir: PathBuf,
    /// Raw IP/CIDR entries gating `/ui/images`; empty disables the subtree.
    pub ui_ip_allowlist: Vec<String>,

    pub verify_tls: bool,
    pub ca_bundle: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,

    pub tools_log_mode: ToolsLogMode,
    pub tools_log_path: PathBuf,
    pub tools_log_dir: PathBuf,
    /// Explicit tool allowlist; when set, only these tools run.
    pub tools_allowlist: Option<BTreeSet<String>>,
    pub tools_allow_fs: bool,
    pub tools_allow_fs_write: bool,
    pub tools_allow_http_fetch: bool,
    pub tools_allow_system_info: bool,
    pub tools_allow_shell: bool,
    pub tools_allow_git: bool,
    pub tools_fs_roots: Vec<PathBuf>,
    pub tools_fs_max_bytes: usize,
    pub tools_http_allowed_hosts: BTreeSet<String>,
    pub tools_http_timeout: Duration,
    pub tools_http_max_bytes: usize,
    pub tools_shell_cwd: PathBuf,
    pub tools_shell_timeout: Duration,
    /// Executables the shell tool may launch; empty leaves the tool
    /// unconfigured even when its gate is open.
    pub tools_shell_allowed_cmds: BTreeSet<String>,
    pub tools_git_cwd: PathBuf,
    pub tools_git_timeout: Duration,

    pub request_log_enabled: bool,
    pub request_log_path: PathBuf,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let bearer_token = env::var("GATEWAY_BEARER_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(SettingsError::Missing("GATEWAY_BEARER_TOKEN"))?;

        let tools_shell_cwd = PathBuf::from(str_var("TOOLS_SHELL_CWD", "data/tools/work"));
        // The git tool shares the shell working directory unless pointed
        // elsewhere.
        let tools_git_cwd = env::var("TOOLS_GIT_CWD")
            .map(PathBuf::from)
            .unwrap_or_else(|_| tools_shell_cwd.clone());

        Ok(Self {
            host: str_var("GATEWAY_HOST", "0.0.0.0"),
            port: parse_var("GATEWAY_PORT", 8800)?,
            bearer_token,
            backends_path: env::var("GATEWAY_BACKENDS_PATH").ok().map(PathBuf::from),
            cors_origins: {
                let origins = list_var("GATEWAY_CORS_ORIGINS");
                if origins.is_empty() { None } else { Some(origins) }
            },

            health_check_interval: Duration::from_secs(parse_var(
                "HEALTH_CHECK_INTERVAL_SEC",
                30,
            )?),
            health_probe_timeout: Duration::from_secs(parse_var("HEALTH_PROBE_TIMEOUT_SEC", 2)?),

            emit_thinking_for: {
                let raw = str_var("EMIT_THINKING_FOR", "local_mlx");
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            },
            chat_read_timeout: Duration::from_secs(parse_var("CHAT_READ_TIMEOUT_SEC", 60)?),
            embeddings_read_timeout: Duration::from_secs(parse_var(
                "EMBEDDINGS_READ_TIMEOUT_SEC",
                60,
            )?),
            stream_idle_timeout: Duration::from_secs(parse_var("STREAM_IDLE_TIMEOUT_SEC", 60)?),

            images_backend: match str_var("IMAGES_BACKEND", "mock").as_str() {
                "mock" => ImagesBackendKind::Mock,
                "http_a1111" => ImagesBackendKind::HttpA1111,
                "http_openai_images" => ImagesBackendKind::HttpOpenaiImages,
                other => {
                    return Err(SettingsError::Invalid {
                        name: "IMAGES_BACKEND",
                        value: other.to_string(),
                        reason: "expected mock, http_a1111, or http_openai_images".into(),
                    });
                }
            },
            images_backend_class: str_var("IMAGES_BACKEND_CLASS", "gpu_heavy"),
            images_http_base_url: str_var("IMAGES_HTTP_BASE_URL", "http://127.0.0.1:7860"),
            images_openai_model: str_var("IMAGES_OPENAI_MODEL", ""),
            images_http_timeout: Duration::from_secs(parse_var("IMAGES_HTTP_TIMEOUT_SEC", 120)?),
            images_a1111_steps: parse_var("IMAGES_A1111_STEPS", 20)?,
            images_max_pixels: parse_var("IMAGES_MAX_PIXELS", 2_000_000)?,
            ui_image_dir: PathBuf::from(str_var("UI_IMAGE_DIR", "data/ui_images")),
            ui_ip_allowlist: list_var("UI_IP_ALLOWLIST"),

            verify_tls: bool_var("BACKEND_VERIFY_TLS", true)?,
            ca_bundle: env::var("BACKEND_CA_BUNDLE").ok().map(PathBuf::from),
            client_cert: env::var("BACKEND_CLIENT_CERT").ok().map(PathBuf::from),

            tools_log_mode: match str_var("TOOLS_LOG_MODE", "ndjson").as_str() {
                "ndjson" => ToolsLogMode::Ndjson,
                "per_file" => ToolsLogMode::PerFile,
                "both" => ToolsLogMode::Both,
                "none" => ToolsLogMode::None,
                other => {
                    return Err(SettingsError::Invalid {
                        name: "TOOLS_LOG_MODE",
                        value: other.to_string(),
                        reason: "expected ndjson, per_file, both, or none".into(),
                    });
                }
            },
            tools_log_path: PathBuf::from(str_var("TOOLS_LOG_PATH", "data/tools/invocations.jsonl")),
            tools_log_dir: PathBuf::from(str_var("TOOLS_LOG_DIR", "data/tools")),
            tools_allowlist: {
                let raw = str_var("TOOLS_ALLOWLIST", "");
                if raw.trim().is_empty() {
                    None
                } else {
                    Some(
                        raw.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                    )
                }
            },
            tools_allow_fs: bool_var("TOOLS_ALLOW_FS", false)?,
            tools_allow_fs_write: bool_var("TOOLS_ALLOW_FS_WRITE", false)?,
            tools_allow_http_fetch: bool_var("TOOLS_ALLOW_HTTP_FETCH", false)?,
            tools_allow_system_info: bool_var("TOOLS_ALLOW_SYSTEM_INFO", false)?,
            tools_allow_shell: bool_var("TOOLS_ALLOW_SHELL", false)?,
            tools_allow_git: bool_var("TOOLS_ALLOW_GIT", false)?,
            tools_fs_roots: list_var("TOOLS_FS_ROOTS").into_iter().map(PathBuf::from).collect(),
            tools_fs_max_bytes: parse_var("TOOLS_FS_MAX_BYTES", 200_000)?,
            tools_http_allowed_hosts: {
                let raw = str_var("TOOLS_HTTP_ALLOWED_HOSTS", "127.0.0.1,localhost");
                raw.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            },
            tools_http_timeout: Duration::from_secs(parse_var("TOOLS_HTTP_TIMEOUT_SEC", 10)?),
            tools_http_max_bytes: parse_var("TOOLS_HTTP_MAX_BYTES", 200_000)?,
            tools_shell_cwd,
            tools_shell_timeout: Duration::from_secs(parse_var("TOOLS_SHELL_TIMEOUT_SEC", 20)?),
            tools_shell_allowed_cmds: list_var("TOOLS_SHELL_ALLOWED_CMDS").into_iter().collect(),
            tools_git_cwd,
            tools_git_timeout: Duration::from_secs(parse_var("TOOLS_GIT_TIMEOUT_SEC", 20)?),

            request_log_enabled: bool_var("REQUEST_LOG_ENABLED", false)?,
            request_log_path: PathBuf::from(str_var("REQUEST_LOG_PATH", "data/requests.jsonl")),
        })
    }

    /// Settings with defaults and the given bearer token. Intended for
    /// tests and embedding; `from_env` is the production path.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8800,
            bearer_token: token.into(),
            backends_path: None,
            cors_origins: None,
            health_check_interval: Duration::from_secs(30),
            health_probe_timeout: Duration::from_secs(2),
            emit_thinking_for: BTreeSet::from(["local_mlx".to_string()]),
            chat_read_timeout: Duration::from_secs(60),
            embeddings_read_timeout: Duration::from_secs(60),
            stream_idle_timeout: Duration::from_secs(60),
            images_backend: ImagesBackendKind::Mock,
            images_backend_class: "gpu_heavy".into(),
            images_http_base_url: "http://127.0.0.1:7860".into(),
            images_openai_model: String::new(),
            images_http_timeout: Duration::from_secs(120),
            images_a1111_steps: 20,
            images_max_pixels: 2_000_000,
            ui_image_dir: PathBuf::from("data/ui_images"),
            ui_ip_allowlist: Vec::new(),
            verify_tls: true,
            ca_bundle: None,
            client_cert: None,
            tools_log_mode: ToolsLogMode::Ndjson,
            tools_log_path: PathBuf::from("data/tools/invocations.jsonl"),
            tools_log_dir: PathBuf::from("data/tools"),
            tools_allowlist: None,
            tools_allow_fs: false,
            tools_allow_fs_write: false,
            tools_allow_http_fetch: false,
            tools_allow_system_info: false,
            tools_allow_shell: false,
            tools_allow_git: false,
            tools_fs_roots: Vec::new(),
            tools_fs_max_bytes: 200_000,
            tools_http_allowed_hosts: BTreeSet::from(["127.0.0.1".to_string(), "localhost".to_string()]),
            tools_http_timeout: Duration::from_secs(10),
            tools_http_max_bytes: 200_000,
            tools_shell_cwd: PathBuf::from("data/tools/work"),
            tools_shell_timeout: Duration::from_secs(20),
            tools_shell_allowed_cmds: BTreeSet::new(),
            tools_git_cwd: PathBuf::from("data/tools/work"),
            tools_git_timeout: Duration::from_secs(20),
            request_log_enabled: false,
            request_log_path: PathBuf::from("data/requests.jsonl"),
        }
    }
}

fn str_var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| SettingsError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &'static str, default: bool) -> Result<bool, SettingsError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(SettingsError::Invalid {
                name,
                value: raw,
                reason: "expected a boolean".into(),
            }),
        },
        Err(_) => Ok(default),
    }
}
