//! Built-in tools.
//!
//! Each tool is deterministic in its logged form and defensive about its
//! inputs: filesystem access is confined to configured roots, HTTP fetches
//! to an explicit host allowlist, and everything is size-capped. Gates
//! default to off; `echo` alone is always permitted.

use crate::bus::{Tool, ToolBus, ToolDescriptor, ToolOutcome, ToolPolicy};
use crate::log::InvocationLog;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbar_core::Settings;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Derive the runtime policy from settings. An explicit allowlist
/// overrides the per-tool gates entirely.
#[must_use]
pub fn policy_from_settings(settings: &Settings) -> ToolPolicy {
    let mut enabled = BTreeSet::from(["echo".to_string()]);
    if settings.tools_allow_system_info {
        enabled.insert("system_info".to_string());
    }
    if settings.tools_allow_fs {
        enabled.insert("read_file".to_string());
        if settings.tools_allow_fs_write {
            enabled.insert("write_file".to_string());
        }
    }
    if settings.tools_allow_http_fetch {
        enabled.insert("http_fetch".to_string());
    }
    if settings.tools_allow_shell {
        enabled.insert("shell".to_string());
    }
    if settings.tools_allow_git {
        enabled.insert("git".to_string());
    }

    ToolPolicy {
        allowlist: settings.tools_allowlist.clone(),
        enabled,
    }
}

/// Build the full bus: policy, log sinks, and every built-in registered.
pub fn build_bus(settings: &Settings, client: Client) -> std::io::Result<ToolBus> {
    let log = match settings.tools_log_mode {
        crossbar_core::ToolsLogMode::None => InvocationLog::disabled(),
        mode => InvocationLog::open(mode, &settings.tools_log_path, &settings.tools_log_dir)?,
    };

    let mut bus = ToolBus::new(policy_from_settings(settings), log);
    bus.register(Arc::new(EchoTool));
    bus.register(Arc::new(SystemInfoTool));
    bus.register(Arc::new(ReadFileTool {
        roots: settings.tools_fs_roots.clone(),
        max_bytes: settings.tools_fs_max_bytes,
    }));
    bus.register(Arc::new(WriteFileTool {
        roots: settings.tools_fs_roots.clone(),
        max_bytes: settings.tools_fs_max_bytes,
    }));
    bus.register(Arc::new(HttpFetchTool {
        client,
        allowed_hosts: settings.tools_http_allowed_hosts.clone(),
        timeout: settings.tools_http_timeout,
        max_bytes: settings.tools_http_max_bytes,
    }));
    bus.register(Arc::new(ShellTool {
        cwd: settings.tools_shell_cwd.clone(),
        timeout: settings.tools_shell_timeout,
        allowed_cmds: settings.tools_shell_allowed_cmds.clone(),
    }));
    bus.register(Arc::new(GitTool {
        cwd: settings.tools_git_cwd.clone(),
        timeout: settings.tools_git_timeout,
    }));
    Ok(bus)
}

// ─────────────────────────────────────────────────────────────────────────
// echo
// ─────────────────────────────────────────────────────────────────────────

/// Returns its arguments. Exists so the bus's determinism contract can be
/// exercised with zero side effects.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "echo",
            description: "Return the arguments unchanged.",
            parameters: json!({
                "type": "object",
                "additionalProperties": true
            }),
        }
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutcome, String> {
        Ok(ToolOutcome::Ok(args.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// system_info
// ─────────────────────────────────────────────────────────────────────────

/// Coarse process facts. No hardware probing.
pub struct SystemInfoTool;

#[async_trait]
impl Tool for SystemInfoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "system_info",
            description: "Report OS, architecture, and process facts.",
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, _args: &Value) -> Result<ToolOutcome, String> {
        Ok(ToolOutcome::Ok(json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
            "pid": std::process::id(),
            "available_parallelism": std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
        })))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// read_file / write_file
// ─────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

pub struct ReadFileTool {
    pub roots: Vec<PathBuf>,
    pub max_bytes: usize,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "read_file",
            description: "Read a text file under the configured roots.",
            parameters: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutcome, String> {
        let args: ReadFileArgs =
            serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
        if args.path.is_empty() {
            return Err("path must be a non-empty string".into());
        }

        let resolved = match resolve_in_roots(&args.path, &self.roots, false) {
            Ok(p) => p,
            Err(reason) => return Ok(failed(&reason)),
        };

        match std::fs::read(&resolved) {
            Ok(mut data) => {
                let truncated = data.len() > self.max_bytes;
                data.truncate(self.max_bytes);
                let content = String::from_utf8_lossy(&data).to_string();
                Ok(ToolOutcome::Ok(json!({
                    "path": resolved.display().to_string(),
                    "truncated": truncated,
                    "content": content,
                })))
            }
            Err(e) => Ok(failed(&format!("cannot read {}: {e}", resolved.display()))),
        }
    }
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

pub struct WriteFileTool {
    pub roots: Vec<PathBuf>,
    pub max_bytes: usize,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "write_file",
            description: "Write a text file under the configured roots.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutcome, String> {
        let args: WriteFileArgs =
            serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
        if args.path.is_empty() {
            return Err("path must be a non-empty string".into());
        }
        if args.content.len() > self.max_bytes {
            return Ok(failed(&format!(
                "content too large (>{} bytes)",
                self.max_bytes
            )));
        }

        let resolved = match resolve_in_roots(&args.path, &self.roots, true) {
            Ok(p) => p,
            Err(reason) => return Ok(failed(&reason)),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return Ok(failed(&format!("cannot create {}: {e}", parent.display())));
            }
        }
        match std::fs::write(&resolved, args.content) {
            Ok(()) => Ok(ToolOutcome::Ok(json!({
                "path": resolved.display().to_string()
            }))),
            Err(e) => Ok(failed(&format!("cannot write {}: {e}", resolved.display()))),
        }
    }
}

/// Resolve a path and confirm it stays inside one of the allowed roots.
///
/// For writes the file may not exist yet, so containment is checked
/// against the canonicalized parent.
fn resolve_in_roots(raw: &str, roots: &[PathBuf], for_write: bool) -> Result<PathBuf, String> {
    let first_root = roots
        .first()
        .ok_or_else(|| "fs tool not configured (TOOLS_FS_ROOTS empty)".to_string())?;

    let candidate = {
        let p = Path::new(raw);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            first_root.join(p)
        }
    };

    let check_target = if for_write {
        let parent = candidate
            .parent()
            .ok_or_else(|| "path has no parent".to_string())?;
        // The parent may not exist yet either; walk up to the nearest
        // existing ancestor for the containment check.
        let mut probe = parent.to_path_buf();
        while !probe.exists() {
            probe = match probe.parent() {
                Some(p) => p.to_path_buf(),
                None => return Err("path outside allowed roots".into()),
            };
        }
        probe
    } else {
        candidate.clone()
    };

    let canonical = check_target
        .canonicalize()
        .map_err(|e| format!("cannot resolve {}: {e}", check_target.display()))?;

    for root in roots {
        if let Ok(root) = root.canonicalize() {
            if canonical.starts_with(&root) {
                return Ok(candidate);
            }
        }
    }
    Err("path outside allowed roots".into())
}

// ─────────────────────────────────────────────────────────────────────────
// shell / git
// ─────────────────────────────────────────────────────────────────────────

/// Captured output is capped to the last chunk, as a tail: when a command
/// is noisy the end of its output is the useful part.
const SUBPROCESS_CAPTURE_CHARS: usize = 20_000;

#[derive(Deserialize)]
struct ShellArgs {
    cmd: String,
}

/// Run one allowlisted executable with shell-style word splitting but no
/// shell interpretation.
pub struct ShellTool {
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub allowed_cmds: BTreeSet<String>,
}

#[async_trait]
impl Tool for ShellTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "shell",
            description: "Run an allowlisted command locally (no shell interpretation).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "cmd": {"type": "string", "description": "Command line to execute."}
                },
                "required": ["cmd"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutcome, String> {
        let args: ShellArgs = serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
        if args.cmd.trim().is_empty() {
            return Err("cmd must be a non-empty string".into());
        }
        if self.allowed_cmds.is_empty() {
            return Ok(failed(
                "shell tool not configured (TOOLS_SHELL_ALLOWED_CMDS empty)",
            ));
        }

        let words = match split_words(&args.cmd) {
            Ok(words) if !words.is_empty() => words,
            Ok(_) => return Err("cmd must be a non-empty string".into()),
            Err(reason) => return Ok(failed(&reason)),
        };
        if !self.allowed_cmds.contains(&words[0]) {
            return Ok(failed(&format!("command not allowed: {}", words[0])));
        }

        run_captured(&words[0], &words[1..], &self.cwd, self.timeout).await
    }
}

#[derive(Deserialize)]
struct GitArgs {
    args: Vec<String>,
}

/// Read-only git subcommands in a configured repository directory.
pub struct GitTool {
    pub cwd: PathBuf,
    pub timeout: Duration,
}

const GIT_ALLOWED_SUBCOMMANDS: &[&str] =
    &["status", "diff", "log", "show", "rev-parse", "ls-files"];

#[async_trait]
impl Tool for GitTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "git",
            description: "Run a limited set of git subcommands in a configured repo directory.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "args": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["args"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutcome, String> {
        let args: GitArgs = serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
        if args.args.is_empty() || args.args.iter().any(String::is_empty) {
            return Err("args must be a non-empty list of non-empty strings".into());
        }

        let subcommand = args.args[0].trim();
        if !GIT_ALLOWED_SUBCOMMANDS.contains(&subcommand) {
            return Ok(failed(&format!("git subcommand not allowed: {subcommand}")));
        }

        run_captured("git", &args.args, &self.cwd, self.timeout).await
    }
}

/// Spawn a program, wait with a deadline, and capture its output.
///
/// The child is killed if the deadline passes (the spawned future holds
/// `kill_on_drop`). Spawn failures are tool failures, not transport
/// errors.
async fn run_captured(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<ToolOutcome, String> {
    if let Err(e) = std::fs::create_dir_all(cwd) {
        return Ok(failed(&format!("cannot create {}: {e}", cwd.display())));
    }

    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(out)) => Ok(ToolOutcome::Ok(json!({
            "returncode": out.status.code(),
            "stdout": tail_lossy(&out.stdout),
            "stderr": tail_lossy(&out.stderr),
        }))),
        Ok(Err(e)) => Ok(failed(&format!("cannot run {program}: {e}"))),
        Err(_) => Ok(failed(&format!("timeout after {}s", timeout.as_secs()))),
    }
}

fn tail_lossy(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.char_indices().nth_back(SUBPROCESS_CAPTURE_CHARS - 1) {
        Some((idx, _)) if idx > 0 => text[idx..].to_string(),
        _ => text.into_owned(),
    }
}

/// Split a command line into words: whitespace-separated, with single and
/// double quotes and backslash escapes. No globbing, no substitution.
fn split_words(cmd: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = cmd.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err("unterminated single quote".into()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err("unterminated double quote".into()),
                        },
                        Some(inner) => current.push(inner),
                        None => return Err("unterminated double quote".into()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err("trailing backslash".into()),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

// ─────────────────────────────────────────────────────────────────────────
// http_fetch
// ─────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct HttpFetchArgs {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<std::collections::BTreeMap<String, String>>,
}

pub struct HttpFetchTool {
    pub client: Client,
    pub allowed_hosts: BTreeSet<String>,
    pub timeout: Duration,
    pub max_bytes: usize,
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "http_fetch",
            description: "GET a URL, restricted to allowlisted hosts, with a size cap.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "method": {"type": "string", "enum": ["GET"]},
                    "headers": {"type": "object", "additionalProperties": {"type": "string"}}
                },
                "required": ["url"],
                "additionalProperties": false
            }),
        }
    }

    async fn invoke(&self, args: &Value) -> Result<ToolOutcome, String> {
        let args: HttpFetchArgs =
            serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;

        if let Some(method) = &args.method {
            if !method.eq_ignore_ascii_case("get") {
                return Err("only GET is supported".into());
            }
        }

        let url = match url::Url::parse(&args.url) {
            Ok(u) => u,
            Err(e) => return Err(format!("invalid url: {e}")),
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Ok(failed("only http/https URLs are allowed"));
        }
        let host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return Ok(failed("url must include a hostname")),
        };
        if !self.allowed_hosts.contains(&host) {
            return Ok(failed(&format!("host not allowed: {host}")));
        }

        let mut req = self.client.get(url).timeout(self.timeout);
        if let Some(headers) = &args.headers {
            for (k, v) in headers {
                req = req.header(k, v);
            }
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return Ok(failed(&format!("request failed: {e}"))),
        };
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body = Vec::new();
        let mut truncated = false;
        let mut stream = resp;
        loop {
            match stream.chunk().await {
                Ok(Some(chunk)) => {
                    let remaining = self.max_bytes.saturating_sub(body.len());
                    if remaining == 0 {
                        truncated = true;
                        break;
                    }
                    let take = remaining.min(chunk.len());
                    truncated |= take < chunk.len();
                    body.extend_from_slice(&chunk[..take]);
                }
                Ok(None) => break,
                Err(e) => return Ok(failed(&format!("read failed: {e}"))),
            }
        }

        let (body_text, body_base64) = match String::from_utf8(body.clone()) {
            Ok(text) => (Some(text), None),
            Err(_) => (None, Some(BASE64.encode(&body))),
        };

        Ok(ToolOutcome::Ok(json!({
            "status": status,
            "content_type": content_type,
            "truncated": truncated,
            "body_text": body_text,
            "body_base64": body_base64,
        })))
    }
}

fn failed(reason: &str) -> ToolOutcome {
    ToolOutcome::Failed(json!({ "error": reason }))
}
