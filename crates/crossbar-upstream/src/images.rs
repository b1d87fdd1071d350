//! Image generation upstreams.
//!
//! Three families: a deterministic `mock` placeholder (always available, no
//! GPU required), Automatic1111-compatible servers, and OpenAI-style image
//! servers. All families return raw decoded bytes; payload policy (URL vs.
//! base64) is enforced by the pipeline, not here.

use crate::error::UpstreamError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crossbar_core::settings::ImagesBackendKind;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Static configuration for the images upstream, extracted from settings.
#[derive(Debug, Clone)]
pub struct ImagesUpstream {
    pub kind: ImagesBackendKind,
    pub base_url: String,
    pub default_model: String,
    pub read_timeout: Duration,
    pub a1111_steps: u32,
}

/// One generation job after validation.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub n: u32,
    pub model: Option<String>,
    pub steps: Option<u32>,
    pub seed: Option<i64>,
    pub guidance_scale: Option<f64>,
    pub negative_prompt: Option<String>,
}

/// Decoded upstream output.
#[derive(Debug)]
pub struct GeneratedImages {
    pub created: i64,
    pub images: Vec<Vec<u8>>,
    /// MIME the upstream claims; storage re-sniffs from bytes.
    pub mime: &'static str,
    /// Upstream metadata echoed into `_gateway.upstream`.
    pub upstream: Value,
}

/// Parse a `WxH` size string with a pixel-count guard.
pub fn parse_size(size: &str, max_pixels: u64) -> Result<(u32, u32), String> {
    let s = size.trim().to_ascii_lowercase();
    let s = if s.is_empty() { "1024x1024" } else { &s };
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| "size must be like '1024x1024'".to_string())?;
    let w: u32 = w.trim().parse().map_err(|_| "size must be like '1024x1024'".to_string())?;
    let h: u32 = h.trim().parse().map_err(|_| "size must be like '1024x1024'".to_string())?;
    if w == 0 || h == 0 {
        return Err("size must be positive".into());
    }
    if u64::from(w) * u64::from(h) > max_pixels {
        return Err("size too large".into());
    }
    Ok((w, h))
}

impl ImagesUpstream {
    pub async fn generate(
        &self,
        client: &Client,
        job: &ImageJob,
    ) -> Result<GeneratedImages, UpstreamError> {
        match self.kind {
            ImagesBackendKind::Mock => Ok(self.generate_mock(job)),
            ImagesBackendKind::HttpA1111 => self.generate_a1111(client, job).await,
            ImagesBackendKind::HttpOpenaiImages => self.generate_openai(client, job).await,
        }
    }

    fn generate_mock(&self, job: &ImageJob) -> GeneratedImages {
        let svg = mock_svg(&job.prompt, job.width, job.height);
        GeneratedImages {
            created: chrono::Utc::now().timestamp(),
            images: std::iter::repeat_with(|| svg.clone())
                .take(job.n as usize)
                .collect(),
            mime: "image/svg+xml",
            upstream: json!({ "backend": "mock" }),
        }
    }

    async fn generate_a1111(
        &self,
        client: &Client,
        job: &ImageJob,
    ) -> Result<GeneratedImages, UpstreamError> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url.trim_end_matches('/'));
        let mut payload = json!({
            "prompt": job.prompt,
            "width": job.width,
            "height": job.height,
            "batch_size": job.n,
            "steps": job.steps.unwrap_or(self.a1111_steps),
        });
        if let Some(seed) = job.seed {
            payload["seed"] = json!(seed);
        }
        if let Some(cfg) = job.guidance_scale {
            payload["cfg_scale"] = json!(cfg);
        }
        if let Some(neg) = &job.negative_prompt {
            payload["negative_prompt"] = json!(neg);
        }

        let out = self.post_json(client, &url, &payload).await?;
        let b64_items = out
            .get("images")
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty())
            .ok_or_else(|| UpstreamError::Protocol("no images in txt2img response".into()))?;

        let mut images = Vec::new();
        for item in b64_items.iter().take(job.n as usize) {
            let b64 = item
                .as_str()
                .ok_or_else(|| UpstreamError::Protocol("txt2img image is not a string".into()))?;
            images.push(decode_b64(b64)?);
        }

        Ok(GeneratedImages {
            created: chrono::Utc::now().timestamp(),
            images,
            mime: "image/png",
            upstream: json!({ "backend": "http_a1111", "parameters": out.get("parameters") }),
        })
    }

    async fn generate_openai(
        &self,
        client: &Client,
        job: &ImageJob,
    ) -> Result<GeneratedImages, UpstreamError> {
        let model = effective_model(job.model.as_deref(), &self.default_model);
        if model.is_empty() {
            return Err(UpstreamError::Protocol(
                "no model configured for the images upstream (set IMAGES_OPENAI_MODEL)".into(),
            ));
        }

        let url = format!(
            "{}/v1/images/generations",
            self.base_url.trim_end_matches('/')
        );
        // The upstream's preferred format is irrelevant: the gateway always
        // pulls bytes and applies its own payload policy.
        let mut payload = json!({
            "model": model,
            "prompt": job.prompt,
            "n": job.n,
            "size": format!("{}x{}", job.width, job.height),
            "response_format": "b64_json",
        });
        if let Some(seed) = job.seed {
            payload["seed"] = json!(seed);
        }
        if let Some(steps) = job.steps {
            payload["steps"] = json!(steps);
        }
        if let Some(cfg) = job.guidance_scale {
            payload["guidance_scale"] = json!(cfg);
        }
        if let Some(neg) = &job.negative_prompt {
            payload["negative_prompt"] = json!(neg);
        }

        let out = self.post_json(client, &url, &payload).await?;
        let data = out
            .get("data")
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty())
            .ok_or_else(|| UpstreamError::Protocol("no data in images response".into()))?;

        let mut images = Vec::new();
        for item in data.iter().take(job.n as usize) {
            let b64 = item
                .get("b64_json")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    UpstreamError::Protocol("images upstream did not return b64_json".into())
                })?;
            images.push(decode_b64(b64)?);
        }

        Ok(GeneratedImages {
            created: out
                .get("created")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            images,
            mime: "image/png",
            upstream: json!({ "backend": "http_openai_images", "model": model }),
        })
    }

    async fn post_json(
        &self,
        client: &Client,
        url: &str,
        payload: &Value,
    ) -> Result<Value, UpstreamError> {
        let resp = client
            .post(url)
            .timeout(self.read_timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(e, self.read_timeout))?;
        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(5000);
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }
        resp.json()
            .await
            .map_err(|e| UpstreamError::Protocol(format!("invalid JSON from image backend: {e}")))
    }
}

/// Resolve the upstream model for a job: the client's hint unless it is
/// empty or the `default` placeholder, else the configured default.
pub fn effective_model(job_model: Option<&str>, default_model: &str) -> String {
    match job_model.map(str::trim) {
        Some("") | Some("default") | None => default_model.to_string(),
        Some(model) => model.to_string(),
    }
}

fn decode_b64(b64: &str) -> Result<Vec<u8>, UpstreamError> {
    BASE64
        .decode(b64)
        .map_err(|e| UpstreamError::Protocol(format!("invalid base64 image payload: {e}")))
}

/// Deterministic placeholder image. Preserves the requested canvas and
/// embeds the (truncated, escaped) prompt so the result is recognizable.
fn mock_svg(prompt: &str, width: u32, height: u32) -> Vec<u8> {
    let mut p = prompt.trim().to_string();
    if p.len() > 400 {
        p.truncate(400);
        p.push('…');
    }
    let p = p
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">
  <rect width="100%" height="100%" fill="#0b0d10"/>
  <text x="48" y="72" fill="#e7edf6" font-family="ui-sans-serif, system-ui" font-size="20" font-weight="600">Mock image backend</text>
  <text x="48" y="104" fill="#a9b4c3" font-family="ui-sans-serif, system-ui" font-size="14">{p}</text>
</svg>
"##
    )
    .into_bytes()
}
