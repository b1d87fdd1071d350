//! Request DTOs shared between the HTTP surface and the outbound plane.
//!
//! The gateway is a proxy, so the chat DTO keeps unknown fields: anything
//! the client sends that we do not interpret rides through to the upstream
//! untouched via the flattened `extra` map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An OpenAI-shaped chat completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Fields we proxy without interpreting (top_p, stop, tools, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A chat message. Content may be a string or structured parts; the
/// gateway never inspects it beyond passing it along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An OpenAI-shaped embeddings request.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    #[serde(default)]
    pub model: String,
    /// A string or an array of strings.
    pub input: Value,
}

/// An image generation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesRequest {
    pub prompt: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub guidance_scale: Option<f64>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// `url` (default) or `b64_json`.
    #[serde(default)]
    pub response_format: Option<String>,
}

fn default_size() -> String {
    "1024x1024".to_string()
}

const fn default_n() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_chat_fields_are_preserved() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "fast",
            "messages": [{"role": "user", "content": "ping"}],
            "top_p": 0.9,
            "stop": ["\n"]
        }))
        .unwrap();
        assert_eq!(req.extra["top_p"], 0.9);

        let round = serde_json::to_value(&req).unwrap();
        assert_eq!(round["stop"][0], "\n");
        assert_eq!(round["stream"], false);
    }

    #[test]
    fn images_request_defaults() {
        let req: ImagesRequest =
            serde_json::from_value(serde_json::json!({"prompt": "a red apple"})).unwrap();
        assert_eq!(req.size, "1024x1024");
        assert_eq!(req.n, 1);
        assert!(req.response_format.is_none());
    }
}
