//! Outbound plane for the crossbar gateway.
//!
//! Everything that talks to an inference backend lives here: the pooled
//! TLS-aware HTTP client, chat calls and their stream translators, the
//! embeddings and image-generation adapters, and the background health
//! prober. The HTTP surface in `crossbar-axum` composes these; this crate
//! never sees an inbound request.

pub mod chat;
pub mod client;
pub mod embeddings;
pub mod error;
pub mod images;
pub mod models;
pub mod prober;

pub use chat::{chat_completion, open_chat_stream, translate_chat_stream};
pub use client::{build_client, TlsOptions};
pub use error::UpstreamError;
pub use images::{GeneratedImages, ImageJob, ImagesUpstream};
pub use models::{ChatCompletionRequest, ChatMessage, EmbeddingsRequest, ImagesRequest};
pub use prober::spawn_health_checker;
