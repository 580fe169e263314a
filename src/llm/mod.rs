//! Model provider module.
//!
//! This module contains the [`Provider`] trait the orchestrator talks to and
//! the two built-in adapters: an OpenAI-compatible HTTP client (JSON and
//! server-sent events) and an Ollama daemon client (newline-delimited JSON).

mod client;
mod config;
mod error;
mod framing;
mod ollama;
mod openai;
mod transport;

pub use client::{connect, DeltaStream, Provider};
pub use config::{OptionsPatch, ProviderConfig, ProviderType, RequestOptions};
pub use error::{LLMError, LLMErrorKind};
pub use framing::{ndjson_line, sse_line, LineFramer, SseLine};
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;
