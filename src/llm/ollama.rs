//! Ollama daemon client.
//!
//! Uses the native `/api/chat` endpoint. Streaming replies are newline
//! delimited JSON: one object per line, the last carrying `"done": true`.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::llm::client::{DeltaStream, Provider};
use crate::llm::config::{OptionsPatch, ProviderConfig, RequestOptions};
use crate::llm::error::LLMError;
use crate::llm::framing::{ndjson_line, LineFramer};
use crate::llm::transport::{send, wire_role};
use crate::messages::Message;

/// Client for a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    options: Arc<RwLock<RequestOptions>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: ModelOptions,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    num_predict: u32,
}

/// One response object; the whole body when not streaming, one line otherwise.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// What one NDJSON line contributes to the stream.
#[derive(Debug, PartialEq, Eq)]
enum ChunkOutcome {
    Delta(String),
    Done(Option<String>),
    Empty,
}

impl OllamaClient {
    /// Creates a client from a provider configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate, or a
    /// network error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, LLMError> {
        config.validate()?;

        let client = Client::builder()
            .build()
            .map_err(|e| LLMError::network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.chat_endpoint(),
            options: Arc::new(RwLock::new(config.options.clone())),
        })
    }

    /// Returns the chat endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(messages: &'a [Message], options: &'a RequestOptions, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &options.model,
            messages: messages
                .iter()
                .map(|msg| WireMessage {
                    role: wire_role(msg.role),
                    content: &msg.content,
                })
                .collect(),
            stream,
            options: ModelOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        }
    }

    /// Interprets one decoded NDJSON object.
    fn parse_chunk(value: serde_json::Value) -> Result<ChunkOutcome, LLMError> {
        let chunk: ChatChunk = serde_json::from_value(value)
            .map_err(|e| LLMError::parse_error(format!("unexpected chunk shape: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(LLMError::stream_error(error));
        }

        let content = chunk.message.map(|m| m.content).filter(|c| !c.is_empty());
        Ok(match (chunk.done, content) {
            (true, content) => ChunkOutcome::Done(content),
            (false, Some(content)) => ChunkOutcome::Delta(content),
            (false, None) => ChunkOutcome::Empty,
        })
    }
}

#[async_trait]
impl Provider for OllamaClient {
    #[instrument(skip_all, fields(provider = "ollama", messages = messages.len()))]
    async fn ask(
        &self,
        messages: &[Message],
        overrides: Option<&OptionsPatch>,
    ) -> Result<String, LLMError> {
        let options = self.options().merged(overrides);
        let body = Self::request(messages, &options, false);

        let response = send(self.client.post(&self.endpoint).json(&body), options.timeout).await?;
        let chunk: ChatChunk = response
            .json()
            .await
            .map_err(|e| LLMError::parse_error(format!("failed to parse response: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(LLMError::api_error(200, error, None));
        }

        let content = chunk.message.map(|m| m.content).unwrap_or_default();
        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }

    #[instrument(skip_all, fields(provider = "ollama", messages = messages.len()))]
    async fn ask_stream(
        &self,
        messages: &[Message],
        overrides: Option<&OptionsPatch>,
    ) -> Result<DeltaStream, LLMError> {
        let options = self.options().merged(overrides);
        let body = Self::request(messages, &options, true);

        let response = send(self.client.post(&self.endpoint).json(&body), options.timeout).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut framer = LineFramer::new();
            let mut done = false;

            while !done {
                let Some(chunk) = bytes.next().await else { break };
                let chunk = chunk
                    .map_err(|e| LLMError::stream_error(format!("stream read error: {e}")))?;

                for line in framer.push(&chunk)? {
                    let Some(value) = ndjson_line(&line)? else { continue };
                    match Self::parse_chunk(value)? {
                        ChunkOutcome::Delta(delta) => {
                            yield delta;
                        }
                        ChunkOutcome::Done(last) => {
                            if let Some(delta) = last {
                                yield delta;
                            }
                            done = true;
                            break;
                        }
                        ChunkOutcome::Empty => {}
                    }
                }
            }

            if !done {
                if let Some(line) = framer.finish()? {
                    if let Some(value) = ndjson_line(&line)? {
                        match Self::parse_chunk(value)? {
                            ChunkOutcome::Delta(delta) | ChunkOutcome::Done(Some(delta)) => {
                                yield delta;
                            }
                            ChunkOutcome::Done(None) | ChunkOutcome::Empty => {}
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn update_options(&self, patch: OptionsPatch) {
        match self.options.write() {
            Ok(mut options) => options.apply(&patch),
            Err(poisoned) => poisoned.into_inner().apply(&patch),
        }
    }

    fn options(&self) -> RequestOptions {
        match self.options.read() {
            Ok(options) => options.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_uses_native_api() {
        let client = OllamaClient::new(&ProviderConfig::ollama("llama3.2")).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn request_maps_max_tokens_to_num_predict() {
        let options = RequestOptions::new("llama3.2");
        let messages = vec![Message::user("hi")];
        let json = serde_json::to_value(OllamaClient::request(&messages, &options, true)).unwrap();

        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["options"]["num_predict"], 4096);
        assert!(json["options"].get("temperature").is_none());
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn chunk_outcomes() {
        let delta = json!({"message": {"role": "assistant", "content": "Hel"}, "done": false});
        assert_eq!(
            OllamaClient::parse_chunk(delta).unwrap(),
            ChunkOutcome::Delta("Hel".to_string())
        );

        let done = json!({"message": {"role": "assistant", "content": ""}, "done": true});
        assert_eq!(OllamaClient::parse_chunk(done).unwrap(), ChunkOutcome::Done(None));

        let empty = json!({"done": false});
        assert_eq!(OllamaClient::parse_chunk(empty).unwrap(), ChunkOutcome::Empty);
    }

    #[test]
    fn error_chunk_aborts_stream() {
        let error = OllamaClient::parse_chunk(json!({"error": "model not loaded"})).unwrap_err();
        assert!(error.to_string().contains("model not loaded"));
    }
}
