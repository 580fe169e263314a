//! OpenAI-compatible API client.
//!
//! Talks to `/chat/completions` on OpenAI itself or any compatible server
//! (vLLM, LocalAI, llama.cpp). Streaming responses arrive as server-sent
//! events terminated by `data: [DONE]`.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::llm::client::{DeltaStream, Provider};
use crate::llm::config::{OptionsPatch, ProviderConfig, RequestOptions};
use crate::llm::error::LLMError;
use crate::llm::framing::{sse_line, LineFramer, SseLine};
use crate::llm::transport::{send, wire_role};
use crate::messages::Message;

/// Client for OpenAI-compatible APIs.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    /// HTTP client
    client: Client,
    /// Chat completions endpoint
    endpoint: String,
    /// API key (optional for local servers)
    api_key: Option<String>,
    /// Options shared by every clone of this client
    options: Arc<RwLock<RequestOptions>>,
}

/// Request body for the chat completions API.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// A message in OpenAI format.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Non-streaming response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Streaming chunk.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

impl OpenAIClient {
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

        let api_key = (!config.api_key.is_empty()).then(|| config.api_key.clone());

        Ok(Self {
            client,
            endpoint: config.chat_endpoint(),
            api_key,
            options: Arc::new(RwLock::new(config.options.clone())),
        })
    }

    /// Returns the chat completions endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn convert_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
        messages
            .iter()
            .map(|msg| WireMessage {
                role: wire_role(msg.role),
                content: &msg.content,
            })
            .collect()
    }

    fn build_request(&self, body: &ChatCompletionRequest<'_>) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        request
    }

    /// Extracts the text delta from one SSE data payload.
    fn parse_chunk(data: &str) -> Result<Option<String>, LLMError> {
        let chunk: ChatCompletionChunk = serde_json::from_str(data)
            .map_err(|e| LLMError::parse_error(format!("failed to parse SSE event: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(LLMError::stream_error(error.message));
        }

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty()))
    }
}

#[async_trait]
impl Provider for OpenAIClient {
    #[instrument(skip_all, fields(provider = "openai", messages = messages.len()))]
    async fn ask(
        &self,
        messages: &[Message],
        overrides: Option<&OptionsPatch>,
    ) -> Result<String, LLMError> {
        let options = self.options().merged(overrides);
        let body = ChatCompletionRequest {
            model: &options.model,
            messages: Self::convert_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: false,
        };

        let response = send(self.build_request(&body), options.timeout).await?;
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LLMError::parse_error(format!("failed to parse response: {e}")))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::parse_error("response contained no choices"))?;

        let content = choice.message.content.unwrap_or_default();
        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }

    #[instrument(skip_all, fields(provider = "openai", messages = messages.len()))]
    async fn ask_stream(
        &self,
        messages: &[Message],
        overrides: Option<&OptionsPatch>,
    ) -> Result<DeltaStream, LLMError> {
        let options = self.options().merged(overrides);
        let body = ChatCompletionRequest {
            model: &options.model,
            messages: Self::convert_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: true,
        };

        let response = send(self.build_request(&body), options.timeout).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut framer = LineFramer::new();
            let mut done = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk
                    .map_err(|e| LLMError::stream_error(format!("stream read error: {e}")))?;
                for line in framer.push(&chunk)? {
                    match sse_line(&line) {
                        SseLine::Done => done = true,
                        SseLine::Skip => {}
                        SseLine::Data(data) => {
                            if let Some(delta) = Self::parse_chunk(data)? {
                                yield delta;
                            }
                        }
                    }
                    if done {
                        break;
                    }
                }
                if done {
                    break;
                }
            }

            if !done {
                if let Some(line) = framer.finish()? {
                    if let SseLine::Data(data) = sse_line(&line) {
                        if let Some(delta) = Self::parse_chunk(data)? {
                            yield delta;
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
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::new(&ProviderConfig::openai_compatible("http://localhost:8000/v1", "m")).unwrap()
    }

    #[test]
    fn new_rejects_missing_key() {
        let error = OpenAIClient::new(&ProviderConfig::openai("")).unwrap_err();
        assert!(error.is_invalid_config());
    }

    #[test]
    fn api_key_is_optional() {
        assert!(client().api_key.is_none());
        let hosted = OpenAIClient::new(&ProviderConfig::openai("sk-test")).unwrap();
        assert_eq!(hosted.api_key.as_deref(), Some("sk-test"));
        assert_eq!(hosted.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn request_body_shape() {
        let messages = vec![Message::system("be brief"), Message::tool("result: 4")];
        let body = ChatCompletionRequest {
            model: "m",
            messages: OpenAIClient::convert_messages(&messages),
            max_tokens: 64,
            temperature: None,
            stream: true,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "result: 4");
        assert_eq!(json["stream"], true);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn parse_chunk_text_delta() {
        let data = r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#;
        assert_eq!(OpenAIClient::parse_chunk(data).unwrap().as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_chunk_without_content() {
        let data = r#"{"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(OpenAIClient::parse_chunk(data).unwrap(), None);
        let data = r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#;
        assert_eq!(OpenAIClient::parse_chunk(data).unwrap(), None);
    }

    #[test]
    fn parse_chunk_error_payload() {
        let data = r#"{"error":{"message":"overloaded"}}"#;
        let error = OpenAIClient::parse_chunk(data).unwrap_err();
        assert!(error.to_string().contains("overloaded"));
    }

    #[test]
    fn update_options_is_shared_by_clones() {
        let first = client();
        let second = first.clone();
        first.update_options(OptionsPatch::default().with_model("other"));
        assert_eq!(second.options().model, "other");
    }

    #[test]
    fn provider_name() {
        assert_eq!(client().provider_name(), "openai");
    }
}
