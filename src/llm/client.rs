//! Provider trait abstraction.
//!
//! Defines the interface every model backend implements. The orchestrator
//! only ever sees `dyn Provider`, which is also the seam tests use to script
//! model replies.

use crate::llm::config::{OptionsPatch, ProviderConfig, ProviderType, RequestOptions};
use crate::llm::error::LLMError;
use crate::llm::ollama::OllamaClient;
use crate::llm::openai::OpenAIClient;
use crate::messages::Message;
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// A stream of text deltas from a streaming request.
///
/// Deltas concatenate to the full reply. The stream ends when the backend
/// signals completion; an `Err` item aborts it.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// A chat-completion backend.
///
/// Implementations own their request options behind interior mutability so a
/// shared provider can be retuned while it is in use.
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Sends the conversation and returns the complete reply.
    ///
    /// `overrides` applies to this call only.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or a body
    /// that cannot be decoded.
    async fn ask(
        &self,
        messages: &[Message],
        overrides: Option<&OptionsPatch>,
    ) -> Result<String, LLMError>;

    /// Sends the conversation and returns a stream of reply deltas.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. Errors after the
    /// first byte arrive as stream items.
    async fn ask_stream(
        &self,
        messages: &[Message],
        overrides: Option<&OptionsPatch>,
    ) -> Result<DeltaStream, LLMError>;

    /// Merges a patch into the options used by later requests.
    fn update_options(&self, patch: OptionsPatch);

    /// Returns a snapshot of the current request options.
    fn options(&self) -> RequestOptions;

    /// Returns the name of the provider for logging.
    fn provider_name(&self) -> &'static str;
}

/// Builds the client matching the configured provider type.
///
/// # Errors
///
/// Returns `InvalidConfig` if the configuration does not validate.
pub fn connect(config: &ProviderConfig) -> Result<Arc<dyn Provider>, LLMError> {
    Ok(match config.provider_type {
        ProviderType::OpenAI | ProviderType::OpenAICompatible => Arc::new(OpenAIClient::new(config)?),
        ProviderType::Ollama => Arc::new(OllamaClient::new(config)?),
    })
}
