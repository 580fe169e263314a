//! Shared test doubles.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codeloop::llm::{DeltaStream, LLMError, OptionsPatch, Provider, RequestOptions};
use codeloop::messages::Message;

/// One scripted reply: whole text for `ask`, chunks for `ask_stream`.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Chunks(Vec<String>),
    Fail(LLMError),
    /// A call that never completes.
    Hang,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::Chunks(chunks.iter().map(|c| (*c).to_string()).collect())
    }

    fn joined(self) -> Result<String, LLMError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Chunks(chunks) => Ok(chunks.concat()),
            Self::Fail(error) => Err(error),
            Self::Hang => unreachable!("hanging replies are handled by the caller"),
        }
    }
}

/// Replies from a script and records every request.
#[derive(Debug, Default)]
pub struct Scripted {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl Scripted {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }

    fn next(&self, messages: &[Message]) -> Reply {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::text("Nothing more to do."))
    }
}

#[async_trait]
impl Provider for Scripted {
    async fn ask(
        &self,
        messages: &[Message],
        _overrides: Option<&OptionsPatch>,
    ) -> Result<String, LLMError> {
        match self.next(messages) {
            Reply::Hang => futures::future::pending().await,
            reply => reply.joined(),
        }
    }

    async fn ask_stream(
        &self,
        messages: &[Message],
        _overrides: Option<&OptionsPatch>,
    ) -> Result<DeltaStream, LLMError> {
        match self.next(messages) {
            Reply::Fail(error) => Err(error),
            Reply::Hang => Ok(Box::pin(futures::stream::pending::<Result<String, LLMError>>())),
            Reply::Text(text) => Ok(Box::pin(futures::stream::iter(vec![Ok::<_, LLMError>(text)]))),
            Reply::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(
                chunks.into_iter().map(Ok::<_, LLMError>).collect::<Vec<_>>(),
            ))),
        }
    }

    fn update_options(&self, _patch: OptionsPatch) {}

    fn options(&self) -> RequestOptions {
        RequestOptions::new("scripted")
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}
