//! # Codeloop: Tool-use orchestration for language models
//!
//! A model answers in prose and, where it wants something computed, embeds
//! marker lines followed by fenced code. Codeloop finds those blocks, runs
//! them on stateful engines, and feeds the results back to the model until
//! it stops asking or an iteration ceiling is reached.
//!
//! ## Architecture
//!
//! - **Parser**: Finds `@@ id/do/<operation>/<format>` markers and their fenced payloads
//! - **Engines**: Script, typed script, and terminal execution with persistent context
//! - **LLM**: OpenAI-style SSE and Ollama NDJSON adapters behind one `Provider` trait
//! - **Orchestrator**: The bounded loop, in single-string and event-stream flavours
//! - **Tracker**: Coerced results by id plus a bounded execution history
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use codeloop::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CodeloopError> {
//!     let mut orchestrator = Orchestrator::builder()
//!         .ollama("qwen2.5:7b")
//!         .build()?;
//!
//!     let answer = orchestrator.run("What is 2 ** 20?").await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod messages;
pub mod orchestrator;
pub mod parser;
pub mod tracker;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::CodeloopConfig;
    pub use crate::engine::{
        ConfirmationGate, EngineDispatcher, EngineError, EngineRegistry, ExecutionEngine,
        ExecutionLimits, FnGate, FnHandler, InvocationHandler,
    };
    pub use crate::error::CodeloopError;
    pub use crate::llm::{LLMError, OptionsPatch, Provider, ProviderConfig, ProviderType};
    pub use crate::messages::*;
    pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder, StreamEvent};
    pub use crate::parser::{InvocationParser, ParseError};
    pub use crate::tracker::ResultsTracker;
    pub use crate::types::InvocationId;

    pub use tokio_util::sync::CancellationToken;
}
