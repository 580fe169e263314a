//! The bounded tool-use loop.
//!
//! One run drives the provider through a small state machine:
//!
//! ```text
//! Requesting -> Parsing -> Executing -> Requesting ... -> Finalizing
//!                    \------------------------------------^
//! ```
//!
//! `Parsing` goes straight to `Finalizing` when the reply holds no
//! invocations. `Executing` loops back to `Requesting` with a continue
//! instruction until the iteration ceiling is reached.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::engine::{EngineError, EngineRegistry, InvocationHandler};
use crate::error::CodeloopError;
use crate::llm::{OptionsPatch, Provider};
use crate::messages::{Invocation, InvocationFormat, Message, FAILURE_SENTINEL};
use crate::orchestrator::builder::OrchestratorBuilder;
use crate::orchestrator::context::{build_context, system_prompt};
use crate::orchestrator::format::{executed_block, CONTINUE_INSTRUCTION};
use crate::orchestrator::memory::Memory;
use crate::parser::InvocationParser;
use crate::tracker::{ExecutionHistoryEntry, ResultsTracker};
use crate::types::InvocationId;

/// Default ceiling on provider calls per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// Separator between accumulated output parts.
pub(crate) const PART_SEPARATOR: &str = "\n\n";

/// Drives one conversation with a provider, executing embedded code.
///
/// An orchestrator is one sequential conversation: every run takes
/// `&mut self`. Independent orchestrators share nothing mutable unless they
/// were given the same registry.
pub struct Orchestrator {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) parser: InvocationParser,
    pub(crate) handler: Arc<dyn InvocationHandler>,
    pub(crate) registry: EngineRegistry,
    pub(crate) memory: Memory,
    pub(crate) tracker: ResultsTracker,
    pub(crate) system_prompt: String,
    pub(crate) max_iterations: usize,
    pub(crate) memory_window: usize,
    pub(crate) history_in_prompt: usize,
    pub(crate) overrides: Option<OptionsPatch>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.provider_name())
            .field("sentinel", &self.parser.sentinel())
            .field("max_iterations", &self.max_iterations)
            .field("memory", &self.memory)
            .field("results", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

/// States of the non-streaming loop.
#[derive(Debug)]
enum LoopState {
    /// Calling the provider with `input` as the pending user turn
    Requesting { iteration: usize, input: String },
    /// Scanning a reply for invocations
    Parsing { iteration: usize, reply: String },
    /// Running the invocations of a reply in document order
    Executing {
        iteration: usize,
        reply: String,
        invocations: Vec<Invocation>,
    },
    /// Joining accumulated output
    Finalizing,
}

impl Orchestrator {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Runs one user turn to completion.
    ///
    /// # Errors
    ///
    /// Returns the provider error only when it happens before any output was
    /// accumulated. Later provider failures end the run with the partial
    /// output.
    pub async fn run(&mut self, input: &str) -> Result<String, CodeloopError> {
        self.run_with_cancel(input, CancellationToken::new()).await
    }

    /// Runs one user turn, forwarding `cancel` to every execution.
    ///
    /// The provider call is raced against `cancel`, and no further request
    /// is made once the token fires.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run). Returns a cancellation error once `cancel`
    /// fires, discarding any partial output.
    #[instrument(skip_all, fields(provider = self.provider.provider_name()))]
    pub async fn run_with_cancel(
        &mut self,
        input: &str,
        cancel: CancellationToken,
    ) -> Result<String, CodeloopError> {
        let mut parts: Vec<String> = Vec::new();
        let mut state = LoopState::Requesting {
            iteration: 1,
            input: input.to_string(),
        };

        loop {
            state = match state {
                LoopState::Requesting { iteration, input } => {
                    if cancel.is_cancelled() {
                        info!(iteration, "Run cancelled");
                        return Err(CodeloopError::cancelled());
                    }
                    debug!(iteration, "Requesting completion");
                    let messages = self.context(&input);
                    let asked = tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            info!(iteration, "Run cancelled while waiting for the provider");
                            return Err(CodeloopError::cancelled());
                        }
                        result = self.provider.ask(&messages, self.overrides.as_ref()) => result,
                    };
                    match asked {
                        Ok(reply) => {
                            self.memory.append(Message::user(input));
                            LoopState::Parsing { iteration, reply }
                        }
                        Err(error) if !parts.is_empty() => {
                            warn!(iteration, error = %error, "Provider failed mid-run; returning partial output");
                            LoopState::Finalizing
                        }
                        Err(error) => return Err(error.into()),
                    }
                }

                LoopState::Parsing { iteration, reply } => {
                    let invocations = self.parser.find_invocations(&reply);
                    debug!(iteration, found = invocations.len(), "Reply parsed");
                    if invocations.is_empty() {
                        self.memory.append(Message::assistant(reply.clone()));
                        parts.push(reply);
                        LoopState::Finalizing
                    } else {
                        LoopState::Executing {
                            iteration,
                            reply,
                            invocations,
                        }
                    }
                }

                LoopState::Executing {
                    iteration,
                    reply,
                    invocations,
                } => {
                    let mut executed = Vec::with_capacity(invocations.len());
                    for invocation in invocations {
                        let invocation = self.execute(invocation, &cancel).await;
                        let response = invocation.response.as_deref().unwrap_or_default();
                        parts.push(executed_block(&invocation, response));
                        executed.push(invocation);
                    }

                    let prose = self.parser.strip(&reply, &executed);
                    if !prose.is_empty() {
                        parts.push(prose.clone());
                        self.memory.append(Message::assistant(prose));
                    }

                    if cancel.is_cancelled() {
                        info!(iteration, "Run cancelled");
                        return Err(CodeloopError::cancelled());
                    }
                    if iteration < self.max_iterations {
                        LoopState::Requesting {
                            iteration: iteration + 1,
                            input: CONTINUE_INSTRUCTION.to_string(),
                        }
                    } else {
                        info!(iteration, "Iteration ceiling reached");
                        LoopState::Finalizing
                    }
                }

                LoopState::Finalizing => return Ok(parts.join(PART_SEPARATOR)),
            };
        }
    }

    /// Builds the messages for the next provider call.
    pub(crate) fn context(&self, input: &str) -> Vec<Message> {
        let system = system_prompt(
            &self.system_prompt,
            self.parser.sentinel(),
            self.tracker.recent_history(self.history_in_prompt),
        );
        build_context(system, self.memory.window(self.memory_window), input)
    }

    /// Executes one invocation, records it, and appends it to memory.
    ///
    /// Never fails: handler errors become `"Error: ..."` responses.
    pub(crate) async fn execute(
        &mut self,
        mut invocation: Invocation,
        cancel: &CancellationToken,
    ) -> Invocation {
        debug!(id = %invocation.id, format = %invocation.format, "Executing invocation");

        let response = match self.handler.handle(&invocation, cancel).await {
            Ok(response) => response,
            Err(error) => {
                warn!(id = %invocation.id, error = %error, "Invocation failed");
                format!("{FAILURE_SENTINEL} {error}")
            }
        };

        self.tracker.record(
            invocation.id.clone(),
            invocation.request.clone(),
            invocation.format,
            &response,
        );
        invocation.response = Some(response);
        self.memory.append(invocation.clone());
        invocation
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns conversation memory.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Returns the results tracker.
    #[must_use]
    pub fn results(&self) -> &ResultsTracker {
        &self.tracker
    }

    /// Returns the coerced result of an invocation.
    #[must_use]
    pub fn get_result(&self, id: &InvocationId) -> Option<&Value> {
        self.tracker.get(id)
    }

    /// Returns true if an invocation produced a stored result.
    #[must_use]
    pub fn has_result(&self, id: &InvocationId) -> bool {
        self.tracker.has(id)
    }

    /// Returns execution history, oldest first.
    pub fn execution_history(&self) -> impl Iterator<Item = &ExecutionHistoryEntry> {
        self.tracker.history().iter()
    }

    /// Drops stored results and history.
    pub fn clear_results(&mut self) {
        self.tracker.clear();
    }

    /// Returns the provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Returns the engine registry.
    #[must_use]
    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Merges values into the execution context for `format`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if no engine handles the format or the values
    /// are rejected.
    pub fn update_context(
        &self,
        format: InvocationFormat,
        values: Map<String, Value>,
    ) -> Result<(), EngineError> {
        self.registry.update_context(format, values)
    }

    /// Starts over: resets memory, clears results, and clears every engine
    /// context.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.tracker.clear();
        self.registry.clear_contexts();
    }
}
