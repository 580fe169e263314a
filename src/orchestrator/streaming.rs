//! The streaming tool-use loop.
//!
//! Same iterations as [`Orchestrator::run`], reported as [`StreamEvent`]s.
//! Text is scanned as it arrives and a block executes as soon as its closing
//! fence is seen, never earlier.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::messages::{Message, FAILURE_SENTINEL};
use crate::orchestrator::events::StreamEvent;
use crate::orchestrator::format::{executed_block, CONTINUE_INSTRUCTION};
use crate::orchestrator::run::{Orchestrator, PART_SEPARATOR};

/// Single-subscriber stream of run events.
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>>;

/// Message carried by the error event when a run is cancelled.
pub const CANCELLED_MESSAGE: &str = "run cancelled";

impl Orchestrator {
    /// Runs one user turn as a stream of events.
    ///
    /// Dropping the stream cancels any in-flight provider read or execution.
    pub fn run_stream(&mut self, input: &str) -> EventStream<'_> {
        self.run_stream_with_cancel(input, CancellationToken::new())
    }

    /// Runs one user turn as a stream of events, observing `cancel`.
    ///
    /// The stream owns a drop guard for `cancel`: dropping the stream before
    /// `complete` cancels the token, and cancelling the token ends the stream
    /// with an `error` event.
    pub fn run_stream_with_cancel(
        &mut self,
        input: &str,
        cancel: CancellationToken,
    ) -> EventStream<'_> {
        let input = input.to_string();

        Box::pin(async_stream::stream! {
            let guard = cancel.clone().drop_guard();
            let mut pending = input;
            let mut iteration = 1;
            let mut parts: Vec<String> = Vec::new();

            loop {
                yield StreamEvent::Thinking;
                debug!(iteration, "Requesting streamed completion");

                let messages = self.context(&pending);
                let opened = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    result = self.provider.ask_stream(&messages, self.overrides.as_ref()) => Some(result),
                };
                let mut deltas = match opened {
                    None => {
                        yield StreamEvent::error(CANCELLED_MESSAGE);
                        return;
                    }
                    Some(Err(e)) => {
                        error!(iteration, error = %e, "Provider failed to start stream");
                        yield StreamEvent::error(e.to_string());
                        return;
                    }
                    Some(Ok(deltas)) => deltas,
                };
                self.memory.append(Message::user(std::mem::take(&mut pending)));

                let mut scanner = self.parser.scanner();
                let mut executed = Vec::new();

                loop {
                    let next = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        item = deltas.next() => Some(item),
                    };
                    let (found, ended) = match next {
                        None => {
                            yield StreamEvent::error(CANCELLED_MESSAGE);
                            return;
                        }
                        Some(Some(Err(e))) => {
                            error!(iteration, error = %e, "Provider stream failed");
                            yield StreamEvent::error(e.to_string());
                            return;
                        }
                        Some(Some(Ok(delta))) => {
                            let found = scanner.push(&delta);
                            let accumulated = scanner.text().to_string();
                            yield StreamEvent::Text { delta, accumulated };
                            (found, false)
                        }
                        Some(None) => (scanner.finish(), true),
                    };

                    for invocation in found {
                        yield StreamEvent::CodeFound { invocation: invocation.clone() };
                        yield StreamEvent::CodeExecuting { id: invocation.id.clone() };

                        let invocation = self.execute(invocation, &cancel).await;
                        if cancel.is_cancelled() {
                            yield StreamEvent::error(CANCELLED_MESSAGE);
                            return;
                        }

                        let result = invocation.response.clone().unwrap_or_default();
                        let success = !result.starts_with(FAILURE_SENTINEL);
                        parts.push(executed_block(&invocation, &result));
                        yield StreamEvent::CodeResult {
                            id: invocation.id.clone(),
                            result,
                            success,
                        };
                        executed.push(invocation);
                    }

                    if ended {
                        break;
                    }
                }

                let reply = scanner.into_text();
                if executed.is_empty() {
                    self.memory.append(Message::assistant(reply.clone()));
                    parts.push(reply);
                } else {
                    let prose = self.parser.strip(&reply, &executed);
                    if !prose.is_empty() {
                        parts.push(prose.clone());
                        self.memory.append(Message::assistant(prose));
                    }
                }

                if !executed.is_empty() && iteration < self.max_iterations {
                    iteration += 1;
                    pending = CONTINUE_INSTRUCTION.to_string();
                    yield StreamEvent::Iteration { iteration };
                    continue;
                }

                if !executed.is_empty() {
                    info!(iteration, "Iteration ceiling reached");
                }
                guard.disarm();
                yield StreamEvent::Complete {
                    final_response: parts.join(PART_SEPARATOR),
                    iterations: iteration,
                };
                return;
            }
        })
    }
}
