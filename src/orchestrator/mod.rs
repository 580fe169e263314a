//! The tool-use loop.
//!
//! An [`Orchestrator`] sends the conversation to a provider, finds invocation
//! blocks in the reply, runs them one after another, and feeds the results
//! back until the model stops asking or the iteration ceiling is reached.
//!
//! [`Orchestrator::run`] returns the accumulated output as one string.
//! [`Orchestrator::run_stream`] reports the same work as [`StreamEvent`]s.

mod builder;
mod context;
mod events;
mod format;
mod memory;
mod run;
mod streaming;

pub use builder::OrchestratorBuilder;
pub use context::{build_context, marker_instructions, render_entry, system_prompt, DEFAULT_MEMORY_WINDOW};
pub use events::StreamEvent;
pub use format::{executed_block, CONTINUE_INSTRUCTION};
pub use memory::{Memory, MemoryObserver};
pub use run::{Orchestrator, DEFAULT_MAX_ITERATIONS};
pub use streaming::{EventStream, CANCELLED_MESSAGE};
