//! Execution engines.
//!
//! An engine is a stateful sandbox for one payload format. Three are built in:
//!
//! - [`ScriptEngine`] runs Rhai script directly
//! - [`TypedScriptEngine`] lowers a typed Rhai dialect, then runs it on a
//!   shared [`ScriptEngine`]
//! - [`TerminalEngine`] runs shell commands
//!
//! The [`EngineRegistry`] maps formats to engines and the
//! [`EngineDispatcher`] routes invocations through an optional
//! [`ConfirmationGate`].

mod error;
mod gate;
mod registry;
mod script;
mod terminal;
mod traits;
mod transpile;
mod typed;

pub use error::{EngineError, EngineErrorKind};
pub use gate::{ConfirmationGate, FnGate, CANCELLED_RESPONSE};
pub use registry::{
    render_value, EngineDispatcher, EngineRegistry, FnHandler, GatedHandler, InvocationHandler,
};
pub use script::ScriptEngine;
pub use terminal::TerminalEngine;
pub use traits::{EngineFuture, ExecutionEngine, ExecutionLimits, ExecutionRequest};
pub use transpile::{transpile, TranspileOptions};
pub use typed::TypedScriptEngine;
