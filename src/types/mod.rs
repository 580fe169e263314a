//! Core identifier types for codeloop.
//!
//! - [`InvocationId`]: the opaque token naming one tool invocation inside a model response

mod invocation_id;

pub use invocation_id::{InvalidInvocationId, InvocationId};
