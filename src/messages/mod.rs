//! Conversation data model.
//!
//! This module defines the messages exchanged with the model, the invocation
//! records the parser extracts from model output, and the closed union stored
//! in conversation memory.

mod types;

pub use types::*;
