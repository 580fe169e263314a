//! Invocation parser.
//!
//! Model output is free-form text. Tool requests are embedded as a marker line
//! followed by a fenced payload:
//!
//! ````text
//! > @@calc1/do/exec/code
//! ```code
//! let total = 2 + 2;
//! total
//! ```
//! ````
//!
//! Each line is classified once by the tokenizer, then the grammar turns runs
//! of tokens into [`Invocation`](crate::messages::Invocation) records carrying
//! their exact line range in the source text.

mod error;
mod grammar;
mod incremental;
mod token;

pub use error::{ParseError, ParseErrorKind};
pub use grammar::{strip, InvocationParser, DEFAULT_SENTINEL};
pub use incremental::IncrementalScanner;
pub use token::{LineKind, MarkerLine};
pub(crate) use token::FENCE;
