//! Confirmation gate consulted before an invocation runs.

use std::fmt;

use async_trait::async_trait;

use crate::messages::Invocation;

/// Response recorded when the gate denies an invocation.
pub const CANCELLED_RESPONSE: &str = "Error: execution cancelled by user";

/// Decides whether an invocation may run.
///
/// A denied invocation never reaches its engine and is answered with
/// [`CANCELLED_RESPONSE`].
#[async_trait]
pub trait ConfirmationGate: Send + Sync + fmt::Debug {
    /// Returns true if the invocation may run.
    async fn confirm(&self, invocation: &Invocation) -> bool;
}

/// Gate backed by a synchronous predicate.
pub struct FnGate<F> {
    predicate: F,
}

impl<F> FnGate<F>
where
    F: Fn(&Invocation) -> bool + Send + Sync,
{
    /// Wraps a predicate.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> fmt::Debug for FnGate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGate").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> ConfirmationGate for FnGate<F>
where
    F: Fn(&Invocation) -> bool + Send + Sync,
{
    async fn confirm(&self, invocation: &Invocation) -> bool {
        (self.predicate)(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::InvocationFormat;

    #[tokio::test]
    async fn fn_gate_applies_predicate() {
        let gate = FnGate::new(|inv: &Invocation| inv.format != InvocationFormat::Terminal);
        let mut invocation = crate::parser::InvocationParser::default()
            .parse_one("> @@a/do/exec/code\n```\n1\n```")
            .unwrap();

        assert!(gate.confirm(&invocation).await);
        invocation.format = InvocationFormat::Terminal;
        assert!(!gate.confirm(&invocation).await);
    }

    #[test]
    fn cancelled_response_is_a_failure() {
        assert!(CANCELLED_RESPONSE.starts_with(crate::messages::FAILURE_SENTINEL));
    }
}
