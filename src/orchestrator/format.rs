//! Result block formatting.

use crate::messages::{Invocation, InvocationFormat};
use crate::parser::FENCE;
use crate::tracker::DisplayLanguage;

/// User turn sent after an iteration that executed code.
pub const CONTINUE_INSTRUCTION: &str =
    "Continue. Use the results above; execute more code only if it is still needed.";

/// Formats the "executed / result" block appended to the output.
///
/// # Examples
///
/// ```
/// use codeloop::orchestrator::executed_block;
/// use codeloop::parser::InvocationParser;
///
/// let invocation = InvocationParser::default()
///     .parse_one("> @@sum/do/exec/code\n```\n2+2\n```")
///     .unwrap();
/// let block = executed_block(&invocation, "4");
/// assert!(block.starts_with("Executed `code` (sum):"));
/// assert!(block.ends_with("```number\n4\n```"));
/// ```
#[must_use]
pub fn executed_block(invocation: &Invocation, response: &str) -> String {
    let tag = match invocation.format {
        InvocationFormat::Terminal => invocation.shell.as_deref().unwrap_or("sh"),
        other => other.as_str(),
    };
    let language = DisplayLanguage::classify(response);

    format!(
        "Executed `{format}` ({id}):\n{FENCE}{tag}\n{request}\n{FENCE}\nResult:\n{FENCE}{result_tag}\n{response}\n{FENCE}",
        format = invocation.format,
        id = invocation.id,
        request = invocation.request,
        result_tag = language.fence_tag(),
    )
}
