//! Shell command execution.
//!
//! Commands run through `<shell> -c`. Context values become environment
//! variables that persist for the life of the engine, so a value set through
//! [`ExecutionEngine::update_context`] is visible to every later command.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::engine::error::EngineError;
use crate::engine::traits::{EngineFuture, ExecutionEngine, ExecutionRequest};

const NAME: &str = "terminal";

/// Maximum output size to capture (1MB).
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Runs shell commands with captured output.
#[derive(Debug, Clone)]
pub struct TerminalEngine {
    default_shell: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    env: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for TerminalEngine {
    fn default() -> Self {
        Self {
            default_shell: "bash".to_string(),
            working_dir: None,
            timeout: Duration::from_secs(30),
            env: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl TerminalEngine {
    /// Creates an engine running `bash` in the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shell used when a request does not name one.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.default_shell = shell.into();
        self
    }

    /// Sets the working directory for every command.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Truncates output if it exceeds the maximum size.
    fn truncate_output(output: &str) -> String {
        if output.len() <= MAX_OUTPUT_SIZE {
            return output.to_string();
        }

        let mut cut = MAX_OUTPUT_SIZE;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        let cut = output[..cut].rfind('\n').unwrap_or(cut);
        format!(
            "{}\n\n... (output truncated, {} bytes total)",
            &output[..cut],
            output.len()
        )
    }
}

/// Renders a context value as an environment variable value.
fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn validate_key(key: &str) -> Result<(), EngineError> {
    let valid = !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EngineError::context(
            key,
            "environment variable names may only contain letters, digits and '_'",
        ))
    }
}

fn validate_dir(dir: &Path) -> Result<(), EngineError> {
    if !dir.is_dir() {
        return Err(EngineError::execution_failed(
            NAME,
            format!("working directory does not exist: {}", dir.display()),
        ));
    }
    Ok(())
}

impl ExecutionEngine for TerminalEngine {
    fn execute(&self, request: ExecutionRequest) -> EngineFuture {
        let shell = request
            .shell
            .clone()
            .unwrap_or_else(|| self.default_shell.clone());
        let working_dir = self.working_dir.clone();
        let timeout = self.timeout;
        let env = self.env.read().unwrap_or_else(PoisonError::into_inner).clone();

        Box::pin(async move {
            if request.code.trim().is_empty() {
                return Err(EngineError::execution_failed(NAME, "command cannot be empty"));
            }

            let mut extension = HashMap::new();
            for (key, value) in &request.extension {
                validate_key(key)?;
                extension.insert(key.clone(), env_value(value));
            }

            let mut cmd = Command::new(&shell);
            cmd.arg("-c")
                .arg(&request.code)
                .envs(&env)
                .envs(&extension)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .stdin(Stdio::null())
                .kill_on_drop(true);

            if let Some(ref dir) = working_dir {
                validate_dir(dir)?;
                cmd.current_dir(dir);
            }

            let mut child = cmd.spawn().map_err(|e| {
                EngineError::execution_failed(NAME, format!("failed to spawn {shell}: {e}"))
            })?;

            let mut stdout = child.stdout.take();
            let mut stderr = child.stderr.take();
            let run = async {
                let mut stdout_buf = Vec::new();
                let mut stderr_buf = Vec::new();
                let read_stdout = async {
                    if let Some(ref mut out) = stdout {
                        out.read_to_end(&mut stdout_buf).await?;
                    }
                    Ok::<_, std::io::Error>(())
                };
                let read_stderr = async {
                    if let Some(ref mut err) = stderr {
                        err.read_to_end(&mut stderr_buf).await?;
                    }
                    Ok::<_, std::io::Error>(())
                };
                tokio::try_join!(read_stdout, read_stderr)?;
                let status = child.wait().await?;
                Ok::<_, std::io::Error>((status, stdout_buf, stderr_buf))
            };

            let outcome = tokio::select! {
                result = tokio::time::timeout(timeout, run) => result,
                () = request.cancellation.cancelled() => {
                    debug!(shell = %shell, "Terminal command cancelled");
                    return Err(EngineError::cancelled(NAME));
                }
            };

            match outcome {
                Ok(Ok((status, stdout_buf, stderr_buf))) => {
                    let stdout = String::from_utf8_lossy(&stdout_buf);
                    let stderr = String::from_utf8_lossy(&stderr_buf);

                    if status.success() {
                        Ok(Value::String(Self::truncate_output(stdout.trim_end())))
                    } else {
                        let code = status
                            .code()
                            .map_or_else(|| "signal".to_string(), |c| c.to_string());
                        let detail = if stderr.trim().is_empty() {
                            stdout.trim_end().to_string()
                        } else {
                            stderr.trim_end().to_string()
                        };
                        Err(EngineError::execution_failed(
                            NAME,
                            format!("exit status {code}: {}", Self::truncate_output(&detail)),
                        ))
                    }
                }
                Ok(Err(e)) => Err(EngineError::execution_failed(
                    NAME,
                    format!("process error: {e}"),
                )),
                Err(_) => {
                    warn!(shell = %shell, timeout = ?timeout, "Terminal command timed out");
                    Err(EngineError::timeout(NAME, timeout))
                }
            }
        })
    }

    fn update_context(&self, values: Map<String, Value>) -> Result<(), EngineError> {
        for key in values.keys() {
            validate_key(key)?;
        }
        let mut env = self.env.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in &values {
            env.insert(key.clone(), env_value(value));
        }
        Ok(())
    }

    fn clear_context(&self) {
        self.env
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
