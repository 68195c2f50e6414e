//! Async subprocess execution for CLI-based fetch strategies.
//!
//! Strategies only care about run / exit code / captured output; everything
//! else about subprocess management stays in here.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{EngineError, Result};

/// Default timeout for one CLI invocation.
pub const CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured output of a finished CLI command.
#[derive(Debug)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CliOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Whether a tool is on PATH, for strategy `can_execute` checks.
#[must_use]
pub fn tool_on_path(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run a CLI command with a timeout, capturing both streams.
pub async fn run_command(
    program: &str,
    args: &[&str],
    timeout_duration: Duration,
) -> Result<CliOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::ToolNotFound(program.to_string())
            } else {
                EngineError::ToolFailed {
                    tool: program.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

    let result = timeout(timeout_duration, async {
        // Drain stdout and stderr concurrently; sequential reads can
        // deadlock once the child fills the pipe buffer we are not reading.
        let stdout_handle = async {
            let mut stdout = String::new();
            if let Some(mut out) = child.stdout.take() {
                out.read_to_string(&mut stdout).await?;
            }
            Ok::<_, std::io::Error>(stdout)
        };

        let stderr_handle = async {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                err.read_to_string(&mut stderr).await?;
            }
            Ok::<_, std::io::Error>(stderr)
        };

        let (stdout_result, stderr_result) = tokio::join!(stdout_handle, stderr_handle);
        let stdout = stdout_result?;
        let stderr = stderr_result?;

        let status = child.wait().await?;

        Ok::<_, std::io::Error>(CliOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        })
    })
    .await;

    match result {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(EngineError::ToolFailed {
            tool: program.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            Err(EngineError::Timeout {
                provider: program.to_string(),
                seconds: timeout_duration.as_secs(),
            })
        }
    }
}

/// Run a CLI command and parse its stdout as JSON.
///
/// A non-zero exit is a tool failure; unparseable stdout is a payload parse
/// failure so callers can tell output drift from a broken tool.
pub async fn run_json_command<T: serde::de::DeserializeOwned>(
    program: &str,
    args: &[&str],
    timeout_duration: Duration,
) -> Result<T> {
    let output = run_command(program, args, timeout_duration).await?;

    if !output.success() {
        return Err(EngineError::ToolFailed {
            tool: program.to_string(),
            reason: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
        });
    }

    serde_json::from_str(&output.stdout).map_err(|e| EngineError::ParsePayload {
        provider: program.to_string(),
        message: format!(
            "{e}: {}",
            output.stdout.chars().take(200).collect::<String>()
        ),
    })
}
