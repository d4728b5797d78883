//! Process execution for diagnostic tools.
//!
//! Implements the core [`CommandRunner`] port with `tokio::process`. Every
//! invocation has a timeout; the child is killed when it expires.

use std::process::Stdio;

use async_trait::async_trait;
use hcacheck_core::ports::{CommandOutput, CommandRequest, CommandRunner};
use hcacheck_core::ProcessError;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands as child processes of the agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput, ProcessError> {
        let command_line = request.display();
        debug!(command = %command_line, timeout_ms = request.timeout.as_millis(), "running command");

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ProcessError::StartFailed {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProcessError::StartFailed {
                    command: command_line,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command_line, "command timed out, killed");
                return Err(ProcessError::TimedOut {
                    command: command_line,
                    timeout_ms: request.timeout.as_millis(),
                });
            }
        };

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
