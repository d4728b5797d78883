//! Command runner port.
//!
//! Diagnostic tools (`lspci`, `setpci`, `ip`, `rdma`, `ofed_info`, `ping`)
//! are reached only through this trait so collectors can be tested with
//! canned output.

use std::time::Duration;

use async_trait::async_trait;

use super::ProcessError;

/// Default upper bound for one tool invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments joined for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Stdout of a successful run, or a `ProcessError::Failed` naming the command.
    pub fn into_stdout(self, request: &CommandRequest) -> Result<String, ProcessError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(ProcessError::Failed {
                command: request.display(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external commands with a timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion.
    ///
    /// A non-zero exit is reported in `CommandOutput::status`, not as an
    /// error. Errors are reserved for spawn failures and timeouts.
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput, ProcessError>;

    /// Run and return stdout, failing on a non-zero exit.
    async fn stdout(&self, request: CommandRequest) -> Result<String, ProcessError> {
        let output = self.run(request.clone()).await?;
        output.into_stdout(&request)
    }
}
