//! CLI-specific error types and mappings.
//!
//! Library errors are folded into [`CliError`] so `main` can pick an exit
//! code without knowing every crate's error enum.

use hcacheck_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Core domain error.
    #[error("{0}")]
    Core(String),

    /// Invalid input on the command line.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Specification could not be resolved.
    #[error("Specification error: {0}")]
    Spec(String),

    /// Host facts could not be collected.
    #[error("Collection error: {0}")]
    Collect(String),

    /// External command failed.
    #[error("Process error: {0}")]
    Process(String),
}

impl CliError {
    /// Map error to an exit code.
    ///
    /// 1 is reserved for "checks ran and found something abnormal"; the
    /// other codes follow sysexits.h.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Core(_) => 70,      // EX_SOFTWARE
            Self::Arguments(_) => 64, // EX_USAGE
            Self::Io(_) => 74,        // EX_IOERR
            Self::Config(_) => 78,    // EX_CONFIG
            Self::Spec(_) => 66,      // EX_NOINPUT
            Self::Collect(_) => 69,   // EX_UNAVAILABLE
            Self::Process(_) => 71,   // EX_OSERR
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Spec(e) => Self::Spec(e.to_string()),
            CoreError::Gateway(e) => Self::Core(e.to_string()),
            CoreError::Process(e) => Self::Process(e.to_string()),
            CoreError::Settings(e) => Self::Config(e.to_string()),
            CoreError::Path(e) => Self::Config(e.to_string()),
            CoreError::Version(e) => Self::Arguments(e.to_string()),
            CoreError::Validation(msg) => Self::Arguments(msg),
        }
    }
}

impl From<hcacheck_runtime::CollectError> for CliError {
    fn from(err: hcacheck_runtime::CollectError) -> Self {
        Self::Collect(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Exit code for an error that reached `main`.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>().map_or(70, CliError::exit_code)
}
