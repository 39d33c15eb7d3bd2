//! Error types for failure handling across the sandbox engine
//!
//! Two tiers are exposed. `SandboxError` is the crate-wide error callers see:
//! one variant per failure class, so call sites can distinguish "the
//! infrastructure failed" (unreachable container, failed file transfer) from
//! "the user's code failed" (which is reported through an execution record,
//! not an error). `ExecError` is the transport-level error of the low-level
//! command runner and carries the underlying Docker client failures.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),
    #[error("Environment for '{language}' is not available: {message}")]
    EnvironmentUnavailable { language: String, message: String },
    #[error("Container '{0}' not found")]
    ContainerNotFound(String),
    #[error("Failed to write file '{filename}': {message}")]
    WriteFailed { filename: String, message: String },
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Docker operation failed: {0}")]
    DockerError(String),
    #[error("Command execution failed: {0}")]
    ExecFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for SandboxError {
    fn from(err: std::io::Error) -> Self {
        SandboxError::IoError(err.to_string())
    }
}

impl From<bollard::errors::Error> for SandboxError {
    fn from(err: bollard::errors::Error) -> Self {
        SandboxError::DockerError(err.to_string())
    }
}

/// Transport-level error for single command invocations against a container.
///
/// `Timeout` is deliberately its own variant: the environment layer converts
/// it into a failed execution record rather than propagating it as an
/// infrastructure failure.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Docker client error: {0}")]
    Bollard(#[from] bollard::errors::Error),
    #[error("I/O error during command execution: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),
    #[error("Command finished without reporting an exit code")]
    MissingExitCode,
}

impl From<ExecError> for SandboxError {
    fn from(err: ExecError) -> Self {
        SandboxError::ExecFailed(err.to_string())
    }
}
