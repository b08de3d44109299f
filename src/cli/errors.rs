//! CLI-specific error types
//!
//! Every CLI error is fatal: it is printed and the process exits non-zero.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

/// CLI errors. `Display` leads with a stable `SHARELINK_CLI_*` code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("SHARELINK_CLI_CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    #[error("SHARELINK_CLI_OUTPUT_ERROR: {0}")]
    Output(String),

    #[error("SHARELINK_CLI_INVALID_ARGUMENT: {0}")]
    InvalidArgument(String),

    #[error("SHARELINK_CLI_BOOT_FAILED: {0}")]
    BootFailed(String),
}

impl CliError {
    /// Stable code for scripts matching on failures
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "SHARELINK_CLI_CONFIG_ERROR",
            CliError::Output(_) => "SHARELINK_CLI_OUTPUT_ERROR",
            CliError::InvalidArgument(_) => "SHARELINK_CLI_INVALID_ARGUMENT",
            CliError::BootFailed(_) => "SHARELINK_CLI_BOOT_FAILED",
        }
    }
}
