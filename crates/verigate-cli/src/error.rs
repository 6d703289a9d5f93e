//! CLI error types.

use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid argument or input document.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A rotation step ran and failed; its report has been printed.
    #[error("{step} failed: {reason}")]
    StepFailed {
        /// The step that failed, as received.
        step: String,
        /// The reported cause.
        reason: String,
    },

    /// Rotation library error.
    #[error(transparent)]
    Rotation(#[from] verigate_rotation::Error),

    /// Verification gate error.
    #[error(transparent)]
    Gate(#[from] verigate_authorizer::Error),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
