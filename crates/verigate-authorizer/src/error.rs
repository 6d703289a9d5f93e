//! Error types for the verification gate.

use thiserror::Error;

/// Errors raised while configuring a verification gate.
///
/// Authorization itself never fails: anything that goes wrong while
/// deciding a request is a deny.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured header name cannot appear in an HTTP request.
    #[error("invalid header name: {reason}")]
    InvalidHeaderName {
        /// Why the name was rejected.
        reason: String,
    },
}

/// Result type for gate configuration.
pub type Result<T> = std::result::Result<T, Error>;
