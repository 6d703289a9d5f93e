//! Error types for the rotation coordinator and its clients.

use thiserror::Error;

/// Errors that can occur while rotating a secret.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or malformed.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// An expected secret version or configuration field is absent.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing item.
        what: String,
    },

    /// The configuration target no longer mirrors the secret store.
    #[error("configuration drift on {field}: {reason}")]
    Drift {
        /// The field that drifted.
        field: String,
        /// How the recorded value disagrees with the store.
        reason: String,
    },

    /// The configuration target changed since it was read.
    #[error("conflicting write to {target}: expected version tag {expected}")]
    Conflict {
        /// The target that rejected the write.
        target: String,
        /// The version tag presented with the write.
        expected: String,
    },

    /// Any other failure reported by the secret store or configuration target.
    #[error("{source_system} error: {reason}")]
    Upstream {
        /// Which external system failed.
        source_system: &'static str,
        /// The failure reported by that system.
        reason: String,
    },

    /// The password policy cannot produce a value.
    #[error("invalid password policy: {reason}")]
    InvalidPolicy {
        /// Why the policy was rejected.
        reason: String,
    },

    /// The rotation event named an unknown step.
    #[error("invalid step parameter: {step}")]
    InvalidStep {
        /// The step name that was received.
        step: String,
    },

    /// A secret id, token or other identifier failed validation.
    #[error("invalid identifier: {reason}")]
    InvalidIdentifier {
        /// The reason the identifier is invalid.
        reason: String,
    },
}

impl Error {
    /// Returns true if re-delivering the same step may succeed.
    ///
    /// Conflicts are resolved by re-reading the target on the next attempt;
    /// upstream failures are transient by assumption. Drift, configuration
    /// and validation failures need an operator.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Upstream { .. })
    }

    /// Shorthand for a secret store failure.
    pub(crate) fn store(reason: impl Into<String>) -> Self {
        Self::Upstream {
            source_system: "secret store",
            reason: reason.into(),
        }
    }
}

/// Result type alias for rotation operations.
pub type Result<T> = std::result::Result<T, Error>;
