//! Core types for the rotation protocol.
//!
//! This module defines the fundamental types shared by the coordinator and
//! its clients:
//! - [`SecretId`]: A validated identifier for a managed secret
//! - [`RotationToken`]: The client request token correlating one rotation attempt
//! - [`VersionId`] and [`Label`]: How secret versions are addressed
//! - [`SecretString`]: A secret value that zeroizes on drop
//! - [`RotationStep`], [`RotationEvent`], [`StepReport`]: The trigger interface

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// A validated identifier for a secret.
///
/// Secret IDs must:
/// - Be between 1 and 2048 characters
/// - Contain no whitespace or control characters
///
/// Names and ARNs are both accepted; the store decides how to resolve them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretId(String);

impl SecretId {
    /// Maximum length of a secret identifier.
    pub const MAX_LENGTH: usize = 2048;

    /// Creates a new `SecretId` after validating the input.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier("secret id", &id, Self::MAX_LENGTH)?;
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SecretId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SecretId> for String {
    fn from(id: SecretId) -> Self {
        id.0
    }
}

/// The client request token of a rotation attempt.
///
/// The same token is delivered with every step of one attempt and becomes
/// the version id of the pending version created by `createSecret`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RotationToken(String);

impl RotationToken {
    /// Maximum length of a rotation token.
    pub const MAX_LENGTH: usize = 256;

    /// Creates a new `RotationToken` after validating the input.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty, too long or contains whitespace.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        validate_identifier("rotation token", &token, Self::MAX_LENGTH)?;
        Ok(Self(token))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the version id this token addresses.
    #[must_use]
    pub fn version_id(&self) -> VersionId {
        VersionId::new(self.0.clone())
    }
}

impl fmt::Display for RotationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RotationToken {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RotationToken> for String {
    fn from(token: RotationToken) -> Self {
        token.0
    }
}

fn validate_identifier(kind: &str, value: &str, max_length: usize) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidIdentifier {
            reason: format!("{kind} cannot be empty"),
        });
    }

    if value.len() > max_length {
        return Err(Error::InvalidIdentifier {
            reason: format!("{kind} exceeds maximum length of {max_length} characters"),
        });
    }

    if let Some(c) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidIdentifier {
            reason: format!("{kind} contains invalid character {c:?}"),
        });
    }

    Ok(())
}

/// An opaque identifier of one stored secret version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// Creates a version identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&RotationToken> for VersionId {
    fn from(token: &RotationToken) -> Self {
        token.version_id()
    }
}

/// The role a secret version plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    /// The value trusted by every verifier.
    Current,
    /// A candidate value being validated.
    Pending,
}

impl Label {
    /// Returns the wire name of the label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "CURRENT",
            Self::Pending => "PENDING",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret value that securely zeroizes memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    /// Wraps a plaintext secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Returns the plaintext value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Compares against a plaintext candidate in constant time.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        use subtle::ConstantTimeEq;
        self.value.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose the value in debug output
        f.debug_struct("SecretString")
            .field("len", &self.value.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.value)
    }
}

impl Eq for SecretString {}

/// One step of the four-step rotation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RotationStep {
    /// Generate and store the pending version.
    CreateSecret,
    /// Push the pending value to the configuration target.
    SetSecret,
    /// Confirm the configuration target adopted the pending value.
    TestSecret,
    /// Promote the pending version to current.
    FinishSecret,
}

impl RotationStep {
    /// All steps in protocol order.
    pub const ALL: [Self; 4] = [
        Self::CreateSecret,
        Self::SetSecret,
        Self::TestSecret,
        Self::FinishSecret,
    ];

    /// Returns the wire name of the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateSecret => "createSecret",
            Self::SetSecret => "setSecret",
            Self::TestSecret => "testSecret",
            Self::FinishSecret => "finishSecret",
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| Error::InvalidStep {
                step: s.to_string(),
            })
    }
}

/// A rotation event as delivered by the rotation trigger.
///
/// Fields are kept as raw strings so that validation failures surface as
/// step errors instead of being lost in deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationEvent {
    /// The secret being rotated.
    #[serde(alias = "SecretId")]
    pub secret_id: String,
    /// The token identifying this rotation attempt.
    #[serde(alias = "ClientRequestToken")]
    pub client_request_token: String,
    /// The step to execute.
    #[serde(alias = "Step")]
    pub step: String,
}

impl RotationEvent {
    /// Creates an event for the given step.
    #[must_use]
    pub fn new(secret_id: &SecretId, token: &RotationToken, step: RotationStep) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            client_request_token: token.to_string(),
            step: step.as_str().to_string(),
        }
    }

    /// Validates the raw fields.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is invalid.
    pub fn parse(&self) -> Result<(SecretId, RotationToken, RotationStep)> {
        let step = self.step.parse()?;
        let secret_id = SecretId::new(self.secret_id.clone())?;
        let token = RotationToken::new(self.client_request_token.clone())?;
        Ok((secret_id, token, step))
    }
}

/// The outcome of one step, as reported back to the rotation trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Whether the step completed.
    pub success: bool,
    /// Human-readable cause of a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    /// A successful step.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed step with its cause.
    #[must_use]
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }

    /// Converts a step result into a report.
    #[must_use]
    pub fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e),
        }
    }
}
