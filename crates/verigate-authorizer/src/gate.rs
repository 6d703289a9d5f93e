//! Request verification against the `CURRENT` secret.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use verigate_rotation::{Label, SecretId, SecretStore};

use crate::error::{Error, Result};

/// Characters allowed in an HTTP header name besides ASCII alphanumerics.
const TOKEN_PUNCTUATION: &str = "!#$%&'*+-.^_`|~";

/// Which secret to check and where to find it in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    secret_id: SecretId,
    header_name: String,
}

impl GateConfig {
    /// Creates a configuration. The header name is stored lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderName`] if `header_name` is not a valid
    /// HTTP field name.
    pub fn new(secret_id: SecretId, header_name: impl Into<String>) -> Result<Self> {
        let header_name = header_name.into();
        validate_header_name(&header_name)?;
        Ok(Self {
            secret_id,
            header_name: header_name.to_ascii_lowercase(),
        })
    }

    /// The secret whose `CURRENT` value requests must carry.
    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }

    /// The lowercased header name.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidHeaderName {
            reason: "header name cannot be empty".to_string(),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || TOKEN_PUNCTUATION.contains(*c)))
    {
        return Err(Error::InvalidHeaderName {
            reason: format!("header name contains invalid character {c:?}"),
        });
    }
    Ok(())
}

/// An inbound request as far as the gate is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Request headers by name.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    /// Creates a request without headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Values of every header whose name matches `name` ignoring ASCII case.
    fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The gate's answer. There is no partial authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request may pass.
    #[serde(rename = "isAuthorized")]
    pub authorized: bool,
}

impl Decision {
    /// Let the request through.
    #[must_use]
    pub const fn allow() -> Self {
        Self { authorized: true }
    }

    /// Reject the request.
    #[must_use]
    pub const fn deny() -> Self {
        Self { authorized: false }
    }
}

/// Admits requests carrying the `CURRENT` secret value.
#[derive(Debug)]
pub struct VerificationGate<S> {
    store: S,
    config: GateConfig,
}

impl<S: SecretStore> VerificationGate<S> {
    /// Creates a gate reading from `store`.
    pub fn new(store: S, config: GateConfig) -> Self {
        Self { store, config }
    }

    /// Returns the gate configuration.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decides a request.
    ///
    /// The header must appear exactly once and equal `CURRENT` byte for
    /// byte. The comparison runs in constant time. A missing header, a
    /// repeated header or a store error all deny.
    pub async fn authorize(&self, request: &AuthorizationRequest) -> Decision {
        let name = self.config.header_name();
        let mut values = request.header_values(name);
        let presented = match (values.next(), values.next()) {
            (Some(value), None) => value,
            (None, _) => {
                info!(header = name, "verification header missing");
                return Decision::deny();
            }
            (Some(_), Some(_)) => {
                warn!(header = name, "verification header repeated");
                return Decision::deny();
            }
        };

        let current = match self
            .store
            .get_by_label(self.config.secret_id(), Label::Current)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                warn!(
                    secret_id = %self.config.secret_id(),
                    error = %e,
                    "cannot read current secret, denying"
                );
                return Decision::deny();
            }
        };

        if current.value.matches(presented) {
            debug!(header = name, version_id = %current.version_id, "request authorized");
            Decision::allow()
        } else {
            info!(header = name, "verification header does not match current secret");
            Decision::deny()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use verigate_rotation::{
        Error as StoreError, MemorySecretStore, RotationToken, SecretString, SecretVersion,
        VersionId, VersionLabels,
    };

    const HEADER: &str = "X-Origin-Verify";

    fn secret_id() -> SecretId {
        SecretId::new("origin-verify").expect("valid id")
    }

    fn gate() -> VerificationGate<MemorySecretStore> {
        let store = MemorySecretStore::new();
        store
            .insert_current(&secret_id(), VersionId::new("v1"), SecretString::new("s3cret"))
            .expect("seed");
        let config = GateConfig::new(secret_id(), HEADER).expect("valid config");
        VerificationGate::new(store, config)
    }

    /// A store whose every call fails.
    struct UnavailableStore;

    fn outage() -> StoreError {
        StoreError::Upstream {
            source_system: "secret store",
            reason: "connection refused".to_string(),
        }
    }

    impl SecretStore for UnavailableStore {
        async fn get_by_label(
            &self,
            _secret_id: &SecretId,
            _label: Label,
        ) -> verigate_rotation::Result<SecretVersion> {
            Err(outage())
        }

        async fn get_by_token_and_label(
            &self,
            _secret_id: &SecretId,
            _token: &RotationToken,
            _label: Label,
        ) -> verigate_rotation::Result<SecretString> {
            Err(outage())
        }

        async fn put_pending(
            &self,
            _secret_id: &SecretId,
            _token: &RotationToken,
            _value: SecretString,
        ) -> verigate_rotation::Result<()> {
            Err(outage())
        }

        async fn describe_labels(
            &self,
            _secret_id: &SecretId,
        ) -> verigate_rotation::Result<VersionLabels> {
            Err(outage())
        }

        async fn move_label(
            &self,
            _secret_id: &SecretId,
            _label: Label,
            _to: &VersionId,
            _from: Option<&VersionId>,
        ) -> verigate_rotation::Result<()> {
            Err(outage())
        }
    }

    #[test_case("x-origin-verify", "s3cret", true ; "lowercase name")]
    #[test_case("X-ORIGIN-VERIFY", "s3cret", true ; "uppercase name")]
    #[test_case("x-origin-verify", "S3CRET", false ; "value is case sensitive")]
    #[test_case("x-origin-verify", "s3cret ", false ; "trailing space")]
    #[test_case("x-origin-verify", "", false ; "empty value")]
    #[test_case("x-other", "s3cret", false ; "different header")]
    #[tokio::test]
    async fn test_authorize(name: &str, value: &str, expected: bool) {
        let request = AuthorizationRequest::new().with_header(name, value);
        assert_eq!(gate().authorize(&request).await.authorized, expected);
    }

    #[tokio::test]
    async fn test_missing_header_denies() {
        let decision = gate().authorize(&AuthorizationRequest::new()).await;
        assert_eq!(decision, Decision::deny());
    }

    #[tokio::test]
    async fn test_repeated_header_denies() {
        let request = AuthorizationRequest::new()
            .with_header("x-origin-verify", "s3cret")
            .with_header("X-Origin-Verify", "s3cret");
        assert_eq!(gate().authorize(&request).await, Decision::deny());
    }

    #[tokio::test]
    async fn test_store_outage_denies() {
        let config = GateConfig::new(secret_id(), HEADER).expect("valid config");
        let gate = VerificationGate::new(UnavailableStore, config);
        let request = AuthorizationRequest::new().with_header(HEADER, "s3cret");
        assert_eq!(gate.authorize(&request).await, Decision::deny());
    }

    #[tokio::test]
    async fn test_unknown_secret_denies() {
        let store = MemorySecretStore::new();
        let config = GateConfig::new(secret_id(), HEADER).expect("valid config");
        let gate = VerificationGate::new(store, config);
        let request = AuthorizationRequest::new().with_header(HEADER, "s3cret");
        assert_eq!(gate.authorize(&request).await, Decision::deny());
    }

    #[tokio::test]
    async fn test_pending_value_is_not_accepted() {
        let gate = gate();
        let token = RotationToken::new("t1").expect("valid token");
        gate.store
            .put_pending(&secret_id(), &token, SecretString::new("next"))
            .await
            .expect("put pending");

        let request = AuthorizationRequest::new().with_header(HEADER, "next");
        assert_eq!(gate.authorize(&request).await, Decision::deny());
    }

    #[test_case("" ; "empty")]
    #[test_case("x origin" ; "space")]
    #[test_case("x-origin:verify" ; "colon")]
    #[test_case("x-örigin" ; "non ascii")]
    fn test_invalid_header_names(name: &str) {
        let result = GateConfig::new(secret_id(), name);
        assert!(matches!(result, Err(Error::InvalidHeaderName { .. })));
    }

    #[test]
    fn test_decision_serializes_like_simple_authorizer_response() {
        let json = serde_json::to_string(&Decision::allow()).expect("serialize");
        assert_eq!(json, r#"{"isAuthorized":true}"#);
    }

    #[test]
    fn test_request_deserializes_without_headers() {
        let request: AuthorizationRequest = serde_json::from_str("{}").expect("deserialize");
        assert!(request.headers.is_empty());
    }
}
