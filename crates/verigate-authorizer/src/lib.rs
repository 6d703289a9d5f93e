//! # Verigate Authorizer
//!
//! The consumer side of origin verification: an origin that only wants
//! traffic relayed by its CDN asks the [`VerificationGate`] whether a
//! request carries the `CURRENT` value of the shared secret in the agreed
//! header.
//!
//! ```rust
//! use verigate_authorizer::{GateConfig, VerificationGate};
//! use verigate_rotation::{MemorySecretStore, SecretId, SecretString, VersionId};
//!
//! let store = MemorySecretStore::new();
//! let secret_id = SecretId::new("origin-verify").expect("valid id");
//! store
//!     .insert_current(&secret_id, VersionId::new("v1"), SecretString::new("s3cret"))
//!     .expect("seed");
//!
//! let config = GateConfig::new(secret_id, "X-Origin-Verify").expect("valid header");
//! let gate = VerificationGate::new(store, config);
//! assert_eq!(gate.config().header_name(), "x-origin-verify");
//! ```
//!
//! A store outage never blocks the gate; it degrades to [`Decision::deny`].

pub mod error;
pub mod gate;

pub use error::{Error, Result};
pub use gate::{AuthorizationRequest, Decision, GateConfig, VerificationGate};
