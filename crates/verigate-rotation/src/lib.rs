//! # Verigate Rotation
//!
//! Rotates a shared secret that a CDN attaches to every origin request as a
//! custom header, keeping the secret store and the CDN configuration in
//! step:
//!
//! - **Four-step protocol**: `createSecret`, `setSecret`, `testSecret` and
//!   `finishSecret`, each idempotent and safe to re-deliver
//! - **Drift detection**: the CDN field is only replaced while it still
//!   mirrors the `CURRENT` secret
//! - **Optimistic concurrency**: configuration writes carry the version tag
//!   they were read with
//! - **Policy-driven generation**: random values from configurable
//!   character classes
//!
//! ## Example
//!
//! ```rust
//! use verigate_rotation::{
//!     FieldLocator, MemoryConfigTarget, MemorySecretStore, PasswordPolicy,
//!     RandomPasswordGenerator, Rotator,
//! };
//!
//! let rotator = Rotator::with_target(
//!     MemorySecretStore::new(),
//!     MemoryConfigTarget::new(),
//!     FieldLocator::new("dist-1", "origin-1", "x-origin-verify"),
//!     RandomPasswordGenerator::new(),
//!     PasswordPolicy::default(),
//! )
//! .expect("valid policy");
//! assert!(rotator.locator().is_some());
//! ```
//!
//! ## Security Considerations
//!
//! - Secret values use `zeroize` to clear memory on drop
//! - Secret values are compared in constant time
//! - Debug output for secrets is redacted

pub mod coordinator;
pub mod error;
pub mod password;
mod persist;
pub mod store;
pub mod target;
pub mod types;

pub use coordinator::{NoTarget, Rotator};
pub use error::{Error, Result};
pub use password::{PasswordGenerator, PasswordPolicy, RandomPasswordGenerator};
pub use store::{FileSecretStore, MemorySecretStore, SecretStore, SecretVersion, VersionLabels};
pub use target::{
    ConfigTarget, CustomField, FieldExpectation, FieldLocator, FileConfigTarget,
    MemoryConfigTarget, Section, SwapOutcome, TargetRecord, VersionTag, compare_and_swap_field,
    read_field,
};
pub use types::{
    Label, RotationEvent, RotationStep, RotationToken, SecretId, SecretString, StepReport,
    VersionId,
};
