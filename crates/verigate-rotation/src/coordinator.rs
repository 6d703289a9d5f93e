//! The rotation coordinator.
//!
//! Rotation runs as four externally driven steps:
//!
//! ```text
//!  createSecret ──▶ setSecret ──▶ testSecret ──▶ finishSecret
//!  (store PENDING)  (mirror to     (target holds   (move CURRENT
//!                    target)        PENDING?)       onto PENDING)
//! ```
//!
//! The coordinator keeps no state between steps. Everything it needs is
//! re-read from the secret store and the configuration target, so any step
//! can be re-delivered, and a crash between two steps is recovered by
//! delivering the next one.

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::password::{PasswordGenerator, PasswordPolicy};
use crate::store::SecretStore;
use crate::target::{
    ConfigTarget, FieldExpectation, FieldLocator, SwapOutcome, TargetRecord, VersionTag,
    compare_and_swap_field, read_field,
};
use crate::types::{Label, RotationEvent, RotationStep, RotationToken, SecretId, StepReport};

/// Placeholder target for rotators that only rotate the secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTarget;

impl ConfigTarget for NoTarget {
    async fn read_config(&self, _target_id: &str) -> Result<(TargetRecord, VersionTag)> {
        Err(Error::Configuration {
            reason: "no configuration target configured".to_string(),
        })
    }

    async fn write_config(
        &self,
        _target_id: &str,
        _record: TargetRecord,
        _expected: &VersionTag,
    ) -> Result<VersionTag> {
        Err(Error::Configuration {
            reason: "no configuration target configured".to_string(),
        })
    }
}

/// A configuration target together with the field that mirrors the secret.
#[derive(Debug)]
struct TargetSync<T> {
    target: T,
    locator: FieldLocator,
}

/// Executes rotation steps against a secret store and, optionally, a
/// configuration target.
#[derive(Debug)]
pub struct Rotator<S, T, G> {
    store: S,
    sync: Option<TargetSync<T>>,
    generator: G,
    policy: PasswordPolicy,
}

impl<S, G> Rotator<S, NoTarget, G>
where
    S: SecretStore,
    G: PasswordGenerator,
{
    /// Creates a rotator that only rotates the secret; `setSecret` and
    /// `testSecret` succeed without doing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the policy is invalid.
    pub fn without_target(store: S, generator: G, policy: PasswordPolicy) -> Result<Self> {
        check_policy(&policy)?;
        Ok(Self {
            store,
            sync: None,
            generator,
            policy,
        })
    }
}

impl<S, T, G> Rotator<S, T, G>
where
    S: SecretStore,
    T: ConfigTarget,
    G: PasswordGenerator,
{
    /// Creates a rotator that keeps `locator` in `target` in sync with the
    /// secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the policy is invalid.
    pub fn with_target(
        store: S,
        target: T,
        locator: FieldLocator,
        generator: G,
        policy: PasswordPolicy,
    ) -> Result<Self> {
        check_policy(&policy)?;
        Ok(Self {
            store,
            sync: Some(TargetSync { target, locator }),
            generator,
            policy,
        })
    }

    /// Returns the secret store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the mirrored field, if a target is configured.
    pub fn locator(&self) -> Option<&FieldLocator> {
        self.sync.as_ref().map(|sync| &sync.locator)
    }

    /// Validates a trigger event and runs the step it names.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is malformed or the step fails.
    pub async fn handle(&self, event: &RotationEvent) -> Result<()> {
        let (secret_id, token, step) = event.parse()?;
        self.run_step(step, &secret_id, &token).await
    }

    /// Like [`Rotator::handle`], but reports the outcome in the shape the
    /// rotation trigger expects.
    pub async fn handle_report(&self, event: &RotationEvent) -> StepReport {
        let result = self.handle(event).await;
        if let Err(e) = &result {
            error!(
                secret_id = %event.secret_id,
                token = %event.client_request_token,
                step = %event.step,
                retryable = e.is_retryable(),
                error = %e,
                "rotation step failed"
            );
        }
        StepReport::from_result(&result)
    }

    /// Runs one rotation step.
    ///
    /// # Errors
    ///
    /// Returns the step's failure.
    pub async fn run_step(
        &self,
        step: RotationStep,
        secret_id: &SecretId,
        token: &RotationToken,
    ) -> Result<()> {
        info!(%secret_id, %token, %step, "running rotation step");
        match step {
            RotationStep::CreateSecret => self.create_secret(secret_id, token).await,
            RotationStep::SetSecret => self.set_secret(secret_id, token).await,
            RotationStep::TestSecret => self.test_secret(secret_id, token).await,
            RotationStep::FinishSecret => self.finish_secret(secret_id, token).await,
        }
    }

    /// Ensures a `PENDING` version exists for `token`.
    ///
    /// A secret without a `CURRENT` version is not managed yet and is left
    /// alone. A pending version that already exists is kept, so at most one
    /// value is generated per rotation attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written, or the
    /// generator fails.
    pub async fn create_secret(&self, secret_id: &SecretId, token: &RotationToken) -> Result<()> {
        if let Err(e) = self.store.get_by_label(secret_id, Label::Current).await {
            return match e {
                Error::NotFound { .. } => {
                    info!(%secret_id, "secret has no current version, nothing to rotate");
                    Ok(())
                }
                other => Err(other),
            };
        }

        match self
            .store
            .get_by_token_and_label(secret_id, token, Label::Pending)
            .await
        {
            Ok(_) => {
                debug!(%secret_id, %token, "pending version already exists");
                return Ok(());
            }
            Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let value = self.generator.generate(&self.policy)?;
        self.store.put_pending(secret_id, token, value).await?;
        info!(%secret_id, %token, "pending version created");
        Ok(())
    }

    /// Mirrors the `PENDING` value into the configuration target.
    ///
    /// The field is only replaced if it still holds the `CURRENT` value
    /// (or does not exist yet). Any other value is drift and fails the step
    /// without writing.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no pending version or the target section is missing
    /// - [`Error::Drift`] if the field does not mirror `CURRENT`
    /// - [`Error::Conflict`] if the target changed while the step ran
    pub async fn set_secret(&self, secret_id: &SecretId, token: &RotationToken) -> Result<()> {
        let Some(sync) = &self.sync else {
            debug!(%secret_id, "no configuration target, skipping setSecret");
            return Ok(());
        };

        let current = match self.store.get_by_label(secret_id, Label::Current).await {
            Ok(version) => Some(version.value),
            Err(Error::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        let pending = self
            .store
            .get_by_token_and_label(secret_id, token, Label::Pending)
            .await?;

        let expected = current
            .as_ref()
            .map_or(FieldExpectation::Absent, FieldExpectation::Mirrors);

        let outcome = compare_and_swap_field(&sync.target, &sync.locator, expected, &pending)
            .await
            .inspect_err(|e| {
                if matches!(e, Error::Drift { .. }) {
                    warn!(%secret_id, field = %sync.locator, error = %e, "refusing to overwrite drifted field");
                }
            })?;

        match outcome {
            SwapOutcome::Written(tag) => {
                info!(%secret_id, %token, field = %sync.locator, %tag, "pending value written to configuration target");
            }
            SwapOutcome::Unchanged(_) => {
                debug!(%secret_id, %token, field = %sync.locator, "configuration target already holds pending value");
            }
        }
        Ok(())
    }

    /// Confirms the configuration target holds the `PENDING` value.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if there is no pending version or the field is absent
    /// - [`Error::Drift`] if the field holds anything else
    pub async fn test_secret(&self, secret_id: &SecretId, token: &RotationToken) -> Result<()> {
        let Some(sync) = &self.sync else {
            debug!(%secret_id, "no configuration target, skipping testSecret");
            return Ok(());
        };

        let pending = self
            .store
            .get_by_token_and_label(secret_id, token, Label::Pending)
            .await?;

        match read_field(&sync.target, &sync.locator).await? {
            None => Err(Error::NotFound {
                what: format!("field {}", sync.locator),
            }),
            Some(Some(value)) if pending.matches(&value) => {
                info!(%secret_id, %token, field = %sync.locator, "configuration target holds pending value");
                Ok(())
            }
            Some(_) => Err(Error::Drift {
                field: sync.locator.to_string(),
                reason: "pending secret does not match configuration target".to_string(),
            }),
        }
    }

    /// Promotes the version created under `token` to `CURRENT`.
    ///
    /// The label is moved in one store operation, so there is never a
    /// moment with zero or two current versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the labels cannot be read or moved.
    pub async fn finish_secret(&self, secret_id: &SecretId, token: &RotationToken) -> Result<()> {
        let labels = self.store.describe_labels(secret_id).await?;
        let version = token.version_id();

        if labels
            .get(&version)
            .is_some_and(|labels| labels.contains(&Label::Current))
        {
            debug!(%secret_id, %token, "version is already current");
            return Ok(());
        }

        let previous = labels
            .iter()
            .find(|(_, labels)| labels.contains(&Label::Current))
            .map(|(id, _)| id.clone());

        self.store
            .move_label(secret_id, Label::Current, &version, previous.as_ref())
            .await?;

        info!(
            %secret_id,
            %token,
            previous = previous.as_ref().map_or("none", |v| v.as_str()),
            "rotation finished, pending version is now current"
        );
        Ok(())
    }
}

fn check_policy(policy: &PasswordPolicy) -> Result<()> {
    policy.validate().map_err(|e| Error::Configuration {
        reason: e.to_string(),
    })
}
