//! Secret store client.
//!
//! The coordinator never talks to a concrete secrets backend directly; it
//! goes through the [`SecretStore`] trait so that tests can run against
//! [`MemorySecretStore`] and the CLI against [`FileSecretStore`].
//!
//! Both bundled implementations share the same label bookkeeping, which
//! enforces the invariants the protocol relies on: at most one `CURRENT`
//! and at most one `PENDING` version per secret.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::persist::JsonFile;
use crate::types::{Label, RotationToken, SecretId, SecretString, VersionId};

/// A secret value together with the version that holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersion {
    /// The version carrying the requested label.
    pub version_id: VersionId,
    /// The secret value of that version.
    pub value: SecretString,
}

/// Version ids of a secret mapped to the labels they carry.
pub type VersionLabels = BTreeMap<VersionId, BTreeSet<Label>>;

/// Client interface to the secret store.
///
/// Every method is a single request to the backing store. Implementations
/// must report a missing secret, version or label as [`Error::NotFound`] so
/// the coordinator can tell benign absence from real failures.
pub trait SecretStore: Send + Sync {
    /// Fetches the version carrying `label`.
    fn get_by_label(
        &self,
        secret_id: &SecretId,
        label: Label,
    ) -> impl Future<Output = Result<SecretVersion>> + Send;

    /// Fetches the value of the version created under `token`, provided it
    /// carries `label`.
    fn get_by_token_and_label(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        label: Label,
    ) -> impl Future<Output = Result<SecretString>> + Send;

    /// Stores `value` as a new version under `token` labeled `PENDING`.
    fn put_pending(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        value: SecretString,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Lists every version of the secret with its labels.
    fn describe_labels(
        &self,
        secret_id: &SecretId,
    ) -> impl Future<Output = Result<VersionLabels>> + Send;

    /// Moves `label` onto `to`, removing it from `from` in the same operation.
    ///
    /// `from` must name the version currently carrying the label, or be
    /// `None` when no version carries it.
    fn move_label(
        &self,
        secret_id: &SecretId,
        label: Label,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<S: SecretStore> SecretStore for Arc<S> {
    fn get_by_label(
        &self,
        secret_id: &SecretId,
        label: Label,
    ) -> impl Future<Output = Result<SecretVersion>> + Send {
        (**self).get_by_label(secret_id, label)
    }

    fn get_by_token_and_label(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        label: Label,
    ) -> impl Future<Output = Result<SecretString>> + Send {
        (**self).get_by_token_and_label(secret_id, token, label)
    }

    fn put_pending(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        value: SecretString,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).put_pending(secret_id, token, value)
    }

    fn describe_labels(
        &self,
        secret_id: &SecretId,
    ) -> impl Future<Output = Result<VersionLabels>> + Send {
        (**self).describe_labels(secret_id)
    }

    fn move_label(
        &self,
        secret_id: &SecretId,
        label: Label,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).move_label(secret_id, label, to, from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVersion {
    value: SecretString,
    labels: BTreeSet<Label>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSecret {
    versions: BTreeMap<VersionId, StoredVersion>,
}

impl StoredSecret {
    fn holder_of(&self, label: Label) -> Option<&VersionId> {
        self.versions
            .iter()
            .find(|(_, version)| version.labels.contains(&label))
            .map(|(id, _)| id)
    }
}

/// Label bookkeeping shared by the bundled store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct SecretTable {
    secrets: BTreeMap<SecretId, StoredSecret>,
}

impl SecretTable {
    fn secret(&self, secret_id: &SecretId) -> Result<&StoredSecret> {
        self.secrets.get(secret_id).ok_or_else(|| Error::NotFound {
            what: format!("secret {secret_id}"),
        })
    }

    fn secret_mut(&mut self, secret_id: &SecretId) -> Result<&mut StoredSecret> {
        self.secrets.get_mut(secret_id).ok_or_else(|| Error::NotFound {
            what: format!("secret {secret_id}"),
        })
    }

    fn get_by_label(&self, secret_id: &SecretId, label: Label) -> Result<SecretVersion> {
        let secret = self.secret(secret_id)?;
        let version_id = secret.holder_of(label).ok_or_else(|| Error::NotFound {
            what: format!("{label} version of secret {secret_id}"),
        })?;
        let version = &secret.versions[version_id];
        Ok(SecretVersion {
            version_id: version_id.clone(),
            value: version.value.clone(),
        })
    }

    fn get_by_token_and_label(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        label: Label,
    ) -> Result<SecretString> {
        self.secret(secret_id)?
            .versions
            .get(&token.version_id())
            .filter(|version| version.labels.contains(&label))
            .map(|version| version.value.clone())
            .ok_or_else(|| Error::NotFound {
                what: format!("{label} version {token} of secret {secret_id}"),
            })
    }

    fn put_pending(
        &mut self,
        secret_id: &SecretId,
        token: &RotationToken,
        value: SecretString,
    ) -> Result<()> {
        let secret = self.secret_mut(secret_id)?;
        let version_id = token.version_id();

        if let Some(existing) = secret.versions.get(&version_id) {
            // Same request replayed: the version is immutable once written.
            if existing.value == value {
                return Ok(());
            }
            return Err(Error::store(format!(
                "version {version_id} of secret {secret_id} already exists with a different value"
            )));
        }

        if let Some(holder) = secret.holder_of(Label::Pending) {
            return Err(Error::store(format!(
                "secret {secret_id} already has a pending version {holder}"
            )));
        }

        secret.versions.insert(
            version_id,
            StoredVersion {
                value,
                labels: BTreeSet::from([Label::Pending]),
            },
        );
        Ok(())
    }

    fn describe_labels(&self, secret_id: &SecretId) -> Result<VersionLabels> {
        Ok(self
            .secret(secret_id)?
            .versions
            .iter()
            .map(|(id, version)| (id.clone(), version.labels.clone()))
            .collect())
    }

    fn move_label(
        &mut self,
        secret_id: &SecretId,
        label: Label,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> Result<()> {
        let secret = self.secret_mut(secret_id)?;
        if !secret.versions.contains_key(to) {
            return Err(Error::NotFound {
                what: format!("version {to} of secret {secret_id}"),
            });
        }

        let holder = secret.holder_of(label).cloned();
        match (holder.as_ref(), from) {
            (Some(holder), _) if holder == to => return Ok(()),
            (Some(holder), Some(from)) if holder == from => {}
            (None, None) => {}
            (holder, from) => {
                return Err(Error::store(format!(
                    "{label} is attached to {}, not {}",
                    holder.map_or("no version", VersionId::as_str),
                    from.map_or("no version", VersionId::as_str),
                )));
            }
        }

        if let Some(version) = holder.and_then(|id| secret.versions.get_mut(&id)) {
            version.labels.remove(&label);
        }
        if let Some(version) = secret.versions.get_mut(to) {
            version.labels.insert(label);
            // Promotion completes the pending stage.
            if label == Label::Current {
                version.labels.remove(&Label::Pending);
            }
        }
        secret.versions.retain(|_, version| !version.labels.is_empty());
        Ok(())
    }

    /// Checks that `value` can be installed as `CURRENT` under `version_id`.
    ///
    /// Versions are immutable, and a pending version belongs to a rotation in
    /// progress, so an existing version may only be re-labeled when it holds
    /// the same value and is not pending.
    fn check_current(
        &self,
        secret_id: &SecretId,
        version_id: &VersionId,
        value: &SecretString,
    ) -> Result<()> {
        let Some(existing) = self
            .secrets
            .get(secret_id)
            .and_then(|secret| secret.versions.get(version_id))
        else {
            return Ok(());
        };
        if existing.labels.contains(&Label::Pending) {
            return Err(Error::store(format!(
                "version {version_id} of secret {secret_id} is pending a rotation"
            )));
        }
        if existing.value != *value {
            return Err(Error::store(format!(
                "version {version_id} of secret {secret_id} already exists with a different value"
            )));
        }
        Ok(())
    }

    /// Installs `value` as the `CURRENT` version of `secret_id`, creating the
    /// secret if needed.
    ///
    /// This is the provisioning path, not part of the rotation protocol.
    fn insert_current(
        &mut self,
        secret_id: &SecretId,
        version_id: VersionId,
        value: SecretString,
    ) -> Result<()> {
        self.check_current(secret_id, &version_id, &value)?;
        let secret = self.secrets.entry(secret_id.clone()).or_default();
        for version in secret.versions.values_mut() {
            version.labels.remove(&Label::Current);
        }
        secret
            .versions
            .entry(version_id)
            .or_insert_with(|| StoredVersion {
                value,
                labels: BTreeSet::new(),
            })
            .labels
            .insert(Label::Current);
        secret.versions.retain(|_, version| !version.labels.is_empty());
        Ok(())
    }
}

/// An in-process secret store.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    table: RwLock<SecretTable>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `value` as the `CURRENT` version of `secret_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `version_id` already exists with another value or
    /// is pending a rotation.
    pub fn insert_current(
        &self,
        secret_id: &SecretId,
        version_id: VersionId,
        value: SecretString,
    ) -> Result<()> {
        self.write(|table| table.insert_current(secret_id, version_id, value))
    }

    fn read<R>(&self, f: impl FnOnce(&SecretTable) -> R) -> R {
        f(&self
            .table
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    fn write<R>(&self, f: impl FnOnce(&mut SecretTable) -> R) -> R {
        f(&mut self
            .table
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }
}

impl SecretStore for MemorySecretStore {
    async fn get_by_label(&self, secret_id: &SecretId, label: Label) -> Result<SecretVersion> {
        self.read(|table| table.get_by_label(secret_id, label))
    }

    async fn get_by_token_and_label(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        label: Label,
    ) -> Result<SecretString> {
        self.read(|table| table.get_by_token_and_label(secret_id, token, label))
    }

    async fn put_pending(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        value: SecretString,
    ) -> Result<()> {
        self.write(|table| table.put_pending(secret_id, token, value))
    }

    async fn describe_labels(&self, secret_id: &SecretId) -> Result<VersionLabels> {
        self.read(|table| table.describe_labels(secret_id))
    }

    async fn move_label(
        &self,
        secret_id: &SecretId,
        label: Label,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> Result<()> {
        self.write(|table| table.move_label(secret_id, label, to, from))
    }
}

/// A secret store persisted as a JSON document.
///
/// Every call loads the document, applies the operation and writes the
/// document back atomically. Calls within one process are serialized;
/// concurrent processes sharing the file are not coordinated.
#[derive(Debug)]
pub struct FileSecretStore {
    file: JsonFile,
    lock: Mutex<()>,
}

impl FileSecretStore {
    /// File name used inside a state directory.
    pub const FILE_NAME: &'static str = "secrets.json";

    /// Opens the store kept in `state_dir`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            file: JsonFile::new(state_dir.join(Self::FILE_NAME), "secret store"),
            lock: Mutex::new(()),
        }
    }

    /// Checks, without writing, that `value` could be installed as the
    /// `CURRENT` version of `secret_id` under `version_id`.
    ///
    /// # Errors
    ///
    /// Returns the error [`FileSecretStore::insert_current`] would return.
    pub async fn check_current(
        &self,
        secret_id: &SecretId,
        version_id: &VersionId,
        value: &SecretString,
    ) -> Result<()> {
        self.inspect(|table| table.check_current(secret_id, version_id, value))
            .await
    }

    /// Installs `value` as the `CURRENT` version of `secret_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `version_id` already exists with another value or
    /// is pending a rotation, or the file cannot be read or written.
    pub async fn insert_current(
        &self,
        secret_id: &SecretId,
        version_id: VersionId,
        value: SecretString,
    ) -> Result<()> {
        self.mutate(|table| table.insert_current(secret_id, version_id, value))
            .await
    }

    async fn inspect<R>(&self, f: impl FnOnce(&SecretTable) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().await;
        let table: SecretTable = self.file.load().await?;
        f(&table)
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut SecretTable) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut table: SecretTable = self.file.load().await?;
        let out = f(&mut table)?;
        self.file.save(&table).await?;
        debug!(path = %self.file.path().display(), "secret store snapshot written");
        Ok(out)
    }
}

impl SecretStore for FileSecretStore {
    async fn get_by_label(&self, secret_id: &SecretId, label: Label) -> Result<SecretVersion> {
        self.inspect(|table| table.get_by_label(secret_id, label)).await
    }

    async fn get_by_token_and_label(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        label: Label,
    ) -> Result<SecretString> {
        self.inspect(|table| table.get_by_token_and_label(secret_id, token, label))
            .await
    }

    async fn put_pending(
        &self,
        secret_id: &SecretId,
        token: &RotationToken,
        value: SecretString,
    ) -> Result<()> {
        self.mutate(|table| table.put_pending(secret_id, token, value))
            .await
    }

    async fn describe_labels(&self, secret_id: &SecretId) -> Result<VersionLabels> {
        self.inspect(|table| table.describe_labels(secret_id)).await
    }

    async fn move_label(
        &self,
        secret_id: &SecretId,
        label: Label,
        to: &VersionId,
        from: Option<&VersionId>,
    ) -> Result<()> {
        self.mutate(|table| table.move_label(secret_id, label, to, from))
            .await
    }
}
