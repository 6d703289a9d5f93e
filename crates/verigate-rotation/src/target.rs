//! Configuration target client.
//!
//! A configuration target is an external record (for example a CDN
//! distribution) whose sections carry named custom fields. One field,
//! addressed by a [`FieldLocator`], mirrors the current secret value so
//! that the origin can verify traffic really came through the CDN.
//!
//! Writes use optimistic concurrency: [`ConfigTarget::read_config`] returns
//! a [`VersionTag`] and [`ConfigTarget::write_config`] only succeeds if the
//! record still carries that tag. [`compare_and_swap_field`] packages the
//! read-check-write sequence so it can be reused with any target type.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::persist::JsonFile;
use crate::types::SecretString;

/// Opaque version tag of a target record (an ETag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named custom field. A field may exist without a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    /// Field (header) name.
    pub name: String,
    /// Field value, if any.
    #[serde(default)]
    pub value: Option<String>,
}

/// A section of a target record, e.g. one origin of a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Section identifier.
    pub id: String,
    /// Custom fields of this section.
    #[serde(default)]
    pub fields: Vec<CustomField>,
}

impl Section {
    /// Creates an empty section.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field with a value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name: String = name.into();
        self.set_field(&name, value.into());
        self
    }

    /// Returns the field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&CustomField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Sets the value of `name`, appending the field if it does not exist.
    pub fn set_field(&mut self, name: &str, value: String) {
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => field.value = Some(value),
            None => self.fields.push(CustomField {
                name: name.to_string(),
                value: Some(value),
            }),
        }
    }
}

/// The full record of a configuration target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    /// Sections of the record.
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl TargetRecord {
    /// Creates a record from sections.
    #[must_use]
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// Returns the section with the given id.
    #[must_use]
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }

    /// Returns the section with the given id, mutably.
    pub fn section_mut(&mut self, id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|section| section.id == id)
    }
}

/// Addresses the field that mirrors the secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLocator {
    /// The target (distribution) id.
    pub target_id: String,
    /// The section (origin) id inside the target.
    pub section_id: String,
    /// The field (header) name inside the section.
    pub field_name: String,
}

impl FieldLocator {
    /// Creates a locator.
    #[must_use]
    pub fn new(
        target_id: impl Into<String>,
        section_id: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            section_id: section_id.into(),
            field_name: field_name.into(),
        }
    }

    /// Finds the addressed section in a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the section does not exist.
    pub fn section<'r>(&self, record: &'r TargetRecord) -> Result<&'r Section> {
        record
            .section(&self.section_id)
            .ok_or_else(|| self.missing_section())
    }

    fn missing_section(&self) -> Error {
        Error::NotFound {
            what: format!(
                "section {} of configuration target {}",
                self.section_id, self.target_id
            ),
        }
    }
}

impl fmt::Display for FieldLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.target_id, self.section_id, self.field_name
        )
    }
}

/// What the mirrored field must hold before it may be replaced.
#[derive(Debug, Clone, Copy)]
pub enum FieldExpectation<'a> {
    /// The field must not exist yet.
    Absent,
    /// The field must hold this value. A field that does not exist yet is
    /// adopted.
    Mirrors(&'a SecretString),
}

/// Client interface to a configuration target.
pub trait ConfigTarget: Send + Sync {
    /// Reads the record and its current version tag.
    fn read_config(
        &self,
        target_id: &str,
    ) -> impl Future<Output = Result<(TargetRecord, VersionTag)>> + Send;

    /// Replaces the record if it still carries `expected`, returning the new tag.
    ///
    /// A stale tag fails with [`Error::Conflict`] and leaves the record
    /// untouched.
    fn write_config(
        &self,
        target_id: &str,
        record: TargetRecord,
        expected: &VersionTag,
    ) -> impl Future<Output = Result<VersionTag>> + Send;
}

impl<T: ConfigTarget> ConfigTarget for Arc<T> {
    fn read_config(
        &self,
        target_id: &str,
    ) -> impl Future<Output = Result<(TargetRecord, VersionTag)>> + Send {
        (**self).read_config(target_id)
    }

    fn write_config(
        &self,
        target_id: &str,
        record: TargetRecord,
        expected: &VersionTag,
    ) -> impl Future<Output = Result<VersionTag>> + Send {
        (**self).write_config(target_id, record, expected)
    }
}

/// Reads the mirrored field.
///
/// Returns `Ok(None)` when the section exists but the field does not. A
/// field without a value reads as `Some(None)`.
///
/// # Errors
///
/// Fails if the target cannot be read or the section does not exist.
pub async fn read_field<T: ConfigTarget>(
    target: &T,
    locator: &FieldLocator,
) -> Result<Option<Option<String>>> {
    let (record, _) = target.read_config(&locator.target_id).await?;
    Ok(locator
        .section(&record)?
        .field(&locator.field_name)
        .map(|field| field.value.clone()))
}

/// Result of [`compare_and_swap_field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The field was written; the record now carries this tag.
    Written(VersionTag),
    /// The field already held the new value; nothing was written.
    Unchanged(VersionTag),
}

/// Replaces the mirrored field with `new`, provided it matches `expected`.
///
/// The check and the write use the same read, so any change made between
/// them surfaces as [`Error::Conflict`] from the target. A field that
/// already holds `new` is left alone, which makes a replayed swap succeed.
///
/// # Errors
///
/// - [`Error::NotFound`] if the section does not exist
/// - [`Error::Drift`] if the field does not match `expected`; nothing is written
/// - [`Error::Conflict`] if the record changed since it was read
pub async fn compare_and_swap_field<T: ConfigTarget>(
    target: &T,
    locator: &FieldLocator,
    expected: FieldExpectation<'_>,
    new: &SecretString,
) -> Result<SwapOutcome> {
    let (mut record, tag) = target.read_config(&locator.target_id).await?;
    let section = locator.section(&record)?;
    let field = section.field(&locator.field_name);

    if field
        .and_then(|field| field.value.as_deref())
        .is_some_and(|value| new.matches(value))
    {
        return Ok(SwapOutcome::Unchanged(tag));
    }

    match (expected, field) {
        (_, None) => {
            debug!(field = %locator, "mirrored field absent, adopting");
        }
        (FieldExpectation::Absent, Some(_)) => {
            return Err(Error::Drift {
                field: locator.to_string(),
                reason: "field is set but the secret has no current version".to_string(),
            });
        }
        (FieldExpectation::Mirrors(_), Some(CustomField { value: None, .. })) => {
            return Err(Error::Drift {
                field: locator.to_string(),
                reason: "field has no value".to_string(),
            });
        }
        (FieldExpectation::Mirrors(current), Some(CustomField { value: Some(value), .. })) => {
            if !current.matches(value) {
                return Err(Error::Drift {
                    field: locator.to_string(),
                    reason: "recorded value does not match the current secret".to_string(),
                });
            }
        }
    }

    record
        .section_mut(&locator.section_id)
        .ok_or_else(|| locator.missing_section())?
        .set_field(&locator.field_name, new.expose().to_string());

    let tag = target.write_config(&locator.target_id, record, &tag).await?;
    Ok(SwapOutcome::Written(tag))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredTarget {
    record: TargetRecord,
    version: u64,
}

impl StoredTarget {
    fn tag(&self) -> VersionTag {
        VersionTag(format!("E{}", self.version))
    }
}

/// Record bookkeeping shared by the bundled target implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct TargetTable {
    targets: BTreeMap<String, StoredTarget>,
}

impl TargetTable {
    fn read(&self, target_id: &str) -> Result<(TargetRecord, VersionTag)> {
        let stored = self.targets.get(target_id).ok_or_else(|| Error::NotFound {
            what: format!("configuration target {target_id}"),
        })?;
        Ok((stored.record.clone(), stored.tag()))
    }

    fn write(
        &mut self,
        target_id: &str,
        record: TargetRecord,
        expected: &VersionTag,
    ) -> Result<VersionTag> {
        let stored = self
            .targets
            .get_mut(target_id)
            .ok_or_else(|| Error::NotFound {
                what: format!("configuration target {target_id}"),
            })?;
        if stored.tag() != *expected {
            return Err(Error::Conflict {
                target: target_id.to_string(),
                expected: expected.to_string(),
            });
        }
        stored.record = record;
        stored.version += 1;
        Ok(stored.tag())
    }

    fn insert(&mut self, target_id: &str, record: TargetRecord) {
        let stored = self.targets.entry(target_id.to_string()).or_default();
        stored.record = record;
        stored.version += 1;
    }

    fn upsert_field(&mut self, locator: &FieldLocator, value: &str) {
        let stored = self.targets.entry(locator.target_id.clone()).or_default();
        if stored.record.section(&locator.section_id).is_none() {
            stored
                .record
                .sections
                .push(Section::new(locator.section_id.clone()));
        }
        if let Some(section) = stored.record.section_mut(&locator.section_id) {
            section.set_field(&locator.field_name, value.to_string());
        }
        stored.version += 1;
    }
}

/// An in-process configuration target.
#[derive(Debug, Default)]
pub struct MemoryConfigTarget {
    table: RwLock<TargetTable>,
}

impl MemoryConfigTarget {
    /// Creates a target with no records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces a record, bumping its version tag.
    pub fn insert(&self, target_id: &str, record: TargetRecord) {
        self.table
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(target_id, record);
    }

    /// Sets the addressed field outside of any compare-and-swap, the way an
    /// operator editing the distribution by hand would.
    pub fn upsert_field(&self, locator: &FieldLocator, value: &str) {
        self.table
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .upsert_field(locator, value);
    }

    /// Returns a copy of the record, if present.
    #[must_use]
    pub fn record(&self, target_id: &str) -> Option<TargetRecord> {
        self.table
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .read(target_id)
            .ok()
            .map(|(record, _)| record)
    }
}

impl ConfigTarget for MemoryConfigTarget {
    async fn read_config(&self, target_id: &str) -> Result<(TargetRecord, VersionTag)> {
        self.table
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .read(target_id)
    }

    async fn write_config(
        &self,
        target_id: &str,
        record: TargetRecord,
        expected: &VersionTag,
    ) -> Result<VersionTag> {
        self.table
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .write(target_id, record, expected)
    }
}

/// A configuration target persisted as a JSON document.
#[derive(Debug)]
pub struct FileConfigTarget {
    file: JsonFile,
    lock: Mutex<()>,
}

impl FileConfigTarget {
    /// File name used inside a state directory.
    pub const FILE_NAME: &'static str = "targets.json";

    /// Opens the targets kept in `state_dir`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            file: JsonFile::new(state_dir.join(Self::FILE_NAME), "configuration target"),
            lock: Mutex::new(()),
        }
    }

    /// Sets the addressed field outside of any compare-and-swap, creating
    /// the target and section as needed.
    pub async fn upsert_field(&self, locator: &FieldLocator, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut table: TargetTable = self.file.load().await?;
        table.upsert_field(locator, value);
        self.file.save(&table).await
    }
}

impl ConfigTarget for FileConfigTarget {
    async fn read_config(&self, target_id: &str) -> Result<(TargetRecord, VersionTag)> {
        let _guard = self.lock.lock().await;
        let table: TargetTable = self.file.load().await?;
        table.read(target_id)
    }

    async fn write_config(
        &self,
        target_id: &str,
        record: TargetRecord,
        expected: &VersionTag,
    ) -> Result<VersionTag> {
        let _guard = self.lock.lock().await;
        let mut table: TargetTable = self.file.load().await?;
        let tag = table.write(target_id, record, expected)?;
        self.file.save(&table).await?;
        debug!(target_id, tag = %tag, "configuration target snapshot written");
        Ok(tag)
    }
}
