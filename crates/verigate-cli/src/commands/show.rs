//! Secret inspection command implementation.

use std::io::Write;
use std::path::Path;

use verigate_rotation::{
    FieldLocator, FileConfigTarget, FileSecretStore, Label, SecretStore, SecretString, read_field,
};

use crate::cli::ShowArgs;
use crate::config;
use crate::error::CliError;
use crate::output::{FieldState, FieldStatus, OutputFormat, REDACTED, SecretStatus, VersionEntry};

/// Handler for the show command.
pub struct ShowCommand<'a> {
    state_dir: &'a Path,
}

impl<'a> ShowCommand<'a> {
    /// Creates a new show command handler.
    #[must_use]
    pub const fn new(state_dir: &'a Path) -> Self {
        Self { state_dir }
    }

    /// Prints the versions of the secret and, if a target is given, the
    /// state of the mirrored field.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret or the target cannot be read.
    pub async fn execute<W: Write>(&self, out: &mut W, args: &ShowArgs) -> Result<(), CliError> {
        let secret_id = config::secret_id(&args.secret_id)?;
        let locator = config::optional_locator(&args.target)?;
        let store = FileSecretStore::new(self.state_dir);

        let labels = store.describe_labels(&secret_id).await?;
        let current = optional(store.get_by_label(&secret_id, Label::Current).await)?;
        let pending = optional(store.get_by_label(&secret_id, Label::Pending).await)?;

        let reveal = |value: &SecretString| {
            if args.reveal {
                value.expose().to_string()
            } else {
                REDACTED.to_string()
            }
        };

        let versions = labels
            .iter()
            .map(|(version_id, labels)| {
                let value = [&current, &pending]
                    .into_iter()
                    .flatten()
                    .find(|v| v.version_id == *version_id)
                    .map_or_else(|| REDACTED.to_string(), |v| reveal(&v.value));
                VersionEntry {
                    version_id: version_id.to_string(),
                    labels: labels.iter().map(|l| l.as_str().to_string()).collect(),
                    value,
                }
            })
            .collect();

        let field = match &locator {
            Some(locator) => Some(
                field_status(
                    locator,
                    current.as_ref().map(|v| &v.value),
                    pending.as_ref().map(|v| &v.value),
                    self.state_dir,
                    &reveal,
                )
                .await?,
            ),
            None => None,
        };

        let status = SecretStatus {
            secret_id: secret_id.to_string(),
            versions,
            field,
        };
        OutputFormat::new(args.format).write(out, &status)
    }
}

/// Maps a missing label to `None`.
fn optional<T>(result: verigate_rotation::Result<T>) -> Result<Option<T>, CliError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(verigate_rotation::Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn field_status(
    locator: &FieldLocator,
    current: Option<&SecretString>,
    pending: Option<&SecretString>,
    state_dir: &Path,
    reveal: &dyn Fn(&SecretString) -> String,
) -> Result<FieldStatus, CliError> {
    let target = FileConfigTarget::new(state_dir);
    let (state, value) = match read_field(&target, locator).await? {
        None => (FieldState::Absent, None),
        Some(None) => (FieldState::Empty, None),
        Some(Some(value)) => {
            let state = if current.is_some_and(|c| c.matches(&value)) {
                FieldState::MirrorsCurrent
            } else if pending.is_some_and(|p| p.matches(&value)) {
                FieldState::MirrorsPending
            } else {
                FieldState::Drifted
            };
            (state, Some(reveal(&SecretString::new(value))))
        }
    };

    Ok(FieldStatus {
        locator: locator.to_string(),
        state,
        value,
    })
}
