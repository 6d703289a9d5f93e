//! Bootstrap command: installs a CURRENT version and mirrors it.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;
use verigate_rotation::{
    ConfigTarget, Error, FileConfigTarget, FileSecretStore, SecretString, VersionId,
};

use crate::cli::SeedArgs;
use crate::config;
use crate::error::CliError;
use crate::output::write_json_line;

/// Handler for the seed command.
pub struct SeedCommand<'a> {
    state_dir: &'a Path,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeedSummary {
    secret_id: String,
    version_id: String,
    mirrored_to: Option<String>,
}

impl<'a> SeedCommand<'a> {
    /// Creates a new seed command handler.
    #[must_use]
    pub const fn new(state_dir: &'a Path) -> Self {
        Self { state_dir }
    }

    /// Installs the value and prints what was written.
    ///
    /// Target settings, the existing store and the existing target file are
    /// all checked before anything is written, so a rejected seed leaves
    /// both untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or the state cannot be
    /// written.
    pub async fn execute<W: Write>(&self, out: &mut W, args: &SeedArgs) -> Result<(), CliError> {
        let secret_id = config::secret_id(&args.secret_id)?;
        let locator = config::optional_locator(&args.target)?;
        if args.value.is_empty() {
            return Err(CliError::InvalidArgument(
                "seed value cannot be empty".to_string(),
            ));
        }
        if args.version_id.trim().is_empty() {
            return Err(CliError::InvalidArgument(
                "version id cannot be empty".to_string(),
            ));
        }
        let version_id = VersionId::new(args.version_id.clone());

        let value = SecretString::new(args.value.clone());
        let store = FileSecretStore::new(self.state_dir);
        let target = FileConfigTarget::new(self.state_dir);

        store.check_current(&secret_id, &version_id, &value).await?;
        if let Some(locator) = &locator {
            match target.read_config(&locator.target_id).await {
                Ok(_) | Err(Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        store
            .insert_current(&secret_id, version_id.clone(), value)
            .await?;
        info!(%secret_id, %version_id, "seeded current version");

        if let Some(locator) = &locator {
            target.upsert_field(locator, &args.value).await?;
            info!(%secret_id, field = %locator, "mirrored seeded value");
        }

        write_json_line(
            out,
            &SeedSummary {
                secret_id: secret_id.to_string(),
                version_id: version_id.to_string(),
                mirrored_to: locator.map(|l| l.to_string()),
            },
        )
    }
}
