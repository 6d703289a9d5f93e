//! Output formatting for CLI commands.
//!
//! Machine-facing commands print one compact JSON document per line.
//! `show` also supports a human-readable table.

use std::io::Write;

use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Placeholder printed instead of a secret value.
pub const REDACTED: &str = "********";

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a value in the selected format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }
}

/// Write `value` as a single JSON line.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), CliError> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
    writeln!(writer)?;
    Ok(())
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// One stored version of a secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    /// Version id.
    pub version_id: String,
    /// Labels on the version.
    pub labels: Vec<String>,
    /// The value, or [`REDACTED`].
    pub value: String,
}

/// How the mirrored field relates to the secret store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldState {
    /// The field does not exist.
    Absent,
    /// The field exists without a value.
    Empty,
    /// The field holds the CURRENT value.
    MirrorsCurrent,
    /// The field holds the PENDING value.
    MirrorsPending,
    /// The field holds something else.
    Drifted,
}

impl FieldState {
    /// Short description for tables.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Empty => "empty",
            Self::MirrorsCurrent => "mirrors CURRENT",
            Self::MirrorsPending => "mirrors PENDING",
            Self::Drifted => "drifted",
        }
    }
}

/// The mirrored field of a secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStatus {
    /// `target/section/field`.
    pub locator: String,
    /// Relation to the store.
    pub state: FieldState,
    /// The value, redacted unless revealed; `None` when absent.
    pub value: Option<String>,
}

/// Everything `show` reports about a secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretStatus {
    /// Secret id.
    pub secret_id: String,
    /// Versions ordered by id.
    pub versions: Vec<VersionEntry>,
    /// The mirrored field, if a target was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldStatus>,
}

impl TableDisplay for SecretStatus {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Secret: {}", self.secret_id)?;
        writeln!(writer, "══════════════════════════════════")?;

        if self.versions.is_empty() {
            writeln!(writer, "No versions")?;
        } else {
            writeln!(writer, "{:<40}  {:<18}  VALUE", "VERSION", "LABELS")?;
            writeln!(writer, "{}", "─".repeat(72))?;
            for version in &self.versions {
                writeln!(
                    writer,
                    "{:<40}  {:<18}  {}",
                    truncate(&version.version_id, 40),
                    version.labels.join(","),
                    version.value
                )?;
            }
        }

        if let Some(field) = &self.field {
            writeln!(writer)?;
            writeln!(writer, "Mirrored field")?;
            writeln!(writer, "  Locator:        {}", field.locator)?;
            writeln!(writer, "  State:          {}", field.state.as_str())?;
            if let Some(value) = &field.value {
                writeln!(writer, "  Value:          {value}")?;
            }
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
