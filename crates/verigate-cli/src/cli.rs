//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Verigate - rotate the origin verification secret and check requests
/// against it.
#[derive(Parser, Debug, Clone)]
#[command(name = "verigate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `secrets.json` and `targets.json`.
    #[arg(long, env = "VERIGATE_STATE_DIR", default_value = ".verigate", global = true)]
    pub state_dir: PathBuf,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one rotation step.
    Rotate(RotateArgs),

    /// Run the rotation event read from stdin.
    Dispatch(DispatchArgs),

    /// Decide whether a request carries the current secret.
    Authorize(AuthorizeArgs),

    /// Install the initial CURRENT version, optionally mirroring it.
    Seed(SeedArgs),

    /// Show the versions of a secret and the mirrored field.
    Show(ShowArgs),
}

/// The configuration field that mirrors the secret.
///
/// All three settings are optional at parse time so that a missing one is
/// reported as a configuration error rather than a usage error.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Configuration target (distribution) id.
    #[arg(long, env = "VERIGATE_TARGET_ID")]
    pub target_id: Option<String>,

    /// Section (origin) id inside the target.
    #[arg(long, env = "VERIGATE_ORIGIN_ID")]
    pub origin_id: Option<String>,

    /// Field (header) name inside the section.
    #[arg(long, env = "VERIGATE_HEADER_NAME")]
    pub header_name: Option<String>,
}

/// Password policy toggles for generated values.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// Number of characters to generate.
    #[arg(long, env = "SECRET_PASSWORD_LENGTH")]
    pub password_length: Option<usize>,

    /// Characters that must never be generated.
    #[arg(long, env = "SECRET_EXCLUDE_CHARACTERS")]
    pub exclude_characters: Option<String>,

    /// Leave out lowercase letters.
    #[arg(long, env = "SECRET_EXCLUDE_LOWERCASE")]
    pub exclude_lowercase: bool,

    /// Leave out uppercase letters.
    #[arg(long, env = "SECRET_EXCLUDE_UPPERCASE")]
    pub exclude_uppercase: bool,

    /// Leave out digits.
    #[arg(long, env = "SECRET_EXCLUDE_NUMBERS")]
    pub exclude_numbers: bool,

    /// Leave out punctuation.
    #[arg(long, env = "SECRET_EXCLUDE_PUNCTUATION")]
    pub exclude_punctuation: bool,

    /// Allow the space character.
    #[arg(long, env = "SECRET_INCLUDE_SPACE")]
    pub include_space: bool,

    /// Require one character of every included class (default true).
    #[arg(long, env = "SECRET_REQUIRE_EACH_INCLUDED_TYPE", value_name = "BOOL")]
    pub require_each_included_type: Option<bool>,
}

/// Arguments for the rotate command.
#[derive(Args, Debug, Clone)]
pub struct RotateArgs {
    /// Secret to rotate.
    #[arg(long, env = "VERIGATE_SECRET_ID")]
    pub secret_id: String,

    /// Token identifying the rotation attempt.
    #[arg(long)]
    pub token: String,

    /// Step to run: createSecret, setSecret, testSecret or finishSecret.
    #[arg(long)]
    pub step: String,

    /// Mirrored field.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Generation policy.
    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Arguments for the dispatch command.
#[derive(Args, Debug, Clone)]
pub struct DispatchArgs {
    /// Mirrored field.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Generation policy.
    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Arguments for the authorize command.
#[derive(Args, Debug, Clone)]
pub struct AuthorizeArgs {
    /// Secret whose CURRENT value requests must carry.
    #[arg(long, env = "VERIGATE_SECRET_ID")]
    pub secret_id: String,

    /// Header carrying the secret.
    #[arg(long, env = "VERIGATE_HEADER_NAME")]
    pub header_name: String,

    /// Request header as `Name: value` (repeatable).
    #[arg(long = "header", short = 'H', value_name = "NAME: VALUE")]
    pub headers: Vec<String>,
}

/// Arguments for the seed command.
#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    /// Secret to seed.
    #[arg(long, env = "VERIGATE_SECRET_ID")]
    pub secret_id: String,

    /// Initial secret value.
    #[arg(long)]
    pub value: String,

    /// Version id for the seeded value.
    #[arg(long, default_value = "initial")]
    pub version_id: String,

    /// Mirrored field; leave unset to seed the store only.
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for the show command.
#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Secret to inspect.
    #[arg(long, env = "VERIGATE_SECRET_ID")]
    pub secret_id: String,

    /// Print secret values instead of redacting them.
    #[arg(long)]
    pub reveal: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Mirrored field; leave unset to skip the target.
    #[command(flatten)]
    pub target: TargetArgs,
}
