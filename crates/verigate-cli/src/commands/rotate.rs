//! Rotation step command implementation.

use std::io::Write;
use std::path::Path;

use tracing::debug;
use verigate_rotation::{
    FileConfigTarget, FileSecretStore, RandomPasswordGenerator, RotationEvent, Rotator,
};

use crate::cli::{PolicyArgs, RotateArgs, TargetArgs};
use crate::config;
use crate::error::CliError;
use crate::output::write_json_line;

/// Handler for the rotate command.
pub struct RotateCommand<'a> {
    state_dir: &'a Path,
}

impl<'a> RotateCommand<'a> {
    /// Creates a new rotate command handler.
    #[must_use]
    pub const fn new(state_dir: &'a Path) -> Self {
        Self { state_dir }
    }

    /// Runs the step and prints its report.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the step fails.
    pub async fn execute<W: Write>(&self, out: &mut W, args: &RotateArgs) -> Result<(), CliError> {
        let event = RotationEvent {
            secret_id: args.secret_id.clone(),
            client_request_token: args.token.clone(),
            step: args.step.clone(),
        };
        run_event(self.state_dir, &args.target, &args.policy, &event, out).await
    }
}

/// Runs `event` against the file-backed state in `state_dir` and prints the
/// step report. A failed step is returned as [`CliError::StepFailed`] after
/// the report is written.
pub(crate) async fn run_event<W: Write>(
    state_dir: &Path,
    target: &TargetArgs,
    policy: &PolicyArgs,
    event: &RotationEvent,
    out: &mut W,
) -> Result<(), CliError> {
    let locator = config::locator(target)?;
    let policy = config::policy(policy)?;
    debug!(state_dir = %state_dir.display(), field = %locator, "opening file-backed state");

    let rotator = Rotator::with_target(
        FileSecretStore::new(state_dir),
        FileConfigTarget::new(state_dir),
        locator,
        RandomPasswordGenerator::new(),
        policy,
    )?;

    let report = rotator.handle_report(event).await;
    write_json_line(out, &report)?;

    match report.error {
        None => Ok(()),
        Some(reason) => Err(CliError::StepFailed {
            step: event.step.clone(),
            reason,
        }),
    }
}
