//! Rotation event dispatch.
//!
//! Reads a rotation event document such as
//! `{"SecretId": "s1", "ClientRequestToken": "t1", "Step": "createSecret"}`
//! and runs it like `rotate` would.

use std::io::{Read, Write};
use std::path::Path;

use verigate_rotation::RotationEvent;

use super::rotate::run_event;
use crate::cli::DispatchArgs;
use crate::error::CliError;

/// Handler for the dispatch command.
pub struct DispatchCommand<'a> {
    state_dir: &'a Path,
}

impl<'a> DispatchCommand<'a> {
    /// Creates a new dispatch command handler.
    #[must_use]
    pub const fn new(state_dir: &'a Path) -> Self {
        Self { state_dir }
    }

    /// Reads one event from `input` and runs it.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be read or parsed, the
    /// configuration is invalid, or the step fails.
    pub async fn execute<R: Read, W: Write>(
        &self,
        input: R,
        out: &mut W,
        args: &DispatchArgs,
    ) -> Result<(), CliError> {
        let event: RotationEvent = serde_json::from_reader(input)
            .map_err(|e| CliError::InvalidArgument(format!("invalid rotation event: {e}")))?;
        run_event(self.state_dir, &args.target, &args.policy, &event, out).await
    }
}
