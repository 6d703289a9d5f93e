//! Verification gate command implementation.

use std::io::Write;
use std::path::Path;

use verigate_authorizer::{AuthorizationRequest, GateConfig, VerificationGate};
use verigate_rotation::FileSecretStore;

use crate::cli::AuthorizeArgs;
use crate::config;
use crate::error::CliError;
use crate::output::write_json_line;

/// Handler for the authorize command.
pub struct AuthorizeCommand<'a> {
    state_dir: &'a Path,
}

impl<'a> AuthorizeCommand<'a> {
    /// Creates a new authorize command handler.
    #[must_use]
    pub const fn new(state_dir: &'a Path) -> Self {
        Self { state_dir }
    }

    /// Prints the gate's decision for the given headers.
    ///
    /// A deny is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are malformed.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        args: &AuthorizeArgs,
    ) -> Result<(), CliError> {
        let secret_id = config::secret_id(&args.secret_id)?;
        let gate_config = GateConfig::new(secret_id, args.header_name.as_str())?;
        let request = parse_headers(&args.headers)?;

        let gate = VerificationGate::new(FileSecretStore::new(self.state_dir), gate_config);
        let decision = gate.authorize(&request).await;
        write_json_line(out, &decision)
    }
}

/// Parses `Name: value` pairs into a request.
fn parse_headers(headers: &[String]) -> Result<AuthorizationRequest, CliError> {
    headers.iter().try_fold(AuthorizationRequest::new(), |request, raw| {
        let (name, value) = raw.split_once(':').ok_or_else(|| {
            CliError::InvalidArgument(format!("header {raw:?} is not of the form `Name: value`"))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "header {raw:?} has an empty name"
            )));
        }
        Ok(request.with_header(name, value.trim_start()))
    })
}
