//! Turns parsed arguments into validated library configuration.
//!
//! Everything here runs before the first store or target call, so a
//! misconfigured invocation fails without side effects.

use verigate_rotation::{FieldLocator, PasswordPolicy, SecretId};

use crate::cli::{PolicyArgs, TargetArgs};
use crate::error::CliError;

/// Builds the mirrored-field locator, requiring every part.
///
/// # Errors
///
/// Returns [`CliError::Config`] naming the first missing setting.
pub fn locator(args: &TargetArgs) -> Result<FieldLocator, CliError> {
    let target_id = required(args.target_id.as_deref(), "target id", "VERIGATE_TARGET_ID")?;
    let origin_id = required(args.origin_id.as_deref(), "origin id", "VERIGATE_ORIGIN_ID")?;
    let header_name = required(
        args.header_name.as_deref(),
        "header name",
        "VERIGATE_HEADER_NAME",
    )?;
    Ok(FieldLocator::new(target_id, origin_id, header_name))
}

/// Builds the locator if any part is set.
///
/// # Errors
///
/// Returns [`CliError::Config`] if only some of the parts are set.
pub fn optional_locator(args: &TargetArgs) -> Result<Option<FieldLocator>, CliError> {
    if args.target_id.is_none() && args.origin_id.is_none() && args.header_name.is_none() {
        return Ok(None);
    }
    locator(args).map(Some)
}

fn required<'a>(value: Option<&'a str>, what: &str, env: &str) -> Result<&'a str, CliError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CliError::Config(format!(
            "{what} is required (--{} or {env})",
            what.replace(' ', "-")
        ))),
    }
}

/// Builds and validates the password policy.
///
/// # Errors
///
/// Returns [`CliError::Config`] if the policy cannot produce a value.
pub fn policy(args: &PolicyArgs) -> Result<PasswordPolicy, CliError> {
    let mut policy = PasswordPolicy::new();
    if let Some(length) = args.password_length {
        policy = policy.with_length(length);
    }
    if let Some(chars) = &args.exclude_characters {
        policy = policy.with_exclude_characters(chars.clone());
    }
    if args.exclude_lowercase {
        policy = policy.without_lowercase();
    }
    if args.exclude_uppercase {
        policy = policy.without_uppercase();
    }
    if args.exclude_numbers {
        policy = policy.without_numbers();
    }
    if args.exclude_punctuation {
        policy = policy.without_punctuation();
    }
    if args.include_space {
        policy = policy.with_space();
    }
    if let Some(require) = args.require_each_included_type {
        policy = policy.require_each_included_type(require);
    }

    policy
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(policy)
}

/// Parses a secret id argument.
///
/// # Errors
///
/// Returns [`CliError::InvalidArgument`] if the id is malformed.
pub fn secret_id(raw: &str) -> Result<SecretId, CliError> {
    SecretId::new(raw).map_err(|e| CliError::InvalidArgument(e.to_string()))
}
