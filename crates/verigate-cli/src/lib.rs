//! # verigate-cli
//!
//! Verigate command-line interface.
//!
//! Provides commands for:
//! - Running rotation steps one at a time or from a trigger event
//! - Checking request headers against the current secret
//! - Seeding and inspecting file-backed state
//!
//! # Architecture
//!
//! Every command opens the JSON state files in `--state-dir` through the
//! file adapters of `verigate-rotation`, so consecutive invocations see
//! each other's writes:
//!
//! ```text
//! ┌──────────────┐   rotate / dispatch   ┌───────────────────────────┐
//! │ verigate CLI │──────────────────────►│ secrets.json targets.json │
//! └──────────────┘   authorize / show    └───────────────────────────┘
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, LogFormat};
pub use error::CliError;
pub use output::OutputFormat;
