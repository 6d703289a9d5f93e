//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`rotate`] - Run one rotation step
//! - [`dispatch`] - Run a rotation event from stdin
//! - [`authorize`] - Check request headers against the current secret
//! - [`seed`] - Install the initial secret
//! - [`show`] - Inspect a secret and its mirrored field

pub mod authorize;
pub mod dispatch;
pub mod rotate;
pub mod seed;
pub mod show;

pub use authorize::AuthorizeCommand;
pub use dispatch::DispatchCommand;
pub use rotate::RotateCommand;
pub use seed::SeedCommand;
pub use show::ShowCommand;
