//! CLI command handlers for StickShift.
//!
//! Headless, scriptable access to the profile compiler for automation,
//! testing, and CI integration.

pub mod common;
pub mod compile;
pub mod inspect;
pub mod names;
pub mod validate;

// Re-export types used by main.rs and tests
pub use common::{CliError, CliResult, ExitCode};
pub use compile::CompileArgs;
pub use inspect::InspectArgs;
pub use names::NamesArgs;
pub use validate::ValidateArgs;
