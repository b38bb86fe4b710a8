//! Command-line interface.
//!
//! The CLI is a thin consumer of the core: it parses the verb and flags,
//! builds the run context, and maps outcomes to exit codes.

mod commands;
mod output;

pub use commands::{Cli, Commands};
pub use output::StatusFormatter;
