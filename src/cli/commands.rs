//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Converge - declarative infrastructure provisioning.
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the bundle file.
    #[arg(short, long, global = true, env = "CONVERGE_FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose diagnostics.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write the audit log as HTML to this file instead of text to
    /// stdout.
    #[arg(long, global = true)]
    pub html: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update the cluster to match the bundle.
    Up {
        /// Report intended changes without mutating target state.
        #[arg(short, long)]
        simulate: bool,

        /// Resume from persisted state if a previous run was terminated
        /// abnormally.
        #[arg(long)]
        resume: bool,

        /// Discard persisted state and do not resume.
        #[arg(long)]
        no_resume: bool,
    },

    /// Destroy the resources declared in the bundle.
    Destroy {
        /// Report intended changes without mutating target state.
        #[arg(short, long)]
        simulate: bool,
    },

    /// Watch change sources and re-apply as external events occur.
    Run {
        /// Report intended changes without mutating target state.
        #[arg(short, long)]
        simulate: bool,

        /// Resume from persisted state before watching.
        #[arg(long)]
        resume: bool,

        /// Discard persisted state before watching.
        #[arg(long)]
        no_resume: bool,
    },

    /// Validate the bundle as far as possible without deploying it.
    Test,

    /// Print the resolved bundle YAML.
    Expand,

    /// Show persisted cluster state.
    Status,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
