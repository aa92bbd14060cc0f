//! CLI Adapter
//!
//! Command-line interface for the envelope bot.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{CliApp, Command, OutputFormat, ResetTrackerCmd, RunCmd, StatusCmd};

/// Initialize the CLI application
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}
