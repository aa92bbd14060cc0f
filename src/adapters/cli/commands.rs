//! CLI Command Definitions
//!
//! Every command works on one config file, i.e. one symbol and one tracker.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Envelope Bot - mean-reversion envelope brackets for KuCoin perpetual futures
#[derive(Parser, Debug)]
#[command(
    name = "envelope-bot",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mean-reversion envelope bracket executor for perpetual futures",
    long_about = "Runs one reconcile / decide / act / persist cycle per invocation. \
                  Schedule `run` once per candle (cron or a systemd timer)."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one trading cycle
    Run(RunCmd),

    /// Show the persisted tracker state
    Status(StatusCmd),

    /// Reset the tracker to its first-run state (re-enables trading)
    ResetTracker(ResetTrackerCmd),
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
            Command::ResetTracker(cmd) => &cmd.config,
        }
    }
}

/// Run one cycle
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/envelope.toml")]
    pub config: PathBuf,
}

/// Output format for `status`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Show tracker state
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/envelope.toml")]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Reset tracker
#[derive(Parser, Debug)]
pub struct ResetTrackerCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/envelope.toml")]
    pub config: PathBuf,

    /// Confirm the reset; trading resumes on the next run regardless of price
    #[arg(long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let app = CliApp::try_parse_from(["envelope-bot", "run"]).unwrap();
        assert!(!app.verbose);
        assert_eq!(app.command.config_path(), Path::new("config/envelope.toml"));
    }

    #[test]
    fn test_parse_status_json() {
        let app = CliApp::try_parse_from(["envelope-bot", "--debug", "status", "-c", "btc.toml", "-f", "json"]).unwrap();
        assert!(app.debug);
        match app.command {
            Command::Status(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("btc.toml"));
                assert_eq!(cmd.format, OutputFormat::Json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_reset_tracker() {
        let app = CliApp::try_parse_from(["envelope-bot", "reset-tracker", "--yes", "-v"]).unwrap();
        assert!(app.verbose);
        assert!(matches!(app.command, Command::ResetTracker(ResetTrackerCmd { yes: true, .. })));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(CliApp::try_parse_from(["envelope-bot", "swap"]).is_err());
    }
}
