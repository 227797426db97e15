use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands::list::execute_list;
use crate::commands::run::{execute_run, RunArgs};
use provcheck_core::config::ExecutionMode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured format
    Json,
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

/// Execution mode selection
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ModeOption {
    /// Invoke the real CLI against the backend
    Live,
    /// Answer commands from recorded fixtures
    Replay,
}

impl From<ModeOption> for ExecutionMode {
    fn from(mode: ModeOption) -> Self {
        match mode {
            ModeOption::Live => ExecutionMode::Live,
            ModeOption::Replay => ExecutionMode::Replay,
        }
    }
}

/// Provisioning check subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the VM provisioning scenarios
    Run {
        /// Execution mode (defaults to replay; PROVCHECK_LIVE selects live)
        #[arg(long, value_enum)]
        mode: Option<ModeOption>,

        /// Path to the cloud CLI executable
        #[arg(long, value_name = "PATH")]
        cli: Option<String>,

        /// Fixture file read in replay mode and written when recording
        #[arg(long, value_name = "PATH")]
        fixtures: Option<PathBuf>,

        /// Location for created prerequisites (overrides PROVCHECK_VM_TEST_LOCATION)
        #[arg(long)]
        location: Option<String>,

        /// Record live invocations into the fixture file
        #[arg(long)]
        record: bool,

        /// Scenario to run (can be repeated; all scenarios when omitted)
        #[arg(long = "scenario", value_name = "NAME", action = clap::ArgAction::Append)]
        scenarios: Vec<String>,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// List available scenarios
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "VM provisioning check harness",
    long_about = "VM provisioning check harness\n\nRuns VM provisioning scenarios against a cloud CLI, live or from recorded fixtures.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via PROVCHECK_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Harness configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Initialize logging and execute the selected subcommand
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None, // Let logging module check environment variable
        };

        let log_level = match self.log_level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        // Set environment variable for log level before initializing logging
        if std::env::var_os("PROVCHECK_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("provcheck={},provcheck_core={}", log_level, log_level),
            );
        }
        provcheck_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        match self.command {
            Some(Commands::Run {
                mode,
                cli,
                fixtures,
                location,
                record,
                scenarios,
                output,
            }) => {
                let args = RunArgs {
                    config_path: self.config,
                    mode: mode.map(Into::into),
                    cli_path: cli,
                    fixtures,
                    location,
                    record,
                    scenarios,
                    output,
                };
                execute_run(args).await
            }
            Some(Commands::List { output }) => execute_list(output),
            None => {
                println!("VM provisioning check harness");
                println!("Run 'provcheck --help' for usage information");
                Ok(())
            }
        }
    }
}
