//! Run command implementation
//!
//! Implements `provcheck run`: resolves the harness configuration, performs
//! suite setup, runs the selected scenarios with cleanup after each one,
//! prints the report and tears the suite down.

use anyhow::Result;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use provcheck_core::config::{ExecutionMode, HarnessConfig};
use provcheck_core::lifecycle::{CleanupOutcome, Outcome, Suite, SuiteReport};
use provcheck_core::scenarios;

use crate::cli::OutputFormat;

/// Run command arguments
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config_path: Option<PathBuf>,
    pub mode: Option<ExecutionMode>,
    pub cli_path: Option<String>,
    pub fixtures: Option<PathBuf>,
    pub location: Option<String>,
    pub record: bool,
    pub scenarios: Vec<String>,
    pub output: OutputFormat,
}

/// Returned when at least one scenario or cleanup failed
#[derive(Debug, thiserror::Error)]
#[error("{failures} of {total} scenario(s) failed")]
pub struct SuiteFailed {
    pub failures: usize,
    pub total: usize,
}

impl RunArgs {
    /// Configuration file and environment, overridden by command-line flags
    fn resolve_config(&self) -> Result<HarnessConfig> {
        let mut config = HarnessConfig::resolve(self.config_path.as_deref())?;
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(cli_path) = &self.cli_path {
            config.cli_path = cli_path.clone();
        }
        if let Some(fixtures) = &self.fixtures {
            config.fixtures_path = fixtures.clone();
        }
        if let Some(location) = &self.location {
            config.location = Some(location.clone());
        }
        if self.record {
            config.record = true;
        }
        Ok(config)
    }
}

/// Execute the run command
pub async fn execute_run(args: RunArgs) -> Result<()> {
    let config = args.resolve_config()?;
    debug!("Resolved harness configuration: {:?}", config);

    let selected = scenarios::select(&args.scenarios)?;
    let mut suite = Suite::setup(config)?;
    info!(
        mode = %suite.mode(),
        vm = suite.vm_name(),
        scenarios = selected.len(),
        "Starting suite"
    );

    let report = suite.run_all(&selected).await;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(&report)),
    }
    suite.teardown()?;

    if report.passed() {
        Ok(())
    } else {
        let failed = SuiteFailed {
            failures: report.failures(),
            total: report.scenarios.len(),
        };
        warn!("{}", failed);
        Err(failed.into())
    }
}

/// Human-readable report, one line per scenario plus details for failures
fn render_text(report: &SuiteReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Mode: {}", report.mode);

    for scenario in &report.scenarios {
        let status = if scenario.passed() { "PASS" } else { "FAIL" };
        let _ = writeln!(
            out,
            "{} {} ({} invocations)",
            status, scenario.name, scenario.invocations
        );

        if let Outcome::Failed {
            message,
            harness_defect,
        } = &scenario.outcome
        {
            let kind = if *harness_defect { "harness" } else { "error" };
            let _ = writeln!(out, "  {}: {}", kind, message);
        }
        match &scenario.cleanup {
            CleanupOutcome::Skipped => {}
            CleanupOutcome::Deleted { name } => {
                let _ = writeln!(out, "  cleanup: deleted {}", name);
            }
            CleanupOutcome::Failed { message } => {
                let _ = writeln!(out, "  cleanup failed: {}", message);
            }
        }
    }

    let _ = writeln!(
        out,
        "Cache: images {}/{} hits, networks {}/{} hits, affinity groups {}/{} hits",
        report.cache.images.hits,
        report.cache.images.hits + report.cache.images.misses,
        report.cache.networks.hits,
        report.cache.networks.hits + report.cache.networks.misses,
        report.cache.affinity_groups.hits,
        report.cache.affinity_groups.hits + report.cache.affinity_groups.misses,
    );
    out
}
