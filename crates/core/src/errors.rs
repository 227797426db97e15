//! Error types and handling
//!
//! The error taxonomy is structured with one enum per harness concern
//! (configuration, command execution, fixtures, resolution, scenarios, cleanup)
//! that are then wrapped in the main `ProvcheckError` enum for unified handling.
//!
//! A nonzero exit status from the CLI under test is *not* an error at the
//! execution layer: it is returned as a [`CommandResult`](crate::command::CommandResult)
//! and interpreted by the caller. Only harness defects (spawn failures, missing
//! replay fixtures) surface as `ExecError`.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Errors raised while invoking the CLI under test
#[derive(Error, Debug)]
pub enum ExecError {
    /// The CLI binary could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI produced output that is not valid UTF-8
    #[error("Invalid UTF-8 in output of '{command}'")]
    InvalidOutput { command: String },

    /// Replay mode has no recorded fixture for this invocation
    #[error("No recorded fixture matches '{command}' (correlation id {correlation_id})")]
    FixtureMismatch {
        command: String,
        correlation_id: String,
    },

    /// A command template could not be split into arguments
    #[error("Malformed command line '{template}': {message}")]
    MalformedCommand { template: String, message: String },
}

/// Fixture store errors
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Fixture file not found
    #[error("Fixture file not found: {path}")]
    NotFound { path: String },

    /// Fixture file I/O error
    #[error("Failed to access fixture file")]
    Io(#[from] std::io::Error),

    /// Fixture JSON error
    #[error("Invalid fixture JSON")]
    Json(#[from] serde_json::Error),
}

/// Failures while resolving prerequisite resources
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A list command returned a nonzero exit status
    #[error("'{command}' failed with exit status {exit_status}: {text}")]
    ListFailed {
        command: String,
        exit_status: i32,
        text: String,
    },

    /// A create command returned a nonzero exit status
    #[error("'{command}' failed with exit status {exit_status}: {text}")]
    CreateFailed {
        command: String,
        exit_status: i32,
        text: String,
    },

    /// List output could not be parsed as a descriptor array
    #[error("Failed to parse output of '{command}': {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// No public image exists for the requested category
    #[error("No public image found for category '{category}'")]
    NoMatchingImage { category: String },
}

/// Scenario-level failures
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// The retried provisioning call never succeeded
    #[error("'{command}' failed after {attempts} attempt(s) with exit status {exit_status}: {text}")]
    Provisioning {
        command: String,
        attempts: u32,
        exit_status: i32,
        text: String,
    },

    /// A command returned an exit status the scenario did not expect
    #[error("'{command}' exited with {actual}, expected {expected}: {text}")]
    UnexpectedExitStatus {
        command: String,
        expected: i32,
        actual: i32,
        text: String,
    },

    /// The scenario panicked
    #[error("Scenario panicked: {message}")]
    Panicked { message: String },

    /// Unknown scenario name
    #[error("Unknown scenario: {name}")]
    Unknown { name: String },
}

/// Cleanup failures
#[derive(Error, Debug)]
pub enum CleanupError {
    /// Deleting an owned VM returned a nonzero exit status
    #[error("Failed to delete VM '{name}' (exit status {exit_status}): {text}")]
    DeleteFailed {
        name: String,
        exit_status: i32,
        text: String,
    },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum ProvcheckError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Command execution errors
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Fixture store errors
    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),

    /// Resource resolution errors
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Scenario errors
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// Cleanup errors
    #[error("Cleanup error: {0}")]
    Cleanup(#[from] CleanupError),
}

impl ProvcheckError {
    /// True when the failure is a harness defect rather than a CLI failure
    pub fn is_harness_defect(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Fixture(_)
                | Self::Exec(ExecError::FixtureMismatch { .. })
                | Self::Exec(ExecError::MalformedCommand { .. })
        )
    }
}

/// Convenience type alias for Results with ProvcheckError
pub type Result<T> = std::result::Result<T, ProvcheckError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Validation {
            message: "retry_attempts must be at least 1".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration validation error: retry_attempts must be at least 1"
        );

        let error = ConfigError::NotFound {
            path: "/path/to/provcheck.toml".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration file not found: /path/to/provcheck.toml"
        );
    }

    #[test]
    fn test_fixture_mismatch_display() {
        let error = ExecError::FixtureMismatch {
            command: "vm image list --json".to_string(),
            correlation_id: "3".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "No recorded fixture matches 'vm image list --json' (correlation id 3)"
        );
    }

    #[test]
    fn test_resolve_error_display() {
        let error = ResolveError::ListFailed {
            command: "network vnet list --json".to_string(),
            exit_status: 1,
            text: "unauthorized".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "'network vnet list --json' failed with exit status 1: unauthorized"
        );
    }

    #[test]
    fn test_harness_defect_classification() {
        let mismatch: ProvcheckError = ExecError::FixtureMismatch {
            command: "vm create".to_string(),
            correlation_id: "1".to_string(),
        }
        .into();
        assert!(mismatch.is_harness_defect());

        let cli_failure: ProvcheckError = ResolveError::CreateFailed {
            command: "network vnet create".to_string(),
            exit_status: 1,
            text: String::new(),
        }
        .into();
        assert!(!cli_failure.is_harness_defect());

        let cleanup: ProvcheckError = CleanupError::DeleteFailed {
            name: "vm1".to_string(),
            exit_status: 1,
            text: String::new(),
        }
        .into();
        assert!(!cleanup.is_harness_defect());
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = ProvcheckError::Exec(ExecError::Spawn {
            program: "azure".to_string(),
            source: io_error,
        });

        assert!(error.source().is_some());
        if let Some(source) = error.source() {
            assert!(source.source().is_some());
        }
    }

    #[test]
    fn test_anyhow_conversions() {
        let error = ProvcheckError::Cleanup(CleanupError::DeleteFailed {
            name: "xplattestvmVnet".to_string(),
            exit_status: 1,
            text: "busy".to_string(),
        });
        let anyhow_error = anyhow::Error::from(error);
        assert!(anyhow_error.to_string().contains("Cleanup error"));
    }
}
