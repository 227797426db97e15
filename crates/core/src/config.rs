//! Harness configuration
//!
//! Settings are layered with the precedence: CLI flag > environment variable >
//! configuration file (TOML) > built-in default. The binary applies CLI flags
//! on top of [`HarnessConfig::resolve`].

use crate::errors::{ConfigError, Result};
use crate::retry::{RetryPolicy, DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Any value selects live execution instead of replay
pub const LIVE_ENV: &str = "PROVCHECK_LIVE";
/// Enables fixture recording in live mode
pub const RECORD_ENV: &str = "PROVCHECK_RECORD";
/// Region used for affinity-group resolution
pub const LOCATION_ENV: &str = "PROVCHECK_VM_TEST_LOCATION";
/// CLI binary override
pub const CLI_ENV: &str = "PROVCHECK_CLI";
/// Fixture file override
pub const FIXTURES_ENV: &str = "PROVCHECK_FIXTURES";

/// Default region when none is configured
pub const DEFAULT_LOCATION: &str = "West US";
/// Default CLI binary
pub const DEFAULT_CLI: &str = "azure";
/// Default fixture file
pub const DEFAULT_FIXTURES: &str = "fixtures/cli.vm.create_affin_vnet_vm.json";
/// Default environment variable carrying the correlation token to the CLI
pub const DEFAULT_CORRELATION_ENV: &str = "PROVCHECK_CORRELATION_ID";

/// Whether the CLI talks to a real backend or to recorded fixtures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Real backend
    Live,
    /// Recorded fixtures, no network
    #[default]
    Replay,
}

impl ExecutionMode {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replay => "replay",
        }
    }

    /// Check if this is replay mode
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replay)
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "replay" => Ok(Self::Replay),
            _ => Err(ConfigError::Validation {
                message: format!("Unknown execution mode: {}. Supported modes: live, replay", s),
            }),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Environment variable the suite depends on, with its fallback value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredEnv {
    pub name: &'static str,
    pub default: &'static str,
}

impl RequiredEnv {
    /// Current value, or the default when unset or empty
    pub fn value(&self) -> String {
        std::env::var(self.name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.default.to_string())
    }
}

/// Environment the VM suite requires
pub const REQUIRED_ENVIRONMENT: &[RequiredEnv] = &[RequiredEnv {
    name: LOCATION_ENV,
    default: DEFAULT_LOCATION,
}];

/// Complete harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HarnessConfig {
    pub mode: ExecutionMode,
    pub cli_path: String,
    pub fixtures_path: PathBuf,
    /// Record fixtures while running live
    pub record: bool,
    /// Explicit location; when unset it is read from the environment at each test setup
    pub location: Option<String>,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub cleanup_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub correlation_env: String,
    /// Resource names used when prerequisites have to be created
    pub names: ResourceNames,
}

/// Names and credentials used by the VM suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ResourceNames {
    pub affinity_group: String,
    pub affinity_label: String,
    pub affinity_description: String,
    pub availability_set: String,
    pub vm_prefix: String,
    pub replay_vm_name: String,
    pub user_name: String,
    pub password: String,
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self {
            affinity_group: "xplataffintest".to_string(),
            affinity_label: "xplatAffinGrp".to_string(),
            affinity_description: "Test Affinty Group for xplat".to_string(),
            availability_set: "Testset".to_string(),
            vm_prefix: "clitestvm".to_string(),
            replay_vm_name: "xplattestvmVnet".to_string(),
            user_name: "azureuser".to_string(),
            password: "Pa$$word@123".to_string(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            cli_path: DEFAULT_CLI.to_string(),
            fixtures_path: PathBuf::from(DEFAULT_FIXTURES),
            record: false,
            location: None,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_DELAY.as_millis() as u64,
            cleanup_delay_ms: 5000,
            poll_interval_ms: 1000,
            correlation_env: DEFAULT_CORRELATION_ENV.to_string(),
            names: ResourceNames::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded harness configuration");
        Ok(config)
    }

    /// Build the configuration from an optional file and the environment
    ///
    /// Validation is left to suite setup so that CLI flags can still be applied.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay environment variables
    pub fn apply_env(&mut self) {
        if std::env::var_os(LIVE_ENV).is_some() {
            self.mode = ExecutionMode::Live;
        }
        if std::env::var_os(RECORD_ENV).is_some() {
            self.record = true;
        }
        if let Ok(cli) = std::env::var(CLI_ENV) {
            if !cli.is_empty() {
                self.cli_path = cli;
            }
        }
        if let Ok(fixtures) = std::env::var(FIXTURES_ENV) {
            if !fixtures.is_empty() {
                self.fixtures_path = PathBuf::from(fixtures);
            }
        }
    }

    /// Reject settings the harness cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "retry_attempts must be at least 1".to_string(),
            }
            .into());
        }
        if self.cli_path.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "cli_path must not be empty".to_string(),
            }
            .into());
        }
        if self.record && self.mode.is_replay() {
            return Err(ConfigError::Validation {
                message: "recording requires live mode".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// True when the run must be replayable from fixtures: replay itself, or
    /// a live run that records. Such runs use the deterministic random source
    /// and the fixed VM name.
    pub fn is_reproducible(&self) -> bool {
        self.mode.is_replay() || self.record
    }

    /// Location for this test: explicit setting, else environment, else default
    pub fn current_location(&self) -> String {
        match &self.location {
            Some(location) if !location.trim().is_empty() => location.clone(),
            _ => REQUIRED_ENVIRONMENT[0].value(),
        }
    }

    /// Retry policy for VM creation, without delay in replay mode
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
        );
        if self.mode.is_replay() {
            policy.without_delay()
        } else {
            policy
        }
    }

    /// Pause before deleting a VM, zero in replay mode
    pub fn cleanup_delay(&self) -> Duration {
        self.timing(self.cleanup_delay_ms)
    }

    /// Poll interval handed to the CLI, zero in replay mode
    pub fn poll_interval(&self) -> Duration {
        self.timing(self.poll_interval_ms)
    }

    fn timing(&self, ms: u64) -> Duration {
        if self.mode.is_replay() {
            Duration::ZERO
        } else {
            Duration::from_millis(ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for var in [LIVE_ENV, RECORD_ENV, LOCATION_ENV, CLI_ENV, FIXTURES_ENV] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("live".parse::<ExecutionMode>().unwrap(), ExecutionMode::Live);
        assert_eq!("REPLAY".parse::<ExecutionMode>().unwrap(), ExecutionMode::Replay);
        assert!("mocked".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Live.to_string(), "live");
    }

    #[test]
    #[serial]
    fn test_defaults_to_replay() {
        clear_env();
        let config = HarnessConfig::resolve(None).unwrap();
        assert_eq!(config.mode, ExecutionMode::Replay);
        assert_eq!(config.cli_path, "azure");
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().delay, Duration::ZERO);
        assert_eq!(config.cleanup_delay(), Duration::ZERO);
        assert_eq!(config.poll_interval(), Duration::ZERO);
    }

    #[test]
    #[serial]
    fn test_live_env_keeps_delays() {
        clear_env();
        std::env::set_var(LIVE_ENV, "1");
        let config = HarnessConfig::resolve(None).unwrap();
        clear_env();

        assert_eq!(config.mode, ExecutionMode::Live);
        assert_eq!(config.retry_policy().delay, Duration::from_secs(5));
        assert_eq!(config.cleanup_delay(), Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_location_from_env_or_default() {
        clear_env();
        let config = HarnessConfig::default();
        assert_eq!(config.current_location(), "West US");

        std::env::set_var(LOCATION_ENV, "North Europe");
        assert_eq!(config.current_location(), "North Europe");

        let pinned = HarnessConfig {
            location: Some("East Asia".to_string()),
            ..HarnessConfig::default()
        };
        assert_eq!(pinned.current_location(), "East Asia");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_toml_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provcheck.toml");
        std::fs::write(
            &path,
            r#"
mode = "live"
cli_path = "/opt/cli/bin/azure"
retry_attempts = 3

[names]
affinity_group = "customag"
"#,
        )
        .unwrap();

        let config = HarnessConfig::resolve(Some(&path)).unwrap();
        assert_eq!(config.mode, ExecutionMode::Live);
        assert_eq!(config.cli_path, "/opt/cli/bin/azure");
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.names.affinity_group, "customag");
        assert_eq!(config.names.user_name, "azureuser");
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provcheck.toml");
        std::fs::write(&path, "cli_path = \"from-file\"\n").unwrap();

        std::env::set_var(CLI_ENV, "from-env");
        let config = HarnessConfig::resolve(Some(&path)).unwrap();
        clear_env();

        assert_eq!(config.cli_path, "from-env");
    }

    #[test]
    fn test_validation() {
        let zero_retries = HarnessConfig {
            retry_attempts: 0,
            ..HarnessConfig::default()
        };
        assert!(zero_retries.validate().is_err());

        let record_replay = HarnessConfig {
            record: true,
            ..HarnessConfig::default()
        };
        assert!(record_replay.validate().is_err());
    }

    #[test]
    fn test_missing_and_invalid_file() {
        let dir = TempDir::new().unwrap();
        assert!(HarnessConfig::load(&dir.path().join("absent.toml")).is_err());

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "retry_attempts = \"many\"").unwrap();
        let err = HarnessConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse configuration file"));
    }
}
