//! Suite and scenario lifecycle
//!
//! [`Suite`] owns everything that lives for one run: the execution mode, the
//! random source, the executor and the resolver caches. Each scenario runs
//! between a per-test setup (location reset) and an unconditional cleanup that
//! deletes the VM the scenario created, even when the scenario failed or
//! panicked.

use crate::command::CommandLine;
use crate::config::{ExecutionMode, HarnessConfig};
use crate::errors::{CleanupError, ProvcheckError, Result, ScenarioError};
use crate::executor::{CommandExecutor, LiveExecutor, ReplayExecutor};
use crate::fixtures::FixtureSet;
use crate::random::{generate_id, DeterministicRandom, EntropyRandom, SharedRandom};
use crate::resolver::{ResolverStats, ResourceResolver};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Ownership record of the VM a scenario provisions
///
/// `marked_for_deletion` can only be set once `created` is; cleanup deletes
/// the VM only when both hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmHandle {
    name: Option<String>,
    created: bool,
    marked_for_deletion: bool,
}

impl VmHandle {
    /// Empty handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful create command
    pub fn record_created(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
        self.created = true;
    }

    /// Take responsibility for deleting the VM; ignored unless it was created
    pub fn mark_for_deletion(&mut self) -> bool {
        if self.created {
            self.marked_for_deletion = true;
        }
        self.marked_for_deletion
    }

    /// Record creation and take ownership in one step
    pub fn adopt(&mut self, name: impl Into<String>) {
        self.record_created(name);
        self.mark_for_deletion();
    }

    /// VM name, if one was created
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }

    /// True when cleanup has to delete this VM
    pub fn is_owned(&self) -> bool {
        self.created && self.marked_for_deletion
    }

    /// Forget the VM after it was deleted
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything a scenario may use while it runs
pub struct ScenarioContext<'a> {
    pub executor: &'a dyn CommandExecutor,
    pub resolver: &'a mut ResourceResolver,
    pub config: &'a HarnessConfig,
    pub retry: RetryPolicy,
    /// Location for this test, refreshed at every test setup
    pub location: &'a str,
    /// Name used for the VM (and any network created for it)
    pub vm_name: &'a str,
    pub vm: &'a mut VmHandle,
}

/// A single end-to-end check against the CLI
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Stable identifier used for selection and reporting
    fn name(&self) -> &'static str;

    /// Run the scenario
    async fn run(&self, ctx: &mut ScenarioContext<'_>) -> Result<()>;
}

/// Outcome of a scenario body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed {
        message: String,
        /// Harness misconfiguration (e.g. missing fixture) rather than a CLI failure
        #[serde(rename = "harnessDefect")]
        harness_defect: bool,
    },
}

impl Outcome {
    fn from_error(err: &ProvcheckError) -> Self {
        Self::Failed {
            message: err.to_string(),
            harness_defect: err.is_harness_defect(),
        }
    }
}

/// Outcome of the cleanup that follows every scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CleanupOutcome {
    /// Nothing owned by the scenario
    Skipped,
    Deleted { name: String },
    Failed { message: String },
}

/// Result of one scenario including its cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub outcome: Outcome,
    pub cleanup: CleanupOutcome,
    /// CLI invocations made by the scenario and its cleanup
    pub invocations: usize,
}

impl ScenarioReport {
    /// True when both the scenario and its cleanup succeeded
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed && !matches!(self.cleanup, CleanupOutcome::Failed { .. })
    }
}

/// Result of a whole suite run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub mode: ExecutionMode,
    pub scenarios: Vec<ScenarioReport>,
    pub cache: ResolverStats,
}

impl SuiteReport {
    /// True when every scenario and cleanup succeeded
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    /// Number of scenarios that failed, counting cleanup failures
    pub fn failures(&self) -> usize {
        self.scenarios.iter().filter(|s| !s.passed()).count()
    }
}

/// One harness run: suite-level setup, scenarios, teardown
pub struct Suite {
    config: HarnessConfig,
    random: SharedRandom,
    executor: Arc<dyn CommandExecutor>,
    recorder: Option<Arc<LiveExecutor>>,
    resolver: ResourceResolver,
    location: String,
    vm_name: String,
}

impl Suite {
    /// Suite-level setup
    ///
    /// Validates the configuration, installs the deterministic random source
    /// and loads fixtures in replay mode, or prepares the live executor
    /// (optionally recording) otherwise.
    #[instrument(skip(config), fields(mode = %config.mode))]
    pub fn setup(config: HarnessConfig) -> Result<Self> {
        config.validate()?;

        let suite = match config.mode {
            ExecutionMode::Replay => {
                let random: SharedRandom = Arc::new(DeterministicRandom::new());
                let fixtures = FixtureSet::load(&config.fixtures_path)?;
                info!(
                    fixtures = fixtures.len(),
                    path = %config.fixtures_path.display(),
                    "Replaying recorded fixtures"
                );
                let executor = Arc::new(ReplayExecutor::new(fixtures, random.clone()));
                Self::assemble(config, random, executor, None)
            }
            ExecutionMode::Live => {
                let random: SharedRandom = if config.is_reproducible() {
                    Arc::new(DeterministicRandom::new())
                } else {
                    Arc::new(EntropyRandom)
                };
                let mut live = LiveExecutor::new(
                    config.cli_path.clone(),
                    config.correlation_env.clone(),
                    random.clone(),
                )
                .with_poll_interval(config.poll_interval());
                if config.record {
                    live = live.recording();
                }
                let live = Arc::new(live);
                let recorder = config.record.then(|| live.clone());
                info!(
                    cli = %config.cli_path,
                    record = config.record,
                    "Running against live backend"
                );
                Self::assemble(config, random, live, recorder)
            }
        };

        Ok(suite)
    }

    /// Build a suite around an existing executor and random source
    pub fn with_executor(
        config: HarnessConfig,
        executor: Arc<dyn CommandExecutor>,
        random: SharedRandom,
    ) -> Self {
        Self::assemble(config, random, executor, None)
    }

    fn assemble(
        config: HarnessConfig,
        random: SharedRandom,
        executor: Arc<dyn CommandExecutor>,
        recorder: Option<Arc<LiveExecutor>>,
    ) -> Self {
        let vm_name = if config.is_reproducible() {
            config.names.replay_vm_name.clone()
        } else {
            format!("{}Vnet", generate_id(random.as_ref(), &config.names.vm_prefix))
        };
        let resolver = ResourceResolver::new(executor.clone(), config.names.clone());
        let location = config.current_location();
        debug!(vm_name = %vm_name, "Suite assembled");

        Self {
            config,
            random,
            executor,
            recorder,
            resolver,
            location,
            vm_name,
        }
    }

    /// Execution mode of this run
    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    /// Name used for the VM under test
    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    /// Location used by the current test
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Random source shared with the executor
    pub fn random(&self) -> &SharedRandom {
        &self.random
    }

    /// Cache statistics of the resolver
    pub fn cache_stats(&self) -> ResolverStats {
        self.resolver.stats()
    }

    /// Per-test setup: re-read the location for this test
    pub fn setup_test(&mut self) {
        self.location = self.config.current_location();
        debug!(location = %self.location, "Test setup");
    }

    /// Run one scenario with setup and guaranteed cleanup
    #[instrument(skip(self, scenario), fields(scenario = scenario.name()))]
    pub async fn run_scenario(&mut self, scenario: &dyn Scenario) -> ScenarioReport {
        self.setup_test();
        let invocations_before = self.executor.invocation_count();
        let mut vm = VmHandle::new();

        let body = {
            let mut ctx = ScenarioContext {
                executor: self.executor.as_ref(),
                resolver: &mut self.resolver,
                config: &self.config,
                retry: self.config.retry_policy(),
                location: &self.location,
                vm_name: &self.vm_name,
                vm: &mut vm,
            };
            AssertUnwindSafe(scenario.run(&mut ctx))
                .catch_unwind()
                .await
        };

        let outcome = match body {
            Ok(Ok(())) => {
                info!("Scenario passed");
                Outcome::Passed
            }
            Ok(Err(err)) => {
                error!(error = %err, "Scenario failed");
                Outcome::from_error(&err)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%message, "Scenario panicked");
                let err: ProvcheckError = ScenarioError::Panicked { message }.into();
                Outcome::from_error(&err)
            }
        };

        let cleanup = match self.cleanup(&mut vm).await {
            Ok(Some(name)) => CleanupOutcome::Deleted { name },
            Ok(None) => CleanupOutcome::Skipped,
            Err(err) => {
                error!(error = %err, "Cleanup failed");
                CleanupOutcome::Failed {
                    message: err.to_string(),
                }
            }
        };

        ScenarioReport {
            name: scenario.name().to_string(),
            outcome,
            cleanup,
            invocations: self.executor.invocation_count() - invocations_before,
        }
    }

    /// Run scenarios in order; a failing scenario does not stop the suite
    pub async fn run_all(&mut self, scenarios: &[Box<dyn Scenario>]) -> SuiteReport {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run_scenario(scenario.as_ref()).await);
        }

        SuiteReport {
            mode: self.config.mode,
            scenarios: reports,
            cache: self.resolver.stats(),
        }
    }

    /// Delete the VM if the scenario owns it
    ///
    /// Returns the deleted name, or `None` when nothing had to be deleted. On
    /// success the handle is reset.
    pub async fn cleanup(&self, vm: &mut VmHandle) -> Result<Option<String>> {
        let name = match vm.name() {
            Some(name) if vm.is_owned() => name.to_string(),
            _ => {
                debug!(created = vm.created(), "No owned VM to delete");
                return Ok(None);
            }
        };

        let delay = self.config.cleanup_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        info!(vm = %name, "Deleting VM");
        let command =
            CommandLine::from_args(["vm", "delete", name.as_str(), "-b", "-q", "--json"]);
        let result = self.executor.execute(&command).await?;
        if !result.success() {
            warn!(vm = %name, exit_status = result.exit_status, "VM delete failed");
            return Err(CleanupError::DeleteFailed {
                name,
                exit_status: result.exit_status,
                text: result.text,
            }
            .into());
        }

        vm.reset();
        Ok(Some(name))
    }

    /// Suite-level teardown
    ///
    /// Writes the recording when one was requested and drops the suite's
    /// random source, so the next run starts from fresh entropy (live) or a
    /// fresh counter (replay).
    #[instrument(skip(self), fields(mode = %self.config.mode))]
    pub fn teardown(self) -> Result<()> {
        if let Some(recorder) = &self.recorder {
            recorder.save_recording(&self.config.fixtures_path)?;
            info!(path = %self.config.fixtures_path.display(), "Fixtures recorded");
        }
        debug!(invocations = self.executor.invocation_count(), "Suite torn down");
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
