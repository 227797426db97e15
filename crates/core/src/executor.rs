//! Command execution against the CLI under test
//!
//! Two executors implement [`CommandExecutor`]: [`LiveExecutor`] spawns the real
//! CLI process, [`ReplayExecutor`] answers from a recorded [`FixtureSet`]
//! without any process or network activity. Both tag every invocation with a
//! correlation token drawn from the injected [`RandomSource`](crate::random::RandomSource).

use crate::command::{CommandLine, CommandResult};
use crate::errors::{ExecError, Result};
use crate::fixtures::{Fixture, FixtureSet};
use crate::random::SharedRandom;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Environment variable carrying the poll interval to the child CLI
pub const POLL_INTERVAL_ENV: &str = "PROVCHECK_POLL_INTERVAL_MS";

/// Invokes the CLI under test
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command line and capture its result
    ///
    /// A nonzero exit status is returned as a normal [`CommandResult`]; only
    /// harness defects are errors.
    async fn execute(&self, command: &CommandLine) -> Result<CommandResult>;

    /// Number of invocations performed so far
    fn invocation_count(&self) -> usize;

    /// Parse a command line string and execute it
    async fn execute_line(&self, line: &str) -> Result<CommandResult> {
        let command = CommandLine::parse(line)?;
        self.execute(&command).await
    }
}

/// Executor that spawns the real CLI binary
#[derive(Debug)]
pub struct LiveExecutor {
    cli_path: String,
    correlation_env: String,
    poll_interval: Duration,
    random: SharedRandom,
    recording: Option<Mutex<FixtureSet>>,
    invocations: AtomicUsize,
}

impl LiveExecutor {
    /// Create a live executor for the given CLI binary
    pub fn new(
        cli_path: impl Into<String>,
        correlation_env: impl Into<String>,
        random: SharedRandom,
    ) -> Self {
        Self {
            cli_path: cli_path.into(),
            correlation_env: correlation_env.into(),
            poll_interval: Duration::ZERO,
            random,
            recording: None,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Set the poll interval exported to the child process
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Record every invocation so it can be saved as a fixture file
    pub fn recording(mut self) -> Self {
        self.recording = Some(Mutex::new(FixtureSet::new()));
        self
    }

    /// Write recorded invocations to disk; no-op when not recording
    pub fn save_recording(&self, path: &Path) -> Result<()> {
        if let Some(recording) = &self.recording {
            let recording = recording.lock().unwrap_or_else(|e| e.into_inner());
            recording.save(path)?;
            debug!(entries = recording.len(), path = %path.display(), "Recording saved");
        }
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for LiveExecutor {
    #[instrument(level = "debug", skip(self), fields(command = %command))]
    async fn execute(&self, command: &CommandLine) -> Result<CommandResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let correlation_id = self.random.next_token();

        let output = tokio::process::Command::new(&self.cli_path)
            .args(command.args())
            .env(&self.correlation_env, &correlation_id)
            .env(POLL_INTERVAL_ENV, self.poll_interval.as_millis().to_string())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: self.cli_path.clone(),
                source,
            })?;

        let exit_status = output.status.code().unwrap_or(-1);
        let text = String::from_utf8(output.stdout).map_err(|_| ExecError::InvalidOutput {
            command: command.to_string(),
        })?;

        if exit_status != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(exit_status, stderr = %stderr.trim(), "CLI returned failure");
        }

        let result = CommandResult::new(exit_status, text);
        if let Some(recording) = &self.recording {
            let mut recording = recording.lock().unwrap_or_else(|e| e.into_inner());
            recording.push(Fixture::new(command.clone(), Some(correlation_id), &result));
        }

        Ok(result)
    }

    fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

/// Executor answering from recorded fixtures
#[derive(Debug)]
pub struct ReplayExecutor {
    fixtures: Mutex<FixtureSet>,
    random: SharedRandom,
    invocations: AtomicUsize,
}

impl ReplayExecutor {
    /// Create a replay executor over a fixture set
    pub fn new(fixtures: FixtureSet, random: SharedRandom) -> Self {
        Self {
            fixtures: Mutex::new(fixtures),
            random,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Number of fixtures not yet replayed
    pub fn remaining_fixtures(&self) -> usize {
        self.fixtures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remaining()
    }
}

#[async_trait]
impl CommandExecutor for ReplayExecutor {
    #[instrument(level = "debug", skip(self), fields(command = %command))]
    async fn execute(&self, command: &CommandLine) -> Result<CommandResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let correlation_id = self.random.next_token();

        let replayed = self
            .fixtures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take(command, &correlation_id);

        match replayed {
            Some(result) => {
                debug!(exit_status = result.exit_status, %correlation_id, "Replayed fixture");
                Ok(result)
            }
            None => {
                warn!(%correlation_id, "No fixture recorded for invocation");
                Err(ExecError::FixtureMismatch {
                    command: command.to_string(),
                    correlation_id,
                }
                .into())
            }
        }
    }

    fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

pub mod mock {
    //! Scripted executor for unit and integration tests
    //!
    //! Responses are queued per command line. When only one response is left
    //! for a command it is reused for every further call, so a single scripted
    //! failure models a command that always fails.

    use super::CommandExecutor;
    use crate::command::{CommandLine, CommandResult};
    use crate::errors::Result;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tracing::debug;

    /// Executor returning scripted results and recording every call
    #[derive(Debug)]
    pub struct ScriptedExecutor {
        responses: Mutex<HashMap<String, VecDeque<CommandResult>>>,
        default_response: CommandResult,
        history: Mutex<Vec<CommandLine>>,
    }

    impl ScriptedExecutor {
        /// Create an executor whose unscripted commands succeed with empty output
        pub fn new() -> Self {
            Self::with_default(CommandResult::ok(""))
        }

        /// Create an executor with a custom result for unscripted commands
        pub fn with_default(default_response: CommandResult) -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                default_response,
                history: Mutex::new(Vec::new()),
            }
        }

        /// Queue a result for a command line
        pub fn respond(&self, line: &str, result: CommandResult) -> &Self {
            let key = normalize(line);
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(key)
                .or_default()
                .push_back(result);
            self
        }

        /// All command lines executed so far
        pub fn calls(&self) -> Vec<CommandLine> {
            self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// Number of executed commands starting with the given tokens
        pub fn count_calls(&self, prefix: &str) -> usize {
            let prefix = match CommandLine::parse(prefix) {
                Ok(prefix) => prefix,
                Err(_) => return 0,
            };
            self.history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .filter(|call| call.args().starts_with(prefix.args()))
                .count()
        }
    }

    impl Default for ScriptedExecutor {
        fn default() -> Self {
            Self::new()
        }
    }

    fn normalize(line: &str) -> String {
        CommandLine::parse(line)
            .map(|c| c.to_string())
            .unwrap_or_else(|_| line.to_string())
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(&self, command: &CommandLine) -> Result<CommandResult> {
            self.history.lock().unwrap_or_else(|e| e.into_inner()).push(command.clone());

            let key = command.to_string();
            let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
            let result = match responses.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
            .unwrap_or_else(|| self.default_response.clone());

            debug!(command = %key, exit_status = result.exit_status, "ScriptedExecutor call");
            Ok(result)
        }

        fn invocation_count(&self) -> usize {
            self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
        }
    }
}
