//! Recorded CLI interactions used by replay runs
//!
//! A fixture file is a JSON document holding every invocation of a recorded
//! live run in order. Replay consumes entries as they match, so a command that
//! was issued several times (a retried `vm create`, for instance) replays its
//! recorded results in the same order.

use crate::command::{CommandLine, CommandResult};
use crate::errors::FixtureError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

/// A single recorded invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Exact argument list passed to the CLI
    pub args: CommandLine,
    /// Correlation token the invocation carried, if it matters for matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Recorded exit status
    pub exit_status: i32,
    /// Recorded stdout
    #[serde(default)]
    pub text: String,
}

impl Fixture {
    /// Create a fixture entry
    pub fn new(args: CommandLine, correlation_id: Option<String>, result: &CommandResult) -> Self {
        Self {
            args,
            correlation_id,
            exit_status: result.exit_status,
            text: result.text.clone(),
        }
    }

    fn matches(&self, args: &CommandLine, correlation_id: &str) -> bool {
        &self.args == args
            && self
                .correlation_id
                .as_deref()
                .map_or(true, |recorded| recorded == correlation_id)
    }

    fn result(&self) -> CommandResult {
        CommandResult::new(self.exit_status, self.text.clone())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: Vec<Fixture>,
}

/// Ordered set of fixtures with per-entry consumption tracking
#[derive(Debug, Default)]
pub struct FixtureSet {
    recorded_at: Option<DateTime<Utc>>,
    entries: Vec<Fixture>,
    consumed: Vec<bool>,
}

impl FixtureSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from entries
    pub fn from_entries(entries: Vec<Fixture>) -> Self {
        let consumed = vec![false; entries.len()];
        Self {
            recorded_at: None,
            entries,
            consumed,
        }
    }

    /// Load a fixture file
    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        if !path.exists() {
            return Err(FixtureError::NotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let file: FixtureFile = serde_json::from_str(&content)?;
        debug!(entries = file.entries.len(), "Loaded fixture file");

        let mut set = Self::from_entries(file.entries);
        set.recorded_at = file.recorded_at;
        Ok(set)
    }

    /// Write all entries to a fixture file, stamping the recording time
    #[instrument(level = "debug", skip(self))]
    pub fn save(&self, path: &Path) -> Result<(), FixtureError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = FixtureFile {
            recorded_at: Some(Utc::now()),
            entries: self.entries.clone(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        debug!(entries = self.entries.len(), "Saved fixture file");
        Ok(())
    }

    /// Append a recorded invocation
    pub fn push(&mut self, fixture: Fixture) {
        self.entries.push(fixture);
        self.consumed.push(false);
    }

    /// Consume the first unused entry matching the invocation
    pub fn take(&mut self, args: &CommandLine, correlation_id: &str) -> Option<CommandResult> {
        let index = self
            .entries
            .iter()
            .zip(&self.consumed)
            .position(|(entry, used)| !used && entry.matches(args, correlation_id))?;
        self.consumed[index] = true;
        Some(self.entries[index].result())
    }

    /// Time the set was recorded, if known
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries not yet replayed
    pub fn remaining(&self) -> usize {
        self.consumed.iter().filter(|used| !**used).count()
    }
}
