//! Command lines and command results for the CLI under test

use crate::errors::{ExecError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single CLI invocation
///
/// An exit status of 0 means success; anything else is a failure that the
/// caller interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Process exit status
    pub exit_status: i32,
    /// Captured stdout
    pub text: String,
}

impl CommandResult {
    /// Create a new result
    pub fn new(exit_status: i32, text: impl Into<String>) -> Self {
        Self {
            exit_status,
            text: text.into(),
        }
    }

    /// Successful result with the given output
    pub fn ok(text: impl Into<String>) -> Self {
        Self::new(0, text)
    }

    /// Failed result (exit status 1) with the given output
    pub fn failed(text: impl Into<String>) -> Self {
        Self::new(1, text)
    }

    /// Check if the command succeeded
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Tokenized command line passed to the CLI under test
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Split a command line string into tokens using shell quoting rules
    pub fn parse(line: &str) -> Result<Self> {
        let tokens = shell_words::split(line).map_err(|e| ExecError::MalformedCommand {
            template: line.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self(tokens))
    }

    /// Build a command line from already separated tokens
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// Tokens of this command line
    pub fn args(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_words::join(&self.0))
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(args: Vec<String>) -> Self {
        Self(args)
    }
}
