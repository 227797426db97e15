//! Core library for the provisioning check harness
//!
//! This crate contains the command execution layer (live CLI and fixture
//! replay), memoized resource resolution, retry and VM cleanup lifecycle,
//! configuration, logging, and error handling shared by the `provcheck` binary.

pub mod cache;
pub mod command;
pub mod config;
pub mod descriptors;
pub mod errors;
pub mod executor;
pub mod fixtures;
pub mod lifecycle;
pub mod logging;
pub mod random;
pub mod resolver;
pub mod retry;
pub mod scenarios;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
