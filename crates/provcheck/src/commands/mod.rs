//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod list;
pub mod run;
