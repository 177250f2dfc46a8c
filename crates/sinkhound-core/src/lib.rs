//! Core types, configuration, rules, and error handling for SinkHound.
//!
//! This crate provides the shared foundation used by the other SinkHound crates:
//! - [`SinkhoundError`]: unified error type using `thiserror`
//! - [`SinkhoundConfig`]: configuration loaded from `.sinkhound.toml`
//! - [`RuleSet`] / [`SinkRule`]: sink definitions and per-line matching
//! - Shared types: [`AddedLine`], [`ScanMatch`], [`CommitFindings`], [`OutputFormat`]

mod config;
mod error;
mod rules;
mod types;

pub use config::{commit_limit, OutputConfig, ScanConfig, SinkhoundConfig};
pub use error::SinkhoundError;
pub use rules::{RuleSet, SinkRule, BUILTIN_SINKS};
pub use types::{AddedLine, CommitFindings, OutputFormat, ScanMatch};

/// A convenience `Result` type for SinkHound operations.
pub type Result<T> = std::result::Result<T, SinkhoundError>;
