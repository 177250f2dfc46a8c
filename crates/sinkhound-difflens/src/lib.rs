//! Unified diff interpretation and file filtering.
//!
//! Turns per-file unified diff text into the lines a commit introduced and
//! restricts them to an extension allow-list before rule matching.

pub mod filter;
pub mod parser;
