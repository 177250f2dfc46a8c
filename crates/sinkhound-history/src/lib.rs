//! Historical sink scanning over git history.
//!
//! Walks a branch oldest-first with git2, diffs every commit against its
//! first parent, and matches the added lines against a [`RuleSet`]. Findings
//! are produced lazily, one commit at a time, so they can be streamed to a
//! reporter while the walk is still running.
//!
//! [`RuleSet`]: sinkhound_core::RuleSet

pub mod mining;
pub mod repo;
pub mod report;
pub mod scanner;
