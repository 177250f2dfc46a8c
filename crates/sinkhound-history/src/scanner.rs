//! The commit scan: added lines → extension filter → sink rules → findings.

use std::iter::FusedIterator;

use serde::Serialize;
use sinkhound_core::{AddedLine, CommitFindings, RuleSet, ScanMatch, SinkhoundError};
use sinkhound_difflens::filter::ExtensionFilter;
use sinkhound_difflens::parser::extract_added_lines;

use crate::mining::CommitHandle;

/// Options for a history scan.
///
/// # Examples
///
/// ```
/// use sinkhound_history::scanner::ScanOptions;
///
/// let opts = ScanOptions::default();
/// assert!(opts.include_ext.is_empty());
/// assert!(opts.max_commits.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Path suffixes to scan; empty scans every file.
    pub include_ext: Vec<String>,
    /// Visit at most this many commits. `None` and `Some(0)` mean no limit.
    pub max_commits: Option<usize>,
}

/// Counters collected while a scan runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Commits pulled from the source.
    pub commits_visited: usize,
    /// Root commits, which are never scanned.
    pub root_commits: usize,
    /// Commits that produced at least one match.
    pub commits_with_findings: usize,
    /// Total matches across all commits.
    pub matches: usize,
    /// Highest risk seen so far.
    pub max_risk: u32,
}

/// Lines a commit added relative to its first parent.
///
/// Root commits have no baseline and contribute nothing. Merge commits are
/// compared with their first parent only.
///
/// # Errors
///
/// Propagates failures of [`CommitHandle::diff_with_parent`].
pub fn added_lines<C: CommitHandle>(commit: &C) -> Result<Vec<AddedLine>, SinkhoundError> {
    if commit.parent_ids().is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::new();
    for file in commit.diff_with_parent(0)? {
        for mut line in extract_added_lines(&file.patch) {
            line.file_path = file.path.clone();
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Match added lines against every rule, keeping line and rule order.
///
/// Lines rejected by `filter` are skipped. A line matching several rules
/// yields one [`ScanMatch`] per rule.
///
/// # Examples
///
/// ```
/// use sinkhound_core::{AddedLine, RuleSet, SinkRule};
/// use sinkhound_difflens::filter::ExtensionFilter;
/// use sinkhound_history::scanner::match_lines;
///
/// let rules = RuleSet::new(vec![SinkRule::new(r"eval\(", "Usage of eval function", 9).unwrap()]).unwrap();
/// let lines = vec![AddedLine {
///     file_path: Some("a.py".into()),
///     line_number: 1,
///     content: "eval('danger')".into(),
/// }];
/// let matches = match_lines(lines, &rules, &ExtensionFilter::default());
/// assert_eq!(matches.len(), 1);
/// assert_eq!(matches[0].risk, 9);
/// ```
pub fn match_lines<I>(lines: I, rules: &RuleSet, filter: &ExtensionFilter) -> Vec<ScanMatch>
where
    I: IntoIterator<Item = AddedLine>,
{
    let mut matches = Vec::new();
    for line in lines {
        if !filter.admits(&line) {
            continue;
        }
        for rule in rules.matching(&line.content) {
            matches.push(ScanMatch {
                path: line.file_path.clone(),
                line_number: line.line_number,
                line: line.content.clone(),
                description: rule.description.clone(),
                risk: rule.risk,
            });
        }
    }
    matches
}

/// Scan a single commit.
///
/// # Errors
///
/// Propagates failures of [`CommitHandle::diff_with_parent`].
pub fn scan_commit<C: CommitHandle>(
    commit: &C,
    rules: &RuleSet,
    filter: &ExtensionFilter,
) -> Result<Vec<ScanMatch>, SinkhoundError> {
    Ok(match_lines(added_lines(commit)?, rules, filter))
}

/// Scan a commit sequence lazily.
///
/// `commits` must yield oldest first. Each call to [`Iterator::next`] pulls
/// commits until one has matches, so findings come out in traversal order
/// and nothing is read ahead. A source error is yielded once and ends the
/// scan.
///
/// # Examples
///
/// ```no_run
/// use git2::Repository;
/// use sinkhound_core::RuleSet;
/// use sinkhound_history::mining::GitHistory;
/// use sinkhound_history::scanner::{scan, ScanOptions};
///
/// let repo = Repository::open(".").unwrap();
/// let rules = RuleSet::builtin().unwrap();
/// let history = GitHistory::new(&repo, None).unwrap();
/// for findings in scan(&rules, history, &ScanOptions::default()) {
///     let findings = findings.unwrap();
///     println!("{}: {} matches", findings.short_id(), findings.matches.len());
/// }
/// ```
pub fn scan<'r, I, C>(rules: &'r RuleSet, commits: I, options: &ScanOptions) -> Scan<'r, I::IntoIter>
where
    I: IntoIterator<Item = Result<C, SinkhoundError>>,
    C: CommitHandle,
{
    Scan {
        rules,
        commits: commits.into_iter(),
        filter: ExtensionFilter::new(options.include_ext.iter().cloned()),
        remaining: options.max_commits.filter(|&n| n > 0),
        done: false,
        stats: ScanStats::default(),
    }
}

/// Lazy iterator over [`CommitFindings`], created by [`scan`].
pub struct Scan<'r, I> {
    rules: &'r RuleSet,
    commits: I,
    filter: ExtensionFilter,
    remaining: Option<usize>,
    done: bool,
    stats: ScanStats,
}

impl<I> Scan<'_, I> {
    /// Counters for the commits consumed so far.
    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

impl<I, C> Iterator for Scan<'_, I>
where
    I: Iterator<Item = Result<C, SinkhoundError>>,
    C: CommitHandle,
{
    type Item = Result<CommitFindings, SinkhoundError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.remaining == Some(0) {
                self.done = true;
                break;
            }

            let commit = match self.commits.next() {
                Some(Ok(commit)) => commit,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            };

            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            self.stats.commits_visited += 1;

            if commit.parent_ids().is_empty() {
                self.stats.root_commits += 1;
                tracing::debug!(commit = commit.id(), "skipping root commit");
                continue;
            }

            let matches = match scan_commit(&commit, self.rules, &self.filter) {
                Ok(matches) => matches,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            tracing::debug!(commit = commit.id(), matches = matches.len(), "scanned commit");

            if matches.is_empty() {
                continue;
            }

            self.stats.commits_with_findings += 1;
            self.stats.matches += matches.len();
            let findings = CommitFindings {
                commit_id: commit.id().to_string(),
                commit_summary: commit.summary().to_string(),
                matches,
            };
            self.stats.max_risk = self.stats.max_risk.max(findings.max_risk());
            return Some(Ok(findings));
        }
        None
    }
}

impl<I, C> FusedIterator for Scan<'_, I>
where
    I: Iterator<Item = Result<C, SinkhoundError>>,
    C: CommitHandle,
{
}
