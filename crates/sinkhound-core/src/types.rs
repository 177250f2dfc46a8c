use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single line introduced by a commit, scoped to the file it belongs to.
///
/// Removed and context lines never become an `AddedLine`.
///
/// # Examples
///
/// ```
/// use sinkhound_core::AddedLine;
///
/// let line = AddedLine {
///     file_path: Some("index.php".into()),
///     line_number: 12,
///     content: "eval($_GET['q']);".into(),
/// };
/// assert_eq!(line.file_path.as_deref(), Some("index.php"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedLine {
    /// Destination path, `None` when the diff entry has no destination.
    pub file_path: Option<String>,
    /// 1-based line number in the new version of the file.
    pub line_number: u32,
    /// Line text with the `+` marker stripped and whitespace trimmed.
    pub content: String,
}

/// One rule matching one added line.
///
/// # Examples
///
/// ```
/// use sinkhound_core::ScanMatch;
///
/// let m = ScanMatch {
///     path: Some("a.py".into()),
///     line_number: 1,
///     line: "eval('danger')".into(),
///     description: "Usage of eval function".into(),
///     risk: 9,
/// };
/// assert_eq!(m.risk, 9);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMatch {
    /// Path of the file the line was added to.
    pub path: Option<String>,
    /// 1-based line number in the new version of the file.
    pub line_number: u32,
    /// The trimmed line content.
    pub line: String,
    /// Description of the matching sink.
    pub description: String,
    /// Risk declared by the matching sink.
    pub risk: u32,
}

impl ScanMatch {
    /// Path for display, `-` when the match has no path.
    pub fn display_path(&self) -> &str {
        self.path.as_deref().unwrap_or("-")
    }
}

/// All matches found in a single commit, in diff order.
///
/// Only produced for commits with at least one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFindings {
    /// Full hex digest of the commit.
    pub commit_id: String,
    /// First line of the commit message.
    pub commit_summary: String,
    /// Matches in file order, then line order, then rule order.
    pub matches: Vec<ScanMatch>,
}

impl CommitFindings {
    /// The abbreviated (7 character) commit id.
    ///
    /// # Examples
    ///
    /// ```
    /// use sinkhound_core::CommitFindings;
    ///
    /// let findings = CommitFindings {
    ///     commit_id: "0123456789abcdef".into(),
    ///     commit_summary: "add eval".into(),
    ///     matches: vec![],
    /// };
    /// assert_eq!(findings.short_id(), "0123456");
    /// ```
    pub fn short_id(&self) -> &str {
        let end = self
            .commit_id
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.commit_id.len());
        &self.commit_id[..end]
    }

    /// Highest risk among this commit's matches, 0 when empty.
    pub fn max_risk(&self) -> u32 {
        self.matches.iter().map(|m| m.risk).max().unwrap_or(0)
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use sinkhound_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable commit listing.
    #[default]
    Text,
    /// One JSON object per commit per line, camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
    /// SARIF v2.1.0 for code scanning uploads.
    Sarif,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Sarif => write!(f, "sarif"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" | "jsonl" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "sarif" => Ok(OutputFormat::Sarif),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
