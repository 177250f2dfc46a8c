//! Rendering of scan findings for terminals, documents, and code scanning.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use sinkhound_core::{CommitFindings, ScanMatch, SinkhoundError};

use crate::scanner::ScanStats;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";

/// Render one commit's findings as plain text.
///
/// # Examples
///
/// ```
/// use sinkhound_core::{CommitFindings, ScanMatch};
/// use sinkhound_history::report::render_text;
///
/// let findings = CommitFindings {
///     commit_id: "0123456789abcdef".into(),
///     commit_summary: "add eval".into(),
///     matches: vec![ScanMatch {
///         path: Some("a.py".into()),
///         line_number: 1,
///         line: "eval('danger')".into(),
///         description: "Usage of eval function".into(),
///         risk: 9,
///     }],
/// };
/// let text = render_text(&findings, false);
/// assert!(text.starts_with("Commit 0123456789abcdef: add eval\n"));
/// assert!(text.contains("0123456 a.py:1: eval('danger')"));
/// ```
pub fn render_text(findings: &CommitFindings, use_color: bool) -> String {
    let mut out = String::new();
    if use_color {
        let _ = writeln!(
            out,
            "{BOLD}{YELLOW}Commit {}{RESET}: {BOLD}{}{RESET}",
            findings.commit_id, findings.commit_summary
        );
    } else {
        let _ = writeln!(
            out,
            "Commit {}: {}",
            findings.commit_id, findings.commit_summary
        );
    }

    let short = findings.short_id();
    for m in &findings.matches {
        if use_color {
            let color = risk_color(m.risk);
            let _ = writeln!(
                out,
                "  {DIM}{short}{RESET} {CYAN}{}:{}{RESET}: {}  {color}[risk {}]{RESET} {}",
                m.display_path(),
                m.line_number,
                m.line,
                m.risk,
                m.description
            );
        } else {
            let _ = writeln!(
                out,
                "  {short} {}:{}: {}  [risk {}] {}",
                m.display_path(),
                m.line_number,
                m.line,
                m.risk,
                m.description
            );
        }
    }
    out
}

fn risk_color(risk: u32) -> &'static str {
    if risk >= 8 {
        RED
    } else if risk >= 5 {
        YELLOW
    } else {
        CYAN
    }
}

/// Render one commit's findings as a Markdown section.
pub fn render_markdown(findings: &CommitFindings) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "## `{}` {}\n",
        findings.short_id(),
        escape_markdown(&findings.commit_summary)
    );
    out.push_str("| File | Line | Code | Sink | Risk |\n");
    out.push_str("|------|------|------|------|------|\n");
    for m in &findings.matches {
        let _ = writeln!(
            out,
            "| {} | {} | `{}` | {} | {} |",
            escape_markdown(m.display_path()),
            m.line_number,
            m.line.replace('|', "\\|").replace('`', "'"),
            escape_markdown(&m.description),
            m.risk
        );
    }
    out.push('\n');
    out
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Render one commit's findings as a single JSON line.
///
/// # Errors
///
/// Returns [`SinkhoundError::Serialization`] if serialization fails.
pub fn render_json_line(findings: &CommitFindings) -> Result<String, SinkhoundError> {
    Ok(serde_json::to_string(findings)?)
}

/// One-line scan summary for stderr.
///
/// # Examples
///
/// ```
/// use sinkhound_history::report::render_summary;
/// use sinkhound_history::scanner::ScanStats;
///
/// let stats = ScanStats { commits_visited: 3, commits_with_findings: 1, matches: 2, ..ScanStats::default() };
/// assert_eq!(render_summary(&stats), "Scanned 3 commits: 2 matches in 1 commit");
/// ```
pub fn render_summary(stats: &ScanStats) -> String {
    format!(
        "Scanned {} commit{}: {} match{} in {} commit{}",
        stats.commits_visited,
        plural(stats.commits_visited, "", "s"),
        stats.matches,
        plural(stats.matches, "", "es"),
        stats.commits_with_findings,
        plural(stats.commits_with_findings, "", "s"),
    )
}

fn plural(n: usize, one: &'static str, many: &'static str) -> &'static str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// Convert findings to a SARIF v2.1.0 log.
///
/// Each distinct sink description becomes one rule with a unique id; every
/// match becomes one result located at its file and line, with the commit
/// recorded in the result properties.
///
/// # Examples
///
/// ```
/// use sinkhound_history::report::to_sarif;
///
/// let sarif = to_sarif(&[]);
/// assert_eq!(sarif["version"], "2.1.0");
/// ```
pub fn to_sarif(findings: &[CommitFindings]) -> serde_json::Value {
    let mut rule_ids: HashMap<&str, String> = HashMap::new();
    let mut used: HashSet<String> = HashSet::new();
    let mut rules = Vec::new();

    for m in findings.iter().flat_map(|f| &f.matches) {
        if rule_ids.contains_key(m.description.as_str()) {
            continue;
        }
        let base = format!("sinkhound/{}", slug(&m.description, rules.len()));
        let mut id = base.clone();
        let mut suffix = rules.len();
        while used.contains(&id) {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        used.insert(id.clone());
        rules.push(serde_json::json!({
            "id": id,
            "shortDescription": { "text": &m.description },
            "defaultConfiguration": { "level": risk_to_sarif_level(m.risk) },
            "properties": { "risk": m.risk }
        }));
        rule_ids.insert(m.description.as_str(), id);
    }

    let results: Vec<serde_json::Value> = findings
        .iter()
        .flat_map(|f| f.matches.iter().map(move |m| (f, m)))
        .map(|(f, m)| sarif_result(f, m, &rule_ids[m.description.as_str()]))
        .collect();

    serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "sinkhound",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/sinkhound/sinkhound",
                    "rules": rules
                }
            },
            "results": results
        }]
    })
}

fn sarif_result(findings: &CommitFindings, m: &ScanMatch, rule_id: &str) -> serde_json::Value {
    serde_json::json!({
        "ruleId": rule_id,
        "level": risk_to_sarif_level(m.risk),
        "message": { "text": format!("{}: {}", m.description, m.line) },
        "locations": [{
            "physicalLocation": {
                "artifactLocation": { "uri": m.display_path() },
                "region": { "startLine": m.line_number }
            }
        }],
        "properties": {
            "commit": &findings.commit_id,
            "commitSummary": &findings.commit_summary,
            "risk": m.risk
        }
    })
}

fn risk_to_sarif_level(risk: u32) -> &'static str {
    if risk >= 8 {
        "error"
    } else if risk >= 5 {
        "warning"
    } else {
        "note"
    }
}

fn slug(text: &str, fallback: usize) -> String {
    let slug = text
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect::<String>();
    if slug.is_empty() {
        format!("sink-{fallback}")
    } else {
        slug
    }
}
