//! Sink rules: loading, validation, and per-line matching.

use std::path::Path;

use regex::{Regex, RegexSet};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::SinkhoundError;

/// Sink definitions shipped with SinkHound, used when no sink file is given.
pub const BUILTIN_SINKS: &str = include_str!("../sinks/php.yml");

/// A single dangerous pattern to look for in added lines.
///
/// # Examples
///
/// ```
/// use sinkhound_core::SinkRule;
///
/// let rule = SinkRule::new(r"eval\(", "Usage of eval function", 9).unwrap();
/// assert!(rule.is_match("x = eval('1')"));
/// assert!(!rule.is_match("evaluate()"));
/// ```
#[derive(Debug, Clone)]
pub struct SinkRule {
    regex: Regex,
    /// Human-readable description reported with each match.
    pub description: String,
    /// Risk value passed through to reports.
    pub risk: u32,
}

impl SinkRule {
    /// Compile a rule from its pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error if `pattern` is invalid.
    pub fn new(
        pattern: &str,
        description: impl Into<String>,
        risk: u32,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            description: description.into(),
            risk,
        })
    }

    /// The pattern as written in the sink file.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the pattern occurs anywhere in `line`.
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

impl Serialize for SinkRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SinkRule", 3)?;
        s.serialize_field("pattern", self.pattern())?;
        s.serialize_field("description", &self.description)?;
        s.serialize_field("risk", &self.risk)?;
        s.end()
    }
}

#[derive(Debug, Deserialize)]
struct SinkFile {
    #[serde(default)]
    sinks: Vec<SinkEntry>,
}

#[derive(Debug, Deserialize)]
struct SinkEntry {
    pattern: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    risk: u32,
}

/// An ordered, immutable set of sink rules.
///
/// All patterns are also compiled into one [`RegexSet`], so each line is
/// searched in a single pass. Matches are still reported in rule order.
///
/// # Examples
///
/// ```
/// use sinkhound_core::RuleSet;
///
/// let yaml = r#"
/// sinks:
///   - pattern: "eval\\("
///     description: "Usage of eval function"
///     risk: 9
/// "#;
/// let rules = RuleSet::from_yaml(yaml).unwrap();
/// let hits: Vec<_> = rules.matching("eval('danger')").collect();
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].risk, 9);
/// ```
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<SinkRule>,
    combined: RegexSet,
}

impl RuleSet {
    /// Build a rule set from already compiled rules.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::Config`] if the combined set exceeds the
    /// regex size limit.
    pub fn new(rules: Vec<SinkRule>) -> Result<Self, SinkhoundError> {
        let combined = RegexSet::new(rules.iter().map(SinkRule::pattern))
            .map_err(|e| SinkhoundError::Config(format!("cannot combine sink patterns: {e}")))?;
        Ok(Self { rules, combined })
    }

    /// A rule set with no rules. Never matches anything.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            combined: RegexSet::empty(),
        }
    }

    /// The built-in PHP sink set.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded definitions are broken.
    pub fn builtin() -> Result<Self, SinkhoundError> {
        Self::from_yaml(BUILTIN_SINKS)
    }

    /// Load sinks from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::FileNotFound`] if `path` does not exist,
    /// [`SinkhoundError::Yaml`] for malformed YAML, and
    /// [`SinkhoundError::Rule`] for a pattern that does not compile.
    pub fn from_file(path: &Path) -> Result<Self, SinkhoundError> {
        if !path.exists() {
            return Err(SinkhoundError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let rules = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), rules = rules.len(), "loaded sink file");
        Ok(rules)
    }

    /// Parse sinks from a YAML document with a top-level `sinks` list.
    ///
    /// A document without a `sinks` key yields an empty rule set.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::Yaml`] for malformed YAML and
    /// [`SinkhoundError::Rule`] for a pattern that does not compile.
    pub fn from_yaml(content: &str) -> Result<Self, SinkhoundError> {
        if content.trim().is_empty() {
            return Ok(Self::empty());
        }
        let file: SinkFile = serde_yaml::from_str(content)?;
        let rules = file
            .sinks
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                SinkRule::new(&entry.pattern, entry.description, entry.risk).map_err(|source| {
                    SinkhoundError::Rule {
                        index,
                        pattern: entry.pattern.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    /// Rules whose pattern occurs in `line`, in rule order.
    pub fn matching<'a>(&'a self, line: &str) -> impl Iterator<Item = &'a SinkRule> + 'a {
        self.combined
            .matches(line)
            .into_iter()
            .map(move |idx| &self.rules[idx])
    }

    /// Iterate over all rules in order.
    pub fn iter(&self) -> std::slice::Iter<'_, SinkRule> {
        self.rules.iter()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_SINKS: &str = r#"
sinks:
  - pattern: "eval\\("
    description: "Usage of eval function"
    risk: 9
  - pattern: "\\$_GET"
    description: "Request input"
    risk: 3
  - pattern: "system\\("
    description: "Command execution"
    risk: 8
"#;

    #[test]
    fn parse_sinks_in_order() {
        let rules = RuleSet::from_yaml(THREE_SINKS).unwrap();
        assert_eq!(rules.len(), 3);
        let descriptions: Vec<_> = rules.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec!["Usage of eval function", "Request input", "Command execution"]
        );
        assert_eq!(rules.iter().next().unwrap().pattern(), r"eval\(");
    }

    #[test]
    fn line_matching_several_rules_yields_each_once() {
        let rules = RuleSet::from_yaml(THREE_SINKS).unwrap();
        let hits: Vec<_> = rules
            .matching("system(eval($_GET['cmd']));")
            .map(|r| (r.description.as_str(), r.risk))
            .collect();
        assert_eq!(
            hits,
            vec![
                ("Usage of eval function", 9),
                ("Request input", 3),
                ("Command execution", 8),
            ]
        );
    }

    #[test]
    fn matching_is_unanchored() {
        let rules = RuleSet::from_yaml(THREE_SINKS).unwrap();
        assert_eq!(rules.matching("  $x = eval('1') + 2;").count(), 1);
        assert_eq!(rules.matching("evaluate()").count(), 0);
    }

    #[test]
    fn defaults_for_missing_fields() {
        let rules = RuleSet::from_yaml("sinks:\n  - pattern: exec\n").unwrap();
        let rule = rules.iter().next().unwrap();
        assert_eq!(rule.description, "");
        assert_eq!(rule.risk, 0);
    }

    #[test]
    fn missing_sinks_key_is_empty() {
        let rules = RuleSet::from_yaml("other: 1\n").unwrap();
        assert!(rules.is_empty());
        assert_eq!(rules.matching("eval(1)").count(), 0);
    }

    #[test]
    fn empty_document_is_empty() {
        assert!(RuleSet::from_yaml("").unwrap().is_empty());
        assert_eq!(RuleSet::empty().matching("anything").count(), 0);
    }

    #[test]
    fn invalid_pattern_is_rejected_with_index() {
        let yaml = "sinks:\n  - pattern: ok\n  - pattern: \"eval(\"\n";
        let err = RuleSet::from_yaml(yaml).unwrap_err();
        match err {
            SinkhoundError::Rule { index, pattern, .. } => {
                assert_eq!(index, 1);
                assert_eq!(pattern, "eval(");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let err = RuleSet::from_yaml("sinks: [unclosed").unwrap_err();
        assert!(matches!(err, SinkhoundError::Yaml(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RuleSet::from_file(Path::new("/nonexistent/sinks.yml")).unwrap_err();
        assert!(matches!(err, SinkhoundError::FileNotFound(_)));
    }

    #[test]
    fn from_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sinks.yml");
        std::fs::write(&path, THREE_SINKS).unwrap();
        let rules = RuleSet::from_file(&path).unwrap();
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn builtin_sinks_compile_and_catch_eval() {
        let rules = RuleSet::builtin().unwrap();
        assert!(!rules.is_empty());
        assert!(rules
            .matching("eval($_POST['code']);")
            .any(|r| r.description == "Usage of eval function"));
        assert!(rules
            .matching("include($page);")
            .any(|r| r.description.contains("include")));
        assert_eq!(rules.matching("echo 'hello';").count(), 0);
    }

    #[test]
    fn rule_serializes_pattern() {
        let rule = SinkRule::new(r"eval\(", "eval", 9).unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["pattern"], r"eval\(");
        assert_eq!(json["risk"], 9);
    }
}
