//! Extension allow-list applied to added lines before rule matching.

use sinkhound_core::AddedLine;

/// Restricts scanning to files whose path ends with one of a set of suffixes.
///
/// Suffixes are compared verbatim and case-sensitively against the end of the
/// path; no glob or regex semantics. An empty filter admits every line,
/// including lines without a path. A non-empty filter never admits a line
/// without a path.
///
/// # Examples
///
/// ```
/// use sinkhound_difflens::filter::ExtensionFilter;
///
/// let filter = ExtensionFilter::new([".php", ".inc"]);
/// assert!(filter.allows(Some("src/index.php")));
/// assert!(!filter.allows(Some("src/index.PHP")));
/// assert!(!filter.allows(None));
///
/// let open = ExtensionFilter::default();
/// assert!(open.allows(None));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    suffixes: Vec<String>,
}

impl ExtensionFilter {
    /// Create a filter from suffixes, used exactly as given.
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// Whether the filter admits everything.
    pub fn is_open(&self) -> bool {
        self.suffixes.is_empty()
    }

    /// Whether lines from a file at `path` are scanned.
    pub fn allows(&self, path: Option<&str>) -> bool {
        if self.is_open() {
            return true;
        }
        match path {
            Some(path) => self.suffixes.iter().any(|s| path.ends_with(s.as_str())),
            None => false,
        }
    }

    /// Whether `line` is scanned.
    pub fn admits(&self, line: &AddedLine) -> bool {
        self.allows(line.file_path.as_deref())
    }
}

/// Normalize user-supplied extensions into path suffixes.
///
/// Empty entries are dropped and a leading `.` is added when missing, so
/// `php` and `.php` are equivalent.
///
/// # Examples
///
/// ```
/// use sinkhound_difflens::filter::normalize_extensions;
///
/// assert_eq!(normalize_extensions(["php", ".yaml", ""]), vec![".php", ".yaml"]);
/// ```
pub fn normalize_extensions<I, S>(extensions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    extensions
        .into_iter()
        .filter_map(|ext| {
            let ext = ext.as_ref().trim();
            if ext.is_empty() {
                None
            } else if ext.starts_with('.') {
                Some(ext.to_string())
            } else {
                Some(format!(".{ext}"))
            }
        })
        .collect()
}

/// Parse a comma separated extension list such as `php,yaml`.
///
/// # Examples
///
/// ```
/// use sinkhound_difflens::filter::parse_extension_list;
///
/// assert_eq!(parse_extension_list("php,,.inc"), vec![".php", ".inc"]);
/// assert!(parse_extension_list("").is_empty());
/// ```
pub fn parse_extension_list(csv: &str) -> Vec<String> {
    normalize_extensions(csv.split(','))
}
