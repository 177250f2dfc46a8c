use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SinkhoundError;

/// Top-level configuration loaded from `.sinkhound.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use sinkhound_core::SinkhoundConfig;
///
/// let config = SinkhoundConfig::default();
/// assert!(config.scan.include_ext.is_empty());
/// assert_eq!(config.scan.max_commits, 0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkhoundConfig {
    /// Scan behaviour settings.
    #[serde(default)]
    pub scan: ScanConfig,
    /// Reporting settings.
    #[serde(default)]
    pub output: OutputConfig,
}

impl SinkhoundConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::Io`] if the file cannot be read, or
    /// [`SinkhoundError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sinkhound_core::SinkhoundConfig;
    /// use std::path::Path;
    ///
    /// let config = SinkhoundConfig::from_file(Path::new(".sinkhound.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, SinkhoundError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`SinkhoundError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use sinkhound_core::SinkhoundConfig;
    ///
    /// let toml = r#"
    /// [scan]
    /// include_ext = ["php"]
    /// "#;
    /// let config = SinkhoundConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.scan.include_ext, vec!["php"]);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, SinkhoundError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Scan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Sink definition file. The built-in PHP sinks are used when unset.
    pub sinks: Option<PathBuf>,
    /// Branch to scan. HEAD when unset.
    pub branch: Option<String>,
    /// File extensions to scan, with or without the leading dot.
    #[serde(default)]
    pub include_ext: Vec<String>,
    /// Maximum number of commits to visit; zero or negative for no limit.
    #[serde(default)]
    pub max_commits: i64,
}

impl ScanConfig {
    /// The configured commit limit, `None` when unlimited.
    pub fn commit_limit(&self) -> Option<usize> {
        commit_limit(self.max_commits)
    }
}

/// Interpret a commit limit: values of zero or below mean no limit.
///
/// # Examples
///
/// ```
/// use sinkhound_core::commit_limit;
///
/// assert_eq!(commit_limit(25), Some(25));
/// assert_eq!(commit_limit(0), None);
/// assert_eq!(commit_limit(-1), None);
/// ```
pub fn commit_limit(max_commits: i64) -> Option<usize> {
    usize::try_from(max_commits).ok().filter(|&n| n > 0)
}

/// Reporting configuration.
///
/// # Examples
///
/// ```
/// use sinkhound_core::OutputConfig;
///
/// let config = OutputConfig::default();
/// assert!(config.fail_on_risk.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Exit with status 1 when any finding has at least this risk.
    pub fail_on_risk: Option<u32>,
}
