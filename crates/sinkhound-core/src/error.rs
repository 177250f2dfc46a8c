use std::path::PathBuf;

/// Errors that can occur across SinkHound.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary converts to `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use sinkhound_core::SinkhoundError;
///
/// let err = SinkhoundError::Config("max_commits must be a number".into());
/// assert!(err.to_string().contains("max_commits"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SinkhoundError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(sinkhound::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(sinkhound::config))]
    Config(String),

    /// A sink rule whose pattern is not a valid regular expression.
    #[error("invalid pattern for sink #{index} (`{pattern}`)")]
    #[diagnostic(
        code(sinkhound::rule),
        help("sink patterns use Rust `regex` syntax; escape literal parentheses as `\\(`")
    )]
    Rule {
        /// Position of the rule in the sink file, starting at 0.
        index: usize,
        /// The pattern as written.
        pattern: String,
        /// Underlying compile error.
        #[source]
        source: regex::Error,
    },

    /// Git operation failure.
    #[error("git error: {0}")]
    #[diagnostic(code(sinkhound::git))]
    Git(String),

    /// Unified diff parsing failure.
    #[error("parse error: {0}")]
    #[diagnostic(code(sinkhound::parse))]
    Parse(String),

    /// JSON serialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(sinkhound::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(sinkhound::toml))]
    Toml(#[from] toml::de::Error),

    /// YAML deserialization failure in a sink file.
    #[error("YAML parse error: {0}")]
    #[diagnostic(code(sinkhound::yaml))]
    Yaml(#[from] serde_yaml::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(sinkhound::not_found))]
    FileNotFound(PathBuf),
}
