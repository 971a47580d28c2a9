//! Error types for refactoring operations.
//!
//! Follows ODF-REP: Library crates use `thiserror` for explicit error enums.

use omni_cst::SyntaxError;
use thiserror::Error;

/// Error types for refactoring operations.
///
/// Every variant is file-scoped: a job stores its own error in its
/// [`TransformResult`](crate::TransformResult) and sibling jobs carry on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefactorError {
    /// Source is not well-formed Python (before or after the rewrite).
    #[error("Parse error: {0}")]
    Parse(String),

    /// A symbol or module the operation requires does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The destination already defines or imports the name.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A call site cannot be rewritten without guessing.
    #[error("Ambiguous match at {line}:{column}: {text}")]
    AmbiguousMatch {
        /// Line of the first skipped site (1-indexed).
        line: usize,
        /// Column of the first skipped site (1-indexed).
        column: usize,
        /// Source text of the skipped call.
        text: String,
    },

    /// Malformed qualified name or unusable replacement.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Malformed callable pattern.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Read or write failure.
    #[error("IO error: {0}")]
    Io(String),

    /// File exceeds the configured size limit.
    #[error("File too large: {0} bytes (limit: {1})")]
    TooLarge(u64, u64),

    /// File contains binary content (NULL bytes detected).
    #[error("Binary file detected")]
    BinaryFile,

    /// Configuration could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    Pool(String),

    /// Job was not started because the batch was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

impl RefactorError {
    /// Stable identifier of the variant for report consumers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::InvalidName(_) => "invalid_name",
            Self::InvalidPattern(_) => "invalid_pattern",
            Self::Io(_) => "io",
            Self::TooLarge(..) => "too_large",
            Self::BinaryFile => "binary_file",
            Self::Config(_) => "config",
            Self::Pool(_) => "pool",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<SyntaxError> for RefactorError {
    fn from(err: SyntaxError) -> Self {
        match err {
            SyntaxError::InvalidName(name) => Self::InvalidName(name),
            SyntaxError::Parse {
                line,
                column,
                message,
            } => Self::Parse(format!("{line}:{column}: {message}")),
            other => Self::Parse(other.to_string()),
        }
    }
}

impl From<std::io::Error> for RefactorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
