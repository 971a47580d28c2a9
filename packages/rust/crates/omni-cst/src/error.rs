//! Error types for syntax units.
//!
//! Follows ODF-REP: Library crates use `thiserror` for explicit error enums.

use thiserror::Error;

/// Error types for parsing and editing a [`SourceUnit`](crate::SourceUnit).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// Source text is not well-formed Python.
    #[error("Parse error at {line}:{column}: {message}")]
    Parse {
        /// Line of the first error node (1-indexed).
        line: usize,
        /// Column of the first error node (1-indexed).
        column: usize,
        /// Short description of the offending node.
        message: String,
    },

    /// Dotted name with an empty or non-identifier segment.
    #[error("Invalid qualified name: {0:?}")]
    InvalidName(String),

    /// An edit intersects an edit that was already recorded.
    #[error("Overlapping edit at bytes {start}..{end}")]
    OverlappingEdit {
        /// Start byte of the rejected edit.
        start: usize,
        /// End byte of the rejected edit.
        end: usize,
    },

    /// Edit range lies outside the source text or splits a character.
    #[error("Edit range {start}..{end} is out of bounds")]
    OutOfBounds {
        /// Start byte of the rejected edit.
        start: usize,
        /// End byte of the rejected edit.
        end: usize,
    },

    /// The tree-sitter grammar could not be loaded.
    #[error("Language error: {0}")]
    Language(String),
}
