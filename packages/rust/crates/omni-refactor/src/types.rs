//! Core types for refactoring jobs.
//!
//! Defines the per-file job, its transform and the result it produces.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use omni_cst::{QualifiedName, SourceUnit, line_col};
use serde::{Serialize, Serializer};

use crate::calls::{CallableName, replace_call};
use crate::diff::unified_diff;
use crate::error::RefactorError;
use crate::imports::replace_import;

/// Location of an individual edit within a file.
///
/// Provides precise position information for each replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditLocation {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
    /// Original text that was replaced.
    pub original_text: String,
    /// New text after replacement.
    pub new_text: String,
}

/// A call site left untouched because rewriting it would require a guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousSite {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
    /// Source text of the call.
    pub text: String,
}

/// Per-file outcome of a transform.
///
/// Created by a job and never mutated once handed to the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct TransformResult {
    /// File the job processed.
    pub path: PathBuf,
    /// True when the rendered output differs from the original.
    pub modified: bool,
    /// Original content before modification.
    #[serde(skip)]
    pub original: String,
    /// Rendered content after the transform.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    /// Unified diff showing changes.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub diff: String,
    /// Individual edit locations.
    pub edits: Vec<EditLocation>,
    /// Call sites skipped as ambiguous.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<AmbiguousSite>,
    /// True when the output was persisted.
    pub written: bool,
    /// Error that stopped or qualified the job.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RefactorError>,
}

impl TransformResult {
    /// Result for a file the transform left alone.
    #[must_use]
    pub fn unchanged(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: path.into(),
            modified: false,
            original: text.clone(),
            output: text,
            diff: String::new(),
            edits: Vec::new(),
            ambiguous: Vec::new(),
            written: false,
            error: None,
        }
    }

    /// Result for a job that failed before producing output.
    #[must_use]
    pub fn failed(path: impl Into<PathBuf>, error: RefactorError) -> Self {
        Self {
            error: Some(error),
            ..Self::unchanged(path, String::new())
        }
    }

    /// Render `unit`, validate that the output still parses and collect
    /// edit locations and a diff.
    ///
    /// Output that no longer parses is reported as a parse error and keeps
    /// the original text as its output.
    #[must_use]
    pub fn from_unit(path: impl Into<PathBuf>, unit: &SourceUnit) -> Self {
        let path = path.into();
        if !unit.is_modified() {
            return Self::unchanged(path, unit.text());
        }
        if let Err(e) = unit.reparse() {
            return Self {
                error: Some(RefactorError::Parse(format!("rewritten output: {e}"))),
                ..Self::unchanged(path, unit.text())
            };
        }

        let output = unit.render();
        let edits = unit
            .edits()
            .iter()
            .filter(|e| unit.span_text(&e.span) != e.text)
            .map(|e| {
                let (line, column) = unit.line_col(e.span.start);
                EditLocation {
                    line,
                    column,
                    original_text: unit.span_text(&e.span).to_string(),
                    new_text: e.text.clone(),
                }
            })
            .collect();
        Self::from_texts(path, unit.text(), output).with_edits(edits)
    }

    /// Result for an output computed outside a single unit (definition moves).
    #[must_use]
    pub fn from_texts(
        path: impl Into<PathBuf>,
        original: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let original = original.into();
        let output = output.into();
        if original == output {
            return Self::unchanged(path, original);
        }
        let diff = unified_diff(&path.to_string_lossy(), &original, &output);
        Self {
            path,
            modified: true,
            original,
            output,
            diff,
            edits: Vec::new(),
            ambiguous: Vec::new(),
            written: false,
            error: None,
        }
    }

    fn with_edits(mut self, edits: Vec<EditLocation>) -> Self {
        self.edits = edits;
        self
    }

    /// Attach skipped call sites; the first one becomes the file's error.
    #[must_use]
    pub fn with_ambiguous(mut self, sites: Vec<AmbiguousSite>) -> Self {
        if self.error.is_none()
            && let Some(first) = sites.first()
        {
            self.error = Some(RefactorError::AmbiguousMatch {
                line: first.line,
                column: first.column,
                text: first.text.clone(),
            });
        }
        self.ambiguous = sites;
        self
    }

    /// True when the job recorded an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Number of changed lines in the diff (insertions plus deletions).
    #[must_use]
    pub fn changed_lines(&self) -> usize {
        self.diff
            .lines()
            .filter(|l| {
                (l.starts_with('+') && !l.starts_with("+++"))
                    || (l.starts_with('-') && !l.starts_with("---"))
            })
            .count()
    }
}

#[derive(Serialize)]
struct ErrorView<'a> {
    kind: &'a str,
    message: String,
}

/// `{kind, message}` view of an optional error, shared by the JSON reports.
#[allow(clippy::ref_option)]
pub(crate) fn serialize_error<S: Serializer>(
    error: &Option<RefactorError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    error
        .as_ref()
        .map(|e| ErrorView {
            kind: e.kind(),
            message: e.to_string(),
        })
        .serialize(serializer)
}

/// A per-file transform and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Point an import and its references at a new qualified name.
    ReplaceImport {
        /// Qualified name the import currently denotes.
        target: QualifiedName,
        /// Qualified name to import instead.
        replacement: QualifiedName,
    },
    /// Rename call callees (and optionally remap their arguments).
    ReplaceCall {
        /// Pattern matched against call sites.
        old: CallableName,
        /// Replacement callee and argument shape.
        new: CallableName,
    },
}

impl Transform {
    /// Record this transform's edits on `unit`, returning skipped call sites.
    ///
    /// # Errors
    /// Returns `RefactorError::InvalidName` for replacements that cannot be
    /// expressed as an import, or an edit conflict as `RefactorError::Parse`.
    pub fn apply(&self, unit: &mut SourceUnit) -> Result<Vec<AmbiguousSite>, RefactorError> {
        match self {
            Self::ReplaceImport {
                target,
                replacement,
            } => {
                replace_import(unit, target, replacement)?;
                Ok(Vec::new())
            }
            Self::ReplaceCall { old, new } => Ok(replace_call(unit, old, new)?.ambiguous),
        }
    }

    /// Parse `text`, apply the transform and render the result.
    ///
    /// Never touches the file system.
    #[must_use]
    pub fn transform_source(&self, path: &Path, text: &str) -> TransformResult {
        let mut unit = match SourceUnit::parse_path(path, text) {
            Ok(unit) => unit,
            Err(e) => return TransformResult::failed(path, e.into()),
        };
        match self.apply(&mut unit) {
            Ok(ambiguous) => TransformResult::from_unit(path, &unit).with_ambiguous(ambiguous),
            Err(e) => TransformResult {
                error: Some(e),
                ..TransformResult::unchanged(path, text)
            },
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::ReplaceImport {
                target,
                replacement,
            } => format!("replace-import {target} -> {replacement}"),
            Self::ReplaceCall { old, new } => format!("replace-call {old} -> {new}"),
        }
    }
}

/// One unit of work for the driver.
///
/// Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct Job {
    /// File to process.
    pub path: PathBuf,
    /// Transform to apply.
    pub transform: Arc<Transform>,
    /// Compute the result without persisting it.
    pub preview_only: bool,
}

/// Resolve the 1-indexed location of `offset` in `text` for a skipped site.
pub(crate) fn ambiguous_site(text: &str, span: std::ops::Range<usize>) -> AmbiguousSite {
    let (line, column) = line_col(text, span.start);
    AmbiguousSite {
        line,
        column,
        text: text.get(span).unwrap_or_default().to_string(),
    }
}
