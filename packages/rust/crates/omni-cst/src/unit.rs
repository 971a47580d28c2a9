//! Lossless Python source units.
//!
//! A [`SourceUnit`] owns the original text, its tree-sitter tree and the edits
//! recorded against it. Rendering an unedited unit returns the original text
//! byte-for-byte; rendering an edited unit only changes the edited spans.

use std::path::{Path, PathBuf};

use tree_sitter::{Language, Node, Parser, Tree};

use crate::edit::{EditSet, Span, TextEdit};
use crate::error::SyntaxError;

/// One parsed file: original text, concrete syntax tree and pending edits.
///
/// Owned by the job that parsed it; never shared between workers.
pub struct SourceUnit {
    path: Option<PathBuf>,
    text: String,
    tree: Tree,
    edits: EditSet,
}

impl std::fmt::Debug for SourceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceUnit")
            .field("path", &self.path)
            .field("len", &self.text.len())
            .field("edits", &self.edits.as_slice().len())
            .finish()
    }
}

/// Parse source text into a unit. Shorthand for [`SourceUnit::parse`].
///
/// # Errors
/// Returns `SyntaxError::Parse` when the text is not well-formed Python.
pub fn parse(text: &str) -> Result<SourceUnit, SyntaxError> {
    SourceUnit::parse(text)
}

/// Render a unit with its edits applied. Shorthand for [`SourceUnit::render`].
#[must_use]
pub fn render(unit: &SourceUnit) -> String {
    unit.render()
}

impl SourceUnit {
    /// Parse Python source text.
    ///
    /// # Errors
    /// Returns `SyntaxError::Parse` when the tree contains an error or missing
    /// node, `SyntaxError::Language` when the grammar cannot be loaded.
    pub fn parse(text: impl Into<String>) -> Result<Self, SyntaxError> {
        let text = text.into();
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| SyntaxError::Language(e.to_string()))?;
        let tree = parser.parse(&text, None).ok_or_else(|| SyntaxError::Parse {
            line: 1,
            column: 1,
            message: "parser produced no tree".to_string(),
        })?;

        if tree.root_node().has_error() {
            return Err(first_error(tree.root_node(), &text));
        }

        Ok(Self {
            path: None,
            text,
            tree,
            edits: EditSet::default(),
        })
    }

    /// Parse source text read from `path`.
    ///
    /// # Errors
    /// Same as [`SourceUnit::parse`].
    pub fn parse_path(path: impl AsRef<Path>, text: impl Into<String>) -> Result<Self, SyntaxError> {
        let mut unit = Self::parse(text)?;
        unit.path = Some(path.as_ref().to_path_buf());
        Ok(unit)
    }

    /// Path this unit was read from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The original text, without edits.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Root `module` node of the syntax tree.
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Original text covered by `node`.
    #[must_use]
    pub fn node_text(&self, node: Node<'_>) -> &str {
        self.text.get(node.byte_range()).unwrap_or("")
    }

    /// Original text covered by `span`.
    #[must_use]
    pub fn span_text(&self, span: &Span) -> &str {
        self.text.get(span.clone()).unwrap_or("")
    }

    /// Replace `span` of the original text with `text`.
    ///
    /// # Errors
    /// Returns `SyntaxError::OverlappingEdit` when `span` intersects a recorded edit.
    pub fn replace(&mut self, span: Span, text: impl Into<String>) -> Result<(), SyntaxError> {
        self.edits.push(
            &self.text,
            TextEdit {
                span,
                text: text.into(),
            },
        )
    }

    /// Insert `text` at byte offset `at`.
    ///
    /// # Errors
    /// Returns `SyntaxError::OverlappingEdit` when `at` falls inside a recorded edit.
    pub fn insert(&mut self, at: usize, text: impl Into<String>) -> Result<(), SyntaxError> {
        self.replace(at..at, text)
    }

    /// Delete `span` from the original text.
    ///
    /// # Errors
    /// Returns `SyntaxError::OverlappingEdit` when `span` intersects a recorded edit.
    pub fn delete(&mut self, span: Span) -> Result<(), SyntaxError> {
        self.replace(span, String::new())
    }

    /// Replace `span`, subsuming edits recorded strictly inside it.
    ///
    /// Callers render the span with [`SourceUnit::render_range`] first so the
    /// inner edits survive inside `text`.
    ///
    /// # Errors
    /// Returns `SyntaxError::OverlappingEdit` when an edit straddles `span`.
    pub fn replace_enclosing(
        &mut self,
        span: Span,
        text: impl Into<String>,
    ) -> Result<(), SyntaxError> {
        self.edits.push_enclosing(
            &self.text,
            TextEdit {
                span,
                text: text.into(),
            },
        )
    }

    /// Recorded edits in position order.
    #[must_use]
    pub fn edits(&self) -> &[TextEdit] {
        self.edits.as_slice()
    }

    /// True when at least one edit changes the rendered text.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.edits
            .as_slice()
            .iter()
            .any(|e| self.span_text(&e.span) != e.text)
    }

    /// Drop every recorded edit, restoring the original rendering.
    pub fn discard_edits(&mut self) {
        self.edits.clear();
    }

    /// Render the whole unit with edits applied.
    #[must_use]
    pub fn render(&self) -> String {
        if self.edits.is_empty() {
            return self.text.clone();
        }
        self.edits.apply_within(&self.text, 0..self.text.len())
    }

    /// Render `span` with the edits that lie inside it applied.
    #[must_use]
    pub fn render_range(&self, span: Span) -> String {
        self.edits.apply_within(&self.text, span)
    }

    /// Parse the rendered output into a fresh, unedited unit on the same path.
    ///
    /// # Errors
    /// Returns `SyntaxError::Parse` when the edits produced malformed source.
    pub fn reparse(&self) -> Result<Self, SyntaxError> {
        let mut unit = Self::parse(self.render())?;
        unit.path.clone_from(&self.path);
        Ok(unit)
    }

    /// 1-indexed line and column of a byte offset in the original text.
    #[must_use]
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        line_col(&self.text, offset)
    }
}

/// 1-indexed line and column (in bytes) of `offset` within `text`.
#[must_use]
pub fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = before.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    (line, offset - line_start + 1)
}

fn first_error(root: Node<'_>, text: &str) -> SyntaxError {
    let mut cursor = root.walk();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let point = node.start_position();
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let snippet: String = text
                    .get(node.byte_range())
                    .unwrap_or("")
                    .chars()
                    .take(40)
                    .collect();
                format!("unexpected `{}`", snippet.trim())
            };
            return SyntaxError::Parse {
                line: point.row + 1,
                column: point.column + 1,
                message,
            };
        }
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev().filter(Node::has_error));
    }
    let point = root.start_position();
    SyntaxError::Parse {
        line: point.row + 1,
        column: point.column + 1,
        message: "malformed source".to_string(),
    }
}
