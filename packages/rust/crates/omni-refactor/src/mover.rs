//! Definition moves.
//!
//! Moving a top-level `def`/`class` is a two-phase operation driven by
//! [`DefinitionMove`]:
//!
//! ```text
//! Pending --extract--> Extracted --commit--> Committed
//!    |                     |
//!    +-------abort---------+-----------------> Aborted
//! ```
//!
//! Phase 1 (`extract` + `commit`) touches only the origin and destination
//! modules. The importer fix-up of phase 2 is only handed out once the move
//! is `Committed`, so a failed phase 1 never has side effects elsewhere.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use omni_cst::{
    BindingTable, QualifiedName, SourceUnit, Span, TopLevelDefinition, line_end_inclusive,
    line_start, name_references, top_level_assignments, top_level_definitions, tree,
};
use serde::Serialize;

use crate::error::RefactorError;
use crate::fs::write_source;
use crate::imports::{add_import, remove_import};
use crate::types::Transform;

/// Blank lines between top-level definitions when the destination shows none.
const DEFAULT_SEPARATOR: usize = 2;

/// Lifecycle of a definition move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveState {
    /// Nothing has happened yet.
    Pending,
    /// Both rewritten modules are computed but not persisted.
    Extracted,
    /// Phase 1 is persisted (or accepted in preview mode).
    Committed,
    /// Phase 1 failed; nothing was left modified.
    Aborted,
}

impl fmt::Display for MoveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Extracted => "extracted",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Rewritten origin and destination texts computed by phase 1.
#[derive(Debug, Clone)]
pub struct MoveOutput {
    /// Origin text before the move.
    pub origin_original: String,
    /// Origin text after the definition was removed.
    pub origin: String,
    /// Destination text before the move (empty for a new module).
    pub destination_original: String,
    /// Destination text with the definition appended.
    pub destination: String,
    /// True when the origin still uses the symbol and now imports it.
    pub origin_imports_target: bool,
}

/// A move of one top-level definition from `symbol` to `target`.
#[derive(Debug)]
pub struct DefinitionMove {
    symbol: QualifiedName,
    target: QualifiedName,
    state: MoveState,
    output: Option<MoveOutput>,
    error: Option<RefactorError>,
}

impl DefinitionMove {
    /// A pending move of `symbol` (`pkg.origin.Name`) to `target`
    /// (`pkg.destination.NewName`).
    #[must_use]
    pub fn new(symbol: QualifiedName, target: QualifiedName) -> Self {
        Self {
            symbol,
            target,
            state: MoveState::Pending,
            output: None,
            error: None,
        }
    }

    /// Qualified name being moved.
    #[must_use]
    pub fn symbol(&self) -> &QualifiedName {
        &self.symbol
    }

    /// Qualified name after the move.
    #[must_use]
    pub fn target(&self) -> &QualifiedName {
        &self.target
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MoveState {
        self.state
    }

    /// Phase-1 output once extracted.
    #[must_use]
    pub fn output(&self) -> Option<&MoveOutput> {
        self.output.as_ref()
    }

    /// Error that aborted the move.
    #[must_use]
    pub fn error(&self) -> Option<&RefactorError> {
        self.error.as_ref()
    }

    /// Origin and destination module names.
    ///
    /// # Errors
    /// `InvalidName` when either name lacks a module path, `Conflict` when
    /// both live in the same module.
    pub fn modules(&self) -> Result<(QualifiedName, QualifiedName), RefactorError> {
        let origin = self.symbol.module().ok_or_else(|| {
            RefactorError::InvalidName(format!("{} has no module path", self.symbol))
        })?;
        let destination = self.target.module().ok_or_else(|| {
            RefactorError::InvalidName(format!("{} has no module path", self.target))
        })?;
        if origin == destination {
            return Err(RefactorError::Conflict(format!(
                "origin and destination are both {origin}"
            )));
        }
        Ok((origin, destination))
    }

    /// Compute phase 1: remove the definition from `origin` and append it to
    /// `destination`, recording the edits on both units.
    ///
    /// # Errors
    /// `NotFound` when `origin` has no top-level definition of the symbol,
    /// `Conflict` when `destination` already binds the new name, `Parse` when
    /// a rewritten module would not parse. Any error aborts the move.
    pub fn extract(
        &mut self,
        origin: &mut SourceUnit,
        destination: &mut SourceUnit,
    ) -> Result<&MoveOutput, RefactorError> {
        self.require(MoveState::Pending)?;
        match self.plan(origin, destination) {
            Ok(output) => {
                self.state = MoveState::Extracted;
                tracing::info!(
                    symbol = %self.symbol,
                    target = %self.target,
                    "definition extracted"
                );
                Ok(&*self.output.insert(output))
            }
            Err(error) => {
                origin.discard_edits();
                destination.discard_edits();
                self.abort(error.clone());
                Err(error)
            }
        }
    }

    /// Persist phase 1 through `persist` and commit, or abort on failure.
    ///
    /// # Errors
    /// Whatever `persist` returns; the move is then `Aborted`.
    pub fn commit<F>(&mut self, persist: F) -> Result<(), RefactorError>
    where
        F: FnOnce(&MoveOutput) -> Result<(), RefactorError>,
    {
        self.require(MoveState::Extracted)?;
        let Some(output) = self.output.as_ref() else {
            return Err(self.state_error(MoveState::Extracted));
        };
        match persist(output) {
            Ok(()) => {
                self.state = MoveState::Committed;
                tracing::info!(symbol = %self.symbol, target = %self.target, "definition move committed");
                Ok(())
            }
            Err(error) => {
                self.abort(error.clone());
                Err(error)
            }
        }
    }

    /// Mark the move aborted, keeping the first recorded error.
    pub fn abort(&mut self, error: RefactorError) {
        tracing::warn!(
            symbol = %self.symbol,
            target = %self.target,
            from = %self.state,
            error = %error,
            "definition move aborted"
        );
        self.state = MoveState::Aborted;
        self.error.get_or_insert(error);
    }

    /// The importer fix-up for phase 2, only available once committed.
    #[must_use]
    pub fn fan_out(&self) -> Option<Transform> {
        (self.state == MoveState::Committed).then(|| Transform::ReplaceImport {
            target: self.symbol.clone(),
            replacement: self.target.clone(),
        })
    }

    fn require(&self, expected: MoveState) -> Result<(), RefactorError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.state_error(expected))
        }
    }

    fn state_error(&self, expected: MoveState) -> RefactorError {
        RefactorError::Conflict(format!(
            "move of {} is {}, expected {expected}",
            self.symbol, self.state
        ))
    }

    fn plan(
        &self,
        origin: &mut SourceUnit,
        destination: &mut SourceUnit,
    ) -> Result<MoveOutput, RefactorError> {
        let (_, destination_module) = self.modules()?;
        let old_leaf = self.symbol.leaf();
        let new_leaf = self.target.leaf();

        let definition = top_level_definitions(origin)
            .into_iter()
            .find(|d| d.name == old_leaf)
            .ok_or_else(|| {
                RefactorError::NotFound(format!(
                    "{} is not a top-level def or class of {}",
                    self.symbol,
                    origin.path().map_or_else(String::new, |p| p.display().to_string())
                ))
            })?;
        check_conflict(destination, &self.symbol, new_leaf)?;

        let fragment = extract_fragment(origin, &definition, new_leaf)?;

        // Origin: drop the definition, then import it back if still used.
        let removal = removal_span(origin.text(), &definition);
        let remaining: Vec<Span> = name_references(origin, &(0..origin.text().len()), old_leaf)
            .into_iter()
            .filter(|s| s.end <= removal.start || s.start >= removal.end)
            .collect();
        origin.delete(removal)?;
        let origin_imports_target = !remaining.is_empty();
        if origin_imports_target {
            add_import(origin, &destination_module, new_leaf)?;
            if new_leaf != old_leaf {
                for span in remaining {
                    origin.replace(span, new_leaf)?;
                }
            }
        }

        // Destination: the symbol becomes local, so its imports go and names
        // bound through an alias now refer to the moved definition.
        let table = BindingTable::resolve(destination);
        let rebound: Vec<Span> = table
            .find(&self.symbol)
            .filter(|&idx| table.bindings()[idx].local_name() != new_leaf)
            .flat_map(|idx| table.references_to(idx).map(|site| site.span.clone()))
            .collect();
        for span in rebound {
            destination.replace(span, new_leaf)?;
        }
        remove_import(destination, &self.symbol)?;
        let insertion = append_text(destination, &destination.render(), &fragment);
        destination.insert(destination.text().len(), insertion)?;

        origin
            .reparse()
            .map_err(|e| RefactorError::Parse(format!("origin after move: {e}")))?;
        destination
            .reparse()
            .map_err(|e| RefactorError::Parse(format!("destination after move: {e}")))?;

        Ok(MoveOutput {
            origin_original: origin.text().to_string(),
            origin: origin.render(),
            destination_original: destination.text().to_string(),
            destination: destination.render(),
            origin_imports_target,
        })
    }
}

/// Write phase 1: destination first, then origin. When the origin write
/// fails the destination is restored (or removed when it was created).
///
/// # Errors
/// The first write error; restoration is best-effort.
pub fn persist_move(
    origin_path: &Path,
    destination_path: &Path,
    output: &MoveOutput,
    destination_existed: bool,
) -> Result<(), RefactorError> {
    write_source(destination_path, &output.destination)?;
    if let Err(error) = write_source(origin_path, &output.origin) {
        let restored = if destination_existed {
            write_source(destination_path, &output.destination_original)
        } else {
            std::fs::remove_file(destination_path).map_err(RefactorError::from)
        };
        if let Err(restore_error) = restored {
            tracing::warn!(
                path = %destination_path.display(),
                error = %restore_error,
                "failed to restore destination after aborted move"
            );
        }
        return Err(error);
    }
    Ok(())
}

fn check_conflict(
    destination: &SourceUnit,
    symbol: &QualifiedName,
    new_leaf: &str,
) -> Result<(), RefactorError> {
    let defined = top_level_definitions(destination)
        .iter()
        .any(|d| d.name == new_leaf)
        || top_level_assignments(destination).iter().any(|n| n == new_leaf);

    let top_level: Vec<Span> = tree::named_children(destination.root())
        .iter()
        .map(|node| node.byte_range())
        .collect();
    let imported = BindingTable::resolve(destination)
        .bindings()
        .iter()
        .filter(|b| &b.name != symbol && top_level.contains(&b.statement))
        .any(|b| b.local_name() == new_leaf);

    if defined || imported {
        return Err(RefactorError::Conflict(format!(
            "{new_leaf} already exists in {}",
            destination
                .path()
                .map_or_else(|| "destination".to_string(), |p| p.display().to_string())
        )));
    }
    Ok(())
}

/// Start of the comment lines directly attached above `offset`.
fn attached_comments_start(text: &str, offset: usize) -> usize {
    let mut start = line_start(text, offset);
    while start > 0 {
        let prev = line_start(text, start - 1);
        let line = &text[prev..start];
        if line.starts_with('#') && !line.starts_with("#!") {
            start = prev;
        } else {
            break;
        }
    }
    start
}

/// Definition text with its attached comments, renamed to `new_leaf`.
fn extract_fragment(
    origin: &SourceUnit,
    definition: &TopLevelDefinition,
    new_leaf: &str,
) -> Result<String, RefactorError> {
    let start = attached_comments_start(origin.text(), definition.span.start);
    let text = &origin.text()[start..definition.span.end];
    if definition.name == new_leaf {
        return Ok(text.to_string());
    }

    let mut fragment = SourceUnit::parse(text)?;
    let Some(def) = top_level_definitions(&fragment).into_iter().next() else {
        return Err(RefactorError::NotFound(definition.name.clone()));
    };
    let self_references = name_references(&fragment, &def.span, &definition.name);
    fragment.replace(def.name_span, new_leaf)?;
    for span in self_references {
        fragment.replace(span, new_leaf)?;
    }
    Ok(fragment.render())
}

fn is_blank_line(line: &str) -> bool {
    line.trim().is_empty()
}

/// Lines removed with the definition: attached comments, the definition,
/// following blank lines, and preceding blank lines when nothing follows.
fn removal_span(text: &str, definition: &TopLevelDefinition) -> Span {
    let mut start = line_start(text, attached_comments_start(text, definition.span.start));
    let mut end = line_end_inclusive(text, definition.span.end);
    while end < text.len() {
        let next = line_end_inclusive(text, end);
        if !is_blank_line(&text[end..next]) {
            break;
        }
        end = next;
    }
    if end == text.len() {
        while start > 0 {
            let prev = line_start(text, start - 1);
            if !is_blank_line(&text[prev..start]) {
                break;
            }
            start = prev;
        }
    }
    start..end
}

/// Most frequent blank-line run before top-level definitions.
fn infer_separator(unit: &SourceUnit) -> usize {
    let text = unit.text();
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for def in top_level_definitions(unit) {
        let mut at = attached_comments_start(text, def.span.start);
        let mut blanks = 0;
        let mut reached_top = true;
        while at > 0 {
            let prev = line_start(text, at - 1);
            if !is_blank_line(&text[prev..at]) {
                reached_top = false;
                break;
            }
            blanks += 1;
            at = prev;
        }
        if !reached_top {
            *counts.entry(blanks).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(blanks, seen)| (seen, blanks))
        .map_or(DEFAULT_SEPARATOR, |(blanks, _)| blanks)
}

fn trailing_blank_lines(text: &str) -> usize {
    let Some(body) = text.strip_suffix('\n') else {
        return 0;
    };
    body.rsplit('\n')
        .take_while(|line| is_blank_line(line))
        .count()
}

/// Text appended to the destination so the fragment follows its separator style.
/// Text appended to `destination` so that `fragment` follows `text`, the
/// destination as rendered with its pending edits.
fn append_text(destination: &SourceUnit, text: &str, fragment: &str) -> String {
    if text.trim().is_empty() {
        return format!("{fragment}\n");
    }
    let separator = infer_separator(destination);
    let mut out = String::new();
    if !text.ends_with('\n') {
        out.push('\n');
    }
    let missing = separator.saturating_sub(trailing_blank_lines(text));
    out.push_str(&"\n".repeat(missing));
    out.push_str(fragment);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(s: &str) -> QualifiedName {
        s.parse().expect("qualified name")
    }

    fn units(origin: &str, destination: &str) -> (SourceUnit, SourceUnit) {
        (
            SourceUnit::parse_path("pkg/origin.py", origin).expect("origin"),
            SourceUnit::parse_path("pkg/dest.py", destination).expect("destination"),
        )
    }

    #[test]
    fn test_state_machine_happy_path() {
        let (mut origin, mut dest) = units(
            "import os\n\n\ndef keep():\n    pass\n\n\n# Helper.\ndef helper(x):\n    return helper(x - 1) if x else 0\n",
            "\"\"\"Destination.\"\"\"\n\n\ndef other():\n    pass\n",
        );
        let mut mv = DefinitionMove::new(qn("pkg.origin.helper"), qn("pkg.dest.assist"));
        assert!(mv.fan_out().is_none());

        let output = mv.extract(&mut origin, &mut dest).expect("extract");
        assert_eq!(
            output.origin,
            "import os\n\n\ndef keep():\n    pass\n"
        );
        assert_eq!(
            output.destination,
            "\"\"\"Destination.\"\"\"\n\n\ndef other():\n    pass\n\n\n# Helper.\ndef assist(x):\n    return assist(x - 1) if x else 0\n"
        );
        assert!(!output.origin_imports_target);
        assert_eq!(mv.state(), MoveState::Extracted);

        mv.commit(|_| Ok(())).expect("commit");
        assert_eq!(mv.state(), MoveState::Committed);
        assert_eq!(
            mv.fan_out(),
            Some(Transform::ReplaceImport {
                target: qn("pkg.origin.helper"),
                replacement: qn("pkg.dest.assist"),
            })
        );
    }

    #[test]
    fn test_origin_keeps_using_symbol() {
        let (mut origin, mut dest) = units(
            "\"\"\"Doc.\"\"\"\nimport os\n\n\nclass Foo:\n    pass\n\n\ndef make():\n    return Foo()\n",
            "",
        );
        let mut mv = DefinitionMove::new(qn("pkg.origin.Foo"), qn("pkg.dest.Foo"));
        let output = mv.extract(&mut origin, &mut dest).expect("extract");
        assert_eq!(
            output.origin,
            "\"\"\"Doc.\"\"\"\nimport os\nfrom pkg.dest import Foo\n\n\ndef make():\n    return Foo()\n"
        );
        assert_eq!(output.destination, "class Foo:\n    pass\n");
        assert!(output.origin_imports_target);
    }

    #[test]
    fn test_conflict_aborts_without_edits() {
        let (mut origin, mut dest) = units("def f():\n    pass\n", "f = 1\n");
        let mut mv = DefinitionMove::new(qn("pkg.origin.f"), qn("pkg.dest.f"));
        let err = mv.extract(&mut origin, &mut dest).expect_err("conflict");
        assert_eq!(err.kind(), "conflict");
        assert_eq!(mv.state(), MoveState::Aborted);
        assert!(origin.edits().is_empty());
        assert!(mv.fan_out().is_none());
        assert!(mv.commit(|_| Ok(())).is_err());
    }

    #[test]
    fn test_destination_import_of_symbol_is_replaced() {
        let (mut origin, mut dest) = units(
            "def f():\n    pass\n",
            "from pkg.origin import f\n\n\ndef g():\n    return f()\n",
        );
        let mut mv = DefinitionMove::new(qn("pkg.origin.f"), qn("pkg.dest.f"));
        let output = mv.extract(&mut origin, &mut dest).expect("extract");
        assert_eq!(output.origin, "");
        assert_eq!(
            output.destination,
            "def g():\n    return f()\n\n\ndef f():\n    pass\n"
        );
    }

    #[test]
    fn test_destination_alias_of_symbol_is_rebound() {
        let (mut origin, mut dest) = units(
            "def f():\n    pass\n",
            "from pkg.origin import f as g\n\n\ndef h():\n    return g()\n",
        );
        let mut mv = DefinitionMove::new(qn("pkg.origin.f"), qn("pkg.dest.f"));
        let output = mv.extract(&mut origin, &mut dest).expect("extract");
        assert_eq!(
            output.destination,
            "def h():\n    return f()\n\n\ndef f():\n    pass\n"
        );
    }

    #[test]
    fn test_destination_holding_only_the_import() {
        let (mut origin, mut dest) = units("def f():\n    pass\n", "from pkg.origin import f\n\n");
        let mut mv = DefinitionMove::new(qn("pkg.origin.f"), qn("pkg.dest.f"));
        let output = mv.extract(&mut origin, &mut dest).expect("extract");
        assert_eq!(output.destination, "def f():\n    pass\n");
    }

    #[test]
    fn test_missing_definition_and_same_module() {
        let (mut origin, mut dest) = units("x = 1\n", "");
        let mut mv = DefinitionMove::new(qn("pkg.origin.f"), qn("pkg.dest.f"));
        let err = mv.extract(&mut origin, &mut dest).expect_err("missing");
        assert_eq!(err.kind(), "not_found");

        let mv = DefinitionMove::new(qn("pkg.origin.f"), qn("pkg.origin.g"));
        assert_eq!(mv.modules().expect_err("same").kind(), "conflict");
    }

    #[test]
    fn test_commit_failure_aborts() {
        let (mut origin, mut dest) = units("def f():\n    pass\n", "");
        let mut mv = DefinitionMove::new(qn("pkg.origin.f"), qn("pkg.dest.f"));
        mv.extract(&mut origin, &mut dest).expect("extract");
        let err = mv
            .commit(|_| Err(RefactorError::Io("disk full".into())))
            .expect_err("io");
        assert_eq!(err.kind(), "io");
        assert_eq!(mv.state(), MoveState::Aborted);
        assert_eq!(mv.error().map(RefactorError::kind), Some("io"));
    }

    #[test]
    fn test_removal_collapses_blank_lines() {
        let text = "a = 1\n\n\ndef f():\n    pass\n\n\nb = 2\n";
        let unit = SourceUnit::parse(text).expect("parse");
        let def = top_level_definitions(&unit).remove(0);
        let span = removal_span(text, &def);
        let mut out = text.to_string();
        out.replace_range(span, "");
        assert_eq!(out, "a = 1\n\n\nb = 2\n");
    }

    #[test]
    fn test_infer_separator() {
        let one = SourceUnit::parse("import os\n\ndef a():\n    pass\n\ndef b():\n    pass\n")
            .expect("parse");
        assert_eq!(infer_separator(&one), 1);
        let none = SourceUnit::parse("x = 1\n").expect("parse");
        assert_eq!(infer_separator(&none), DEFAULT_SEPARATOR);
    }
}
