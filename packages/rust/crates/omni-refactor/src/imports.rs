//! Import rewriting.
//!
//! Rewrites the import statements that bind a qualified name together with
//! every reference site bound to them, and removes or adds single-symbol
//! imports for the definition mover. All changes are recorded as span edits
//! on the [`SourceUnit`], so untouched bytes render verbatim.

use std::collections::BTreeMap;

use omni_cst::{
    BindingTable, ImportBinding, ImportShape, Node, QualifiedName, SourceUnit, Span, indentation,
    is_blank, line_end_inclusive, line_start, tree,
};

use crate::error::RefactorError;

const IMPORT_KINDS: [&str; 3] = [
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

/// Point every import binding of `target` (and its references) at `replacement`.
///
/// Returns `Ok(false)` when the unit has no binding for `target`; absence is
/// the common case in a directory sweep and not an error. Aliases are kept,
/// so aliased references stay untouched.
///
/// # Errors
/// `InvalidName` when a `from` import would need a replacement without a
/// module path; edits are only recorded once that check has passed.
pub fn replace_import(
    unit: &mut SourceUnit,
    target: &QualifiedName,
    replacement: &QualifiedName,
) -> Result<bool, RefactorError> {
    if target == replacement {
        return Ok(false);
    }
    let table = BindingTable::resolve(unit);
    let groups = group_by_statement(&table, target);
    if groups.is_empty() {
        return Ok(false);
    }
    let needs_module = groups
        .values()
        .flatten()
        .any(|&i| table.bindings()[i].is_from_import());
    if needs_module && replacement.module().is_none() {
        return Err(RefactorError::InvalidName(format!(
            "{replacement} has no module path to import from"
        )));
    }

    for indices in groups.values() {
        rewrite_statement(unit, &table, indices, replacement)?;
        for &idx in indices {
            rewrite_references(unit, &table, idx, replacement)?;
        }
    }
    tracing::debug!(
        path = ?unit.path(),
        %target,
        %replacement,
        statements = groups.len(),
        "rewrote import"
    );
    Ok(true)
}

/// Remove every import binding of `name`, returning how many were removed.
///
/// A statement left without bindings is deleted with its line, or replaced
/// by `pass` when it is the only statement of its block.
///
/// # Errors
/// Returns `RefactorError::Parse` when an edit conflicts with one already
/// recorded on the unit.
pub fn remove_import(unit: &mut SourceUnit, name: &QualifiedName) -> Result<usize, RefactorError> {
    let table = BindingTable::resolve(unit);
    let groups = group_by_statement(&table, name);
    let mut removed = 0;
    for indices in groups.values() {
        let first = &table.bindings()[indices[0]];
        if indices.len() == first.statement_bindings {
            remove_statement(unit, &first.statement)?;
        } else {
            remove_elements(unit, &table, indices)?;
        }
        removed += indices.len();
    }
    Ok(removed)
}

/// Add `from <module> import <leaf>` after the unit's last top-level import.
///
/// Without imports the statement goes after the module docstring, or before
/// the first statement. Returns `Ok(false)` when the binding already exists.
///
/// # Errors
/// Returns `RefactorError::InvalidName` when `leaf` is not an identifier.
pub fn add_import(
    unit: &mut SourceUnit,
    module: &QualifiedName,
    leaf: &str,
) -> Result<bool, RefactorError> {
    let name = module.join(leaf)?;
    let table = BindingTable::resolve(unit);
    if table.find(&name).next().is_some() {
        return Ok(false);
    }

    let line = format!("from {module} import {leaf}\n");
    let (at, insertion) = {
        let statements: Vec<Node<'_>> = tree::named_children(unit.root())
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .collect();
        let anchor = statements
            .iter()
            .rev()
            .find(|n| IMPORT_KINDS.contains(&n.kind()))
            .or_else(|| statements.first().filter(|n| tree::is_docstring(**n)))
            .map(Node::end_byte);
        let first = statements.first().map(Node::start_byte);

        let text = unit.text();
        match (anchor, first) {
            (Some(end), _) => {
                let at = line_end_inclusive(text, end);
                let prefix = if text[..at].ends_with('\n') { "" } else { "\n" };
                (at, format!("{prefix}{line}"))
            }
            (None, Some(start)) => (line_start(text, start), line),
            (None, None) => {
                let prefix = if text.is_empty() || text.ends_with('\n') {
                    ""
                } else {
                    "\n"
                };
                (text.len(), format!("{prefix}{line}"))
            }
        }
    };
    unit.insert(at, insertion)?;
    Ok(true)
}

fn group_by_statement(table: &BindingTable, name: &QualifiedName) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for idx in table.find(name) {
        groups
            .entry(table.bindings()[idx].statement.start)
            .or_default()
            .push(idx);
    }
    groups
}

fn replace_if_changed(unit: &mut SourceUnit, span: Span, text: &str) -> Result<(), RefactorError> {
    if unit.span_text(&span) != text {
        unit.replace(span, text)?;
    }
    Ok(())
}

fn rewrite_statement(
    unit: &mut SourceUnit,
    table: &BindingTable,
    indices: &[usize],
    replacement: &QualifiedName,
) -> Result<(), RefactorError> {
    let first = &table.bindings()[indices[0]];
    if first.shape == ImportShape::Plain {
        for &idx in indices {
            let span = table.bindings()[idx].name_span.clone();
            replace_if_changed(unit, span, &replacement.to_string())?;
        }
        return Ok(());
    }

    let Some(new_module) = replacement.module() else {
        return Err(RefactorError::InvalidName(replacement.to_string()));
    };
    let leaf = replacement.leaf();
    if first.name.module().as_ref() == Some(&new_module) {
        for &idx in indices {
            replace_if_changed(unit, table.bindings()[idx].name_span.clone(), leaf)?;
        }
    } else if indices.len() == first.statement_bindings {
        if let Some(span) = first.module_span.clone() {
            replace_if_changed(unit, span, &new_module.to_string())?;
        }
        for &idx in indices {
            replace_if_changed(unit, table.bindings()[idx].name_span.clone(), leaf)?;
        }
    } else {
        // Other names stay with the old module; the target moves to its own statement.
        remove_elements(unit, table, indices)?;
        let text = unit.text();
        let statement = &first.statement;
        let own_line = is_blank(text, line_start(text, statement.start), statement.start)
            && rest_of_line_is_trivia(text, statement.end);
        let imports = indices.iter().map(|&idx| {
            let alias = table.bindings()[idx]
                .alias
                .as_ref()
                .map(|a| format!(" as {a}"))
                .unwrap_or_default();
            format!("from {new_module} import {leaf}{alias}")
        });
        if own_line {
            let indent = indentation(text, statement.start).to_string();
            let at = line_end_inclusive(text, statement.end);
            let mut insertion = String::new();
            if !text[..at].ends_with('\n') {
                insertion.push('\n');
            }
            for import in imports {
                insertion.push_str(&format!("{indent}{import}\n"));
            }
            unit.insert(at, insertion)?;
        } else {
            // Compound line: chain onto the same simple-statement list.
            let insertion: String = imports.map(|import| format!("; {import}")).collect();
            unit.insert(statement.end, insertion)?;
        }
    }
    Ok(())
}

fn rewrite_references(
    unit: &mut SourceUnit,
    table: &BindingTable,
    idx: usize,
    replacement: &QualifiedName,
) -> Result<(), RefactorError> {
    let binding = &table.bindings()[idx];
    if binding.alias.is_some() {
        return Ok(());
    }
    let new_local = match binding.shape {
        ImportShape::Plain => replacement.to_string(),
        _ => replacement.leaf().to_string(),
    };
    if new_local == binding.local_name() {
        return Ok(());
    }
    for site in table.references_to(idx) {
        unit.replace(site.span.clone(), new_local.as_str())?;
    }
    Ok(())
}

/// Delete the elements at `indices` from their shared statement, leaving the
/// other names byte-identical.
fn remove_elements(
    unit: &mut SourceUnit,
    table: &BindingTable,
    indices: &[usize],
) -> Result<(), RefactorError> {
    let first: &ImportBinding = &table.bindings()[indices[0]];
    let siblings: Vec<(usize, Span)> = table
        .bindings()
        .iter()
        .enumerate()
        .filter(|(_, b)| b.statement == first.statement)
        .map(|(i, b)| (i, b.element_span.clone()))
        .collect();
    let removed: Vec<bool> = siblings.iter().map(|(i, _)| indices.contains(i)).collect();
    let parenthesized = first.shape == ImportShape::Parenthesized;

    let mut spans = Vec::new();
    let mut pos = 0;
    while pos < siblings.len() {
        if !removed[pos] {
            pos += 1;
            continue;
        }
        let run_start = pos;
        while pos < siblings.len() && removed[pos] {
            pos += 1;
        }
        let run = &siblings[run_start..pos];
        let text = unit.text();

        let own_lines: Option<Vec<Span>> = if parenthesized {
            run.iter().map(|(_, span)| own_line_span(text, span)).collect()
        } else {
            None
        };
        if let Some(lines) = own_lines {
            spans.extend(lines);
        } else if pos < siblings.len() {
            spans.push(run[0].1.start..siblings[pos].1.start);
        } else if run_start > 0 {
            spans.push(siblings[run_start - 1].1.end..run[run.len() - 1].1.end);
        }
    }

    for span in spans {
        unit.delete(span)?;
    }
    Ok(())
}

/// Whole-line span of an element that sits alone on its line inside a
/// parenthesized group (trailing comma and comment included).
fn own_line_span(text: &str, element: &Span) -> Option<Span> {
    let start = line_start(text, element.start);
    if !is_blank(text, start, element.start) {
        return None;
    }
    let rest = text[element.end..].trim_start_matches([' ', '\t']);
    let rest = rest.strip_prefix(',').unwrap_or(rest);
    let rest = rest.trim_start_matches([' ', '\t', '\r']);
    let tail_ok = rest.is_empty() || rest.starts_with('\n') || rest.starts_with('#');
    tail_ok.then(|| start..line_end_inclusive(text, element.end))
}

/// True when only whitespace or a comment follows `at` on its line.
fn rest_of_line_is_trivia(text: &str, at: usize) -> bool {
    let rest = text[at..].trim_start_matches([' ', '\t', '\r']);
    rest.is_empty() || rest.starts_with('\n') || rest.starts_with('#')
}

fn statement_node<'t>(unit: &'t SourceUnit, span: &Span) -> Option<Node<'t>> {
    let mut node = unit.root().descendant_for_byte_range(span.start, span.end)?;
    loop {
        if node.byte_range() == *span && IMPORT_KINDS.contains(&node.kind()) {
            return Some(node);
        }
        node = node.parent()?;
    }
}

fn remove_statement(unit: &mut SourceUnit, span: &Span) -> Result<(), RefactorError> {
    let sole_in_block = statement_node(unit, span)
        .and_then(|n| n.parent())
        .is_some_and(|p| {
            p.kind() == "block"
                && tree::named_children(p)
                    .iter()
                    .filter(|c| c.kind() != "comment")
                    .count()
                    == 1
        });
    if sole_in_block {
        unit.replace(span.clone(), "pass")?;
        return Ok(());
    }

    let text = unit.text();
    let start = line_start(text, span.start);
    let mut end = line_end_inclusive(text, span.end);
    let tail = text[span.end..end].trim();
    if is_blank(text, start, span.start) && (tail.is_empty() || tail.starts_with('#')) {
        // A leading statement takes the blank lines below it along.
        if text[..start].trim().is_empty() {
            while end < text.len() {
                let next = line_end_inclusive(text, end);
                if !text[end..next].trim().is_empty() {
                    break;
                }
                end = next;
            }
        }
        unit.delete(start..end)?;
        return Ok(());
    }

    // Shares its line with other statements: drop it and its `;` separator.
    let after = &text[span.end..end];
    let trimmed = after.trim_start_matches([' ', '\t']);
    let stop = match trimmed.strip_prefix(';') {
        Some(rest) => end - rest.trim_start_matches([' ', '\t']).len(),
        None => span.end,
    };
    unit.delete(span.start..stop)?;
    Ok(())
}
