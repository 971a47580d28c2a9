//! Python-specific tree helpers.
//!
//! Node kinds follow the `tree-sitter-python` grammar.

use tree_sitter::Node;

use crate::edit::Span;
use crate::unit::SourceUnit;

/// Kind of a top-level definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    /// `def` / `async def`
    Function,
    /// `class`
    Class,
}

/// A top-level `def` or `class`, decorators included.
#[derive(Debug, Clone)]
pub struct TopLevelDefinition {
    /// Defined name.
    pub name: String,
    /// Function or class.
    pub kind: DefinitionKind,
    /// Span of the statement, decorators included.
    pub span: Span,
    /// Span of the name token.
    pub name_span: Span,
}

/// Named children of `node`, comments included.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    nodes
}

/// All children of `node`, anonymous tokens included.
pub fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes: Vec<Node<'t>> = node.children(&mut cursor).collect();
    nodes
}

/// True when `node` is the child stored under `field` of its parent.
pub(crate) fn is_field_of_parent(node: Node<'_>, field: &str) -> bool {
    node.parent()
        .and_then(|p| p.child_by_field_name(field))
        .is_some_and(|c| c.id() == node.id())
}

/// Dotted text of an identifier-rooted attribute chain (`a.b.c`), `None` for
/// any other expression.
#[must_use]
pub fn dotted_text(unit: &SourceUnit, node: Node<'_>) -> Option<String> {
    match node.kind() {
        "identifier" => Some(unit.node_text(node).to_string()),
        "attribute" => {
            let object = node.child_by_field_name("object")?;
            let attr = node.child_by_field_name("attribute")?;
            let head = dotted_text(unit, object)?;
            Some(format!("{head}.{}", unit.node_text(attr)))
        }
        "dotted_name" => Some(
            named_children(node)
                .into_iter()
                .filter(|c| c.kind() == "identifier")
                .map(|c| unit.node_text(c))
                .collect::<Vec<_>>()
                .join("."),
        ),
        _ => None,
    }
}

/// The `function_definition`/`class_definition` behind a possibly decorated statement.
fn inner_definition(node: Node<'_>) -> Option<(Node<'_>, DefinitionKind)> {
    match node.kind() {
        "function_definition" => Some((node, DefinitionKind::Function)),
        "class_definition" => Some((node, DefinitionKind::Class)),
        "decorated_definition" => inner_definition(node.child_by_field_name("definition")?),
        _ => None,
    }
}

/// Every top-level function and class definition, in source order.
#[must_use]
pub fn top_level_definitions(unit: &SourceUnit) -> Vec<TopLevelDefinition> {
    named_children(unit.root())
        .into_iter()
        .filter_map(|stmt| {
            let (def, kind) = inner_definition(stmt)?;
            let name = def.child_by_field_name("name")?;
            Some(TopLevelDefinition {
                name: unit.node_text(name).to_string(),
                kind,
                span: stmt.byte_range(),
                name_span: name.byte_range(),
            })
        })
        .collect()
}

/// Names assigned at module level by plain `Name = ...` statements.
#[must_use]
pub fn top_level_assignments(unit: &SourceUnit) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in named_children(unit.root()) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        for expr in named_children(stmt) {
            let mut current = Some(expr);
            while let Some(node) = current {
                if !matches!(node.kind(), "assignment" | "augmented_assignment") {
                    break;
                }
                if let Some(left) = node.child_by_field_name("left")
                    && left.kind() == "identifier"
                {
                    names.push(unit.node_text(left).to_string());
                }
                // Chained `a = b = 1` nests the next assignment on the right.
                current = node.child_by_field_name("right");
            }
        }
    }
    names
}

/// True for a module docstring statement (a lone string expression).
pub fn is_docstring(node: Node<'_>) -> bool {
    node.kind() == "expression_statement"
        && named_children(node)
            .first()
            .is_some_and(|c| matches!(c.kind(), "string" | "concatenated_string"))
}

/// Offset of the first byte of the line containing `offset`.
#[must_use]
pub fn line_start(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())]
        .rfind('\n')
        .map_or(0, |i| i + 1)
}

/// Offset just past the newline ending the line containing `offset`
/// (or the end of text).
#[must_use]
pub fn line_end_inclusive(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text[offset..].find('\n').map_or(text.len(), |i| offset + i + 1)
}

/// Leading whitespace of the line containing `offset`.
#[must_use]
pub fn indentation(text: &str, offset: usize) -> &str {
    let start = line_start(text, offset);
    let line = &text[start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// True when only spaces/tabs sit between `from` and `to`.
#[must_use]
pub fn is_blank(text: &str, from: usize, to: usize) -> bool {
    text.get(from..to)
        .is_some_and(|s| s.chars().all(|c| c == ' ' || c == '\t'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_definitions() {
        let unit = SourceUnit::parse(
            "@dataclass\nclass A:\n    pass\n\nasync def f():\n    def inner():\n        pass\n",
        )
        .expect("parse");
        let defs = top_level_definitions(&unit);
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["A", "f"]);
        assert_eq!(defs[0].kind, DefinitionKind::Class);
        assert_eq!(defs[0].span.start, 0);
    }

    #[test]
    fn test_top_level_assignments() {
        let unit = SourceUnit::parse("A = 1\nB = C = 2\nx.y = 3\n").expect("parse");
        assert_eq!(top_level_assignments(&unit), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_line_helpers() {
        let text = "a\n    b = 1\nc";
        assert_eq!(line_start(text, 8), 2);
        assert_eq!(line_end_inclusive(text, 8), 12);
        assert_eq!(indentation(text, 8), "    ");
        assert_eq!(line_end_inclusive(text, 12), 13);
    }
}
