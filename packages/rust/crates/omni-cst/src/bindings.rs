//! Import bindings and the reference sites bound to them.
//!
//! Resolution is lexical: a reference binds to an import when its text equals
//! the import's local name and the import's scope is visible from the site.
//! Local variables that shadow an imported name are indistinguishable from
//! genuine references.

use std::collections::HashMap;

use serde::Serialize;
use tree_sitter::Node;

use crate::edit::Span;
use crate::name::QualifiedName;
use crate::python::{children, dotted_text, is_field_of_parent, named_children};
use crate::unit::SourceUnit;

/// Surface form of the statement that introduced a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportShape {
    /// `import a.b.c` (possibly several comma-separated paths).
    Plain,
    /// `from a.b import C`
    Simple,
    /// `from a.b import C, D` on one line.
    Grouped,
    /// `from a.b import (C, D)`, usually spanning lines.
    Parenthesized,
}

/// One local name introduced by an import statement.
#[derive(Debug, Clone, Serialize)]
pub struct ImportBinding {
    /// Qualified name the binding denotes.
    pub name: QualifiedName,
    /// Local alias from `as alias`.
    pub alias: Option<String>,
    /// Surface form of the enclosing statement.
    pub shape: ImportShape,
    /// Span of the enclosing statement.
    pub statement: Span,
    /// Span of the module path in a `from` import.
    pub module_span: Option<Span>,
    /// Span of the imported path token (`dotted_name`).
    pub name_span: Span,
    /// Span of the whole element, alias included.
    pub element_span: Span,
    /// Number of bindings the enclosing statement introduces.
    pub statement_bindings: usize,
}

impl ImportBinding {
    /// Name the binding introduces in the unit's namespace.
    ///
    /// Alias when present, the leaf for `from` imports, the full dotted path
    /// for plain imports.
    #[must_use]
    pub fn local_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match self.shape {
            ImportShape::Plain => self.name.to_string(),
            _ => self.name.leaf().to_string(),
        }
    }

    /// True when this is a `from ... import` binding.
    #[must_use]
    pub fn is_from_import(&self) -> bool {
        self.shape != ImportShape::Plain
    }
}

/// How a reference site appears syntactically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A bare identifier (`x = Foo`).
    Identifier,
    /// Head of a dotted attribute chain (`Foo.bar`).
    AttributeChain,
    /// Callee of a call expression (`Foo()`).
    Callee,
}

/// A location whose text is a binding's local name.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceSite {
    /// Span of the local-name text.
    pub span: Span,
    /// Syntactic role.
    pub kind: ReferenceKind,
    /// Index of the bound [`ImportBinding`] in its [`BindingTable`].
    pub binding: usize,
}

/// Bindings of one unit with their reference sites.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BindingTable {
    bindings: Vec<ImportBinding>,
    references: Vec<ReferenceSite>,
}

impl BindingTable {
    /// Discover every import binding and reference site in `unit`.
    #[must_use]
    pub fn resolve(unit: &SourceUnit) -> Self {
        let mut bindings = Vec::new();
        collect_imports(unit, unit.root(), &mut bindings);

        let mut by_local: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, binding) in bindings.iter().enumerate() {
            by_local.entry(binding.local_name()).or_default().push(idx);
        }

        let mut references = Vec::new();
        if !by_local.is_empty() {
            let scopes = bindings
                .iter()
                .map(|b| {
                    unit.root()
                        .descendant_for_byte_range(b.statement.start, b.statement.end)
                        .and_then(enclosing_scope)
                })
                .collect();
            let resolver = Resolver {
                unit,
                bindings: &bindings,
                scopes,
                by_local: &by_local,
            };
            resolver.walk(unit.root(), &mut references);
        }

        Self {
            bindings,
            references,
        }
    }

    /// All bindings in statement order.
    #[must_use]
    pub fn bindings(&self) -> &[ImportBinding] {
        &self.bindings
    }

    /// All reference sites in source order.
    #[must_use]
    pub fn references(&self) -> &[ReferenceSite] {
        &self.references
    }

    /// Indexes of bindings that denote `name`.
    pub fn find<'a>(&'a self, name: &'a QualifiedName) -> impl Iterator<Item = usize> + 'a {
        self.bindings
            .iter()
            .enumerate()
            .filter(move |(_, b)| &b.name == name)
            .map(|(i, _)| i)
    }

    /// Reference sites bound to the binding at `index`.
    pub fn references_to(&self, index: usize) -> impl Iterator<Item = &ReferenceSite> {
        self.references.iter().filter(move |r| r.binding == index)
    }

    /// True when any binding introduces `local` into the namespace.
    #[must_use]
    pub fn binds_local(&self, local: &str) -> bool {
        self.bindings.iter().any(|b| b.local_name() == local)
    }
}

fn collect_imports(unit: &SourceUnit, node: Node<'_>, out: &mut Vec<ImportBinding>) {
    match node.kind() {
        "import_statement" => collect_plain(unit, node, out),
        "import_from_statement" => collect_from(unit, node, out),
        // `from __future__ import x` never denotes a movable symbol.
        "future_import_statement" => {}
        _ => {
            for child in named_children(node) {
                collect_imports(unit, child, out);
            }
        }
    }
}

/// Split an import element into its path node and optional alias.
fn element_parts<'t>(unit: &SourceUnit, element: Node<'t>) -> Option<(Node<'t>, Option<String>)> {
    match element.kind() {
        "dotted_name" => Some((element, None)),
        "aliased_import" => {
            let path = element.child_by_field_name("name")?;
            let alias = element
                .child_by_field_name("alias")
                .map(|a| unit.node_text(a).to_string());
            Some((path, alias))
        }
        _ => None,
    }
}

fn import_elements<'t>(statement: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = statement.walk();
    let elements: Vec<Node<'t>> = statement
        .children_by_field_name("name", &mut cursor)
        .collect();
    elements
}

fn collect_plain(unit: &SourceUnit, statement: Node<'_>, out: &mut Vec<ImportBinding>) {
    let elements = import_elements(statement);
    let count = elements.len();
    for element in elements {
        let Some((path, alias)) = element_parts(unit, element) else {
            continue;
        };
        let Some(name) = dotted_text(unit, path).and_then(|t| t.parse().ok()) else {
            continue;
        };
        out.push(ImportBinding {
            name,
            alias,
            shape: ImportShape::Plain,
            statement: statement.byte_range(),
            module_span: None,
            name_span: path.byte_range(),
            element_span: element.byte_range(),
            statement_bindings: count,
        });
    }
}

fn collect_from(unit: &SourceUnit, statement: Node<'_>, out: &mut Vec<ImportBinding>) {
    let Some(module) = statement.child_by_field_name("module_name") else {
        return;
    };
    // Relative imports carry no absolute module path.
    if module.kind() != "dotted_name" {
        return;
    }
    let Some(module_name) = dotted_text(unit, module).and_then(|t| t.parse::<QualifiedName>().ok())
    else {
        return;
    };

    let elements = import_elements(statement);
    let count = elements.len();
    let parenthesized = children(statement).iter().any(|c| c.kind() == "(");
    let shape = match (parenthesized, count) {
        (true, _) => ImportShape::Parenthesized,
        (false, 1) => ImportShape::Simple,
        (false, _) => ImportShape::Grouped,
    };

    for element in elements {
        let Some((path, alias)) = element_parts(unit, element) else {
            continue;
        };
        let Some(leaf) = dotted_text(unit, path) else {
            continue;
        };
        let Ok(name) = module_name.join(&leaf) else {
            continue;
        };
        out.push(ImportBinding {
            name,
            alias,
            shape,
            statement: statement.byte_range(),
            module_span: Some(module.byte_range()),
            name_span: path.byte_range(),
            element_span: element.byte_range(),
            statement_bindings: count,
        });
    }
}

/// Body of a function or class; `None` stands for module level.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    body: Span,
    class: bool,
}

/// Innermost function or class body that contains `node`.
///
/// Decorators, parameters and the definition name belong to the outer scope.
fn enclosing_scope(node: Node<'_>) -> Option<Scope> {
    let at = node.start_byte();
    let mut current = node.parent();
    while let Some(parent) = current {
        let class = match parent.kind() {
            "function_definition" => false,
            "class_definition" => true,
            _ => {
                current = parent.parent();
                continue;
            }
        };
        if let Some(body) = parent.child_by_field_name("body")
            && body.start_byte() <= at
            && at < body.end_byte()
        {
            return Some(Scope {
                body: body.byte_range(),
                class,
            });
        }
        current = parent.parent();
    }
    None
}

struct Resolver<'a> {
    unit: &'a SourceUnit,
    bindings: &'a [ImportBinding],
    scopes: Vec<Option<Scope>>,
    by_local: &'a HashMap<String, Vec<usize>>,
}

impl Resolver<'_> {
    fn walk(&self, node: Node<'_>, out: &mut Vec<ReferenceSite>) {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => return,
            "identifier" => {
                if !is_excluded_identifier(node) {
                    self.record(node, self.unit.node_text(node), out);
                }
                return;
            }
            "attribute" => {
                // The longest dotted chain that names a binding wins.
                if let Some(text) = dotted_text(self.unit, node)
                    && self.by_local.contains_key(&text)
                {
                    self.record(node, &text, out);
                    return;
                }
            }
            _ => {}
        }
        for child in named_children(node) {
            self.walk(child, out);
        }
    }

    fn record(&self, node: Node<'_>, text: &str, out: &mut Vec<ReferenceSite>) {
        let Some(candidates) = self.by_local.get(text) else {
            return;
        };
        let start = node.start_byte();
        let site = enclosing_scope(node);
        // Class bodies are only visible to code directly inside them.
        let visible = |scope: &Option<Scope>| match scope {
            None => true,
            Some(s) => s.body.contains(&start) && (!s.class || site.as_ref() == Some(s)),
        };
        let Some(innermost) = candidates
            .iter()
            .map(|&i| &self.scopes[i])
            .filter(|&scope| visible(scope))
            .max_by_key(|scope| scope.as_ref().map(|s| s.body.start))
        else {
            return;
        };
        let in_scope: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| &self.scopes[i] == innermost)
            .collect();
        // Nearest preceding binding, or the first one when the site precedes all.
        let Some(binding) = in_scope
            .iter()
            .rev()
            .find(|&&i| self.bindings[i].statement.end <= start)
            .or_else(|| in_scope.first())
            .copied()
        else {
            return;
        };
        out.push(ReferenceSite {
            span: node.byte_range(),
            kind: classify(node),
            binding,
        });
    }
}

fn is_excluded_identifier(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "attribute" => is_field_of_parent(node, "attribute"),
        "keyword_argument" => is_field_of_parent(node, "name"),
        "function_definition" | "class_definition" => is_field_of_parent(node, "name"),
        _ => false,
    }
}

fn classify(node: Node<'_>) -> ReferenceKind {
    match node.parent() {
        Some(p) if p.kind() == "call" && is_field_of_parent(node, "function") => {
            ReferenceKind::Callee
        }
        Some(p) if p.kind() == "attribute" && is_field_of_parent(node, "object") => {
            ReferenceKind::AttributeChain
        }
        _ => ReferenceKind::Identifier,
    }
}

/// Lexical references to `name` inside `within`, excluding attribute names,
/// keyword names, definition names and import statements.
#[must_use]
pub fn name_references(unit: &SourceUnit, within: &Span, name: &str) -> Vec<Span> {
    let mut found = Vec::new();
    let mut stack = vec![unit.root()];
    while let Some(node) = stack.pop() {
        if node.end_byte() <= within.start || node.start_byte() >= within.end {
            continue;
        }
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {}
            "identifier" => {
                if unit.node_text(node) == name
                    && !is_excluded_identifier(node)
                    && within.start <= node.start_byte()
                    && node.end_byte() <= within.end
                {
                    found.push(node.byte_range());
                }
            }
            _ => stack.extend(named_children(node).into_iter().rev()),
        }
    }
    found
}
