//! Call-site rewriting.
//!
//! Matching is purely syntactic: a call matches when its callee's dotted
//! segments equal the pattern path, optionally behind any receiver (`*.`),
//! and optionally only when its arguments equal a literal shape.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use omni_cst::{Node, SourceUnit, Span, is_identifier, tree};
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::RefactorError;
use crate::types::{AmbiguousSite, ambiguous_site};

#[allow(clippy::expect_used)]
static CALLABLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*(\*\s*\.)?\s*([A-Za-z_][A-Za-z0-9_]*(?:\s*\.\s*[A-Za-z_][A-Za-z0-9_]*)*)\s*(?:\((.*)\))?\s*$")
        .expect("Failed to compile callable pattern")
});

/// A callee pattern: `[*.]seg(.seg)*[(arg, ...)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableName {
    wildcard: bool,
    path: Vec<String>,
    arguments: Option<Vec<String>>,
}

impl CallableName {
    /// True when any receiver may precede the path (`*.method`).
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Dotted callee segments.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Literal argument shape, if one was given.
    #[must_use]
    pub fn arguments(&self) -> Option<&[String]> {
        self.arguments.as_deref()
    }
}

impl FromStr for CallableName {
    type Err = RefactorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = CALLABLE_PATTERN
            .captures(s)
            .ok_or_else(|| RefactorError::InvalidPattern(s.to_string()))?;
        let path: Vec<String> = caps
            .get(2)
            .map(|m| m.as_str().split('.').map(|p| p.trim().to_string()).collect())
            .unwrap_or_default();
        if path.is_empty() || !path.iter().all(|p| is_identifier(p)) {
            return Err(RefactorError::InvalidPattern(s.to_string()));
        }
        let arguments = match caps.get(3) {
            Some(inner) => Some(split_arguments(inner.as_str()).ok_or_else(|| {
                RefactorError::InvalidPattern(format!("unbalanced arguments in {s:?}"))
            })?),
            None => None,
        };
        Ok(Self {
            wildcard: caps.get(1).is_some(),
            path,
            arguments,
        })
    }
}

impl fmt::Display for CallableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            f.write_str("*.")?;
        }
        f.write_str(&self.path.join("."))?;
        if let Some(args) = &self.arguments {
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

impl Serialize for CallableName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of rewriting one unit's calls.
#[derive(Debug, Clone, Default)]
pub struct CallRewrite {
    /// Call sites rewritten.
    pub rewritten: usize,
    /// Matching call sites left untouched.
    pub ambiguous: Vec<AmbiguousSite>,
}

/// Matched call collected before any edit is recorded.
struct CallSite {
    call: Span,
    segments: Vec<Span>,
    arguments: Option<(Span, Vec<Span>)>,
}

/// Rewrite every call in `unit` matching `old` to use `new`.
///
/// Sites whose arguments cannot be mapped without a guess (a new argument
/// shape with no old one) are reported in [`CallRewrite::ambiguous`] and left
/// untouched; the remaining sites are still rewritten.
///
/// # Errors
/// `InvalidPattern` when `new` has a receiver wildcard that `old` lacks.
pub fn replace_call(
    unit: &mut SourceUnit,
    old: &CallableName,
    new: &CallableName,
) -> Result<CallRewrite, RefactorError> {
    if new.wildcard && !old.wildcard {
        return Err(RefactorError::InvalidPattern(format!(
            "{new} adds a receiver wildcard missing from {old}"
        )));
    }

    let mut sites = Vec::new();
    collect_calls(unit, unit.root(), old, &mut sites);

    let mut outcome = CallRewrite::default();
    for site in sites {
        if new.arguments.is_some() && old.arguments.is_none() {
            outcome.ambiguous.push(ambiguous_site(unit.text(), site.call.clone()));
            continue;
        }
        rewrite_callee(unit, &site, new)?;
        if let (Some(old_shape), Some(new_shape), Some((list, args))) =
            (&old.arguments, &new.arguments, &site.arguments)
        {
            remap_arguments(unit, old_shape, new_shape, list, args)?;
        }
        outcome.rewritten += 1;
    }

    tracing::debug!(
        path = ?unit.path(),
        pattern = %old,
        rewritten = outcome.rewritten,
        ambiguous = outcome.ambiguous.len(),
        "rewrote calls"
    );
    Ok(outcome)
}

/// Post-order walk so nested calls come before the calls enclosing them.
fn collect_calls(unit: &SourceUnit, node: Node<'_>, old: &CallableName, out: &mut Vec<CallSite>) {
    for child in tree::named_children(node) {
        collect_calls(unit, child, old, out);
    }
    if node.kind() == "call"
        && let Some(site) = match_call(unit, node, old)
    {
        out.push(site);
    }
}

fn match_call(unit: &SourceUnit, call: Node<'_>, old: &CallableName) -> Option<CallSite> {
    let function = call.child_by_field_name("function")?;
    let segments = match_callee(unit, function, old)?;

    let arguments = call
        .child_by_field_name("arguments")
        .filter(|a| a.kind() == "argument_list")
        .map(|list| {
            let args: Vec<Span> = tree::named_children(list)
                .into_iter()
                .filter(|c| c.kind() != "comment")
                .map(|c| c.byte_range())
                .collect();
            (list.byte_range(), args)
        });

    if let Some(shape) = &old.arguments {
        let (_, args) = arguments.as_ref()?;
        if args.len() != shape.len() {
            return None;
        }
        let equal = args
            .iter()
            .zip(shape)
            .all(|(span, expected)| normalize(unit.span_text(span)) == normalize(expected));
        if !equal {
            return None;
        }
    }

    Some(CallSite {
        call: call.byte_range(),
        segments,
        arguments,
    })
}

/// Spans of the callee tokens matching `old`'s path, or `None`.
fn match_callee(unit: &SourceUnit, function: Node<'_>, old: &CallableName) -> Option<Vec<Span>> {
    let mut names = Vec::new();
    let mut current = function;
    while current.kind() == "attribute" {
        names.push(current.child_by_field_name("attribute")?);
        current = current.child_by_field_name("object")?;
    }
    names.reverse();

    let k = old.path.len();
    let candidates: Vec<Node<'_>> = if old.wildcard {
        if names.len() < k {
            return None;
        }
        names[names.len() - k..].to_vec()
    } else {
        if current.kind() != "identifier" || names.len() + 1 != k {
            return None;
        }
        std::iter::once(current).chain(names).collect()
    };

    let matches = candidates
        .iter()
        .zip(&old.path)
        .all(|(node, seg)| unit.node_text(*node) == seg.as_str());
    matches.then(|| candidates.iter().map(Node::byte_range).collect())
}

fn rewrite_callee(
    unit: &mut SourceUnit,
    site: &CallSite,
    new: &CallableName,
) -> Result<(), RefactorError> {
    if site.segments.len() == new.path.len() {
        for (span, segment) in site.segments.iter().zip(&new.path) {
            if unit.span_text(span) != segment.as_str() {
                unit.replace(span.clone(), segment.as_str())?;
            }
        }
        return Ok(());
    }
    let (Some(first), Some(last)) = (site.segments.first(), site.segments.last()) else {
        return Ok(());
    };
    unit.replace(first.start..last.end, new.path.join("."))?;
    Ok(())
}

/// Rebuild the argument list in `new_shape` order, reusing each original
/// argument's text (nested rewrites included).
fn remap_arguments(
    unit: &mut SourceUnit,
    old_shape: &[String],
    new_shape: &[String],
    list: &Span,
    args: &[Span],
) -> Result<(), RefactorError> {
    let old_norm: Vec<String> = old_shape.iter().map(|a| normalize(a)).collect();
    let new_norm: Vec<String> = new_shape.iter().map(|a| normalize(a)).collect();
    if old_norm == new_norm {
        return Ok(());
    }
    let entries: Vec<String> = new_shape
        .iter()
        .zip(&new_norm)
        .map(|(raw, norm)| match old_norm.iter().position(|o| o == norm) {
            Some(pos) => unit.render_range(args[pos].clone()),
            None => raw.clone(),
        })
        .collect();
    unit.replace_enclosing(list.clone(), format!("({})", entries.join(", ")))?;
    Ok(())
}

/// Strip whitespace outside string literals.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    out.push(c);
                } else if !c.is_whitespace() {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Split an argument list body on top-level commas. `None` when unbalanced.
fn split_arguments(inner: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut current = String::new();
    for c in inner.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current).trim().to_string());
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    Some(parts)
}
