//! Fast import index.
//!
//! A single-threaded regex pre-scan mapping imported qualified names to the
//! files that import them. It never parses: string contents are blanked,
//! comments dropped and continuation lines joined, then each logical
//! statement is matched against `import` / `from ... import` forms.
//!
//! The index may over-include (the engine re-verifies every candidate with
//! the binding resolver) but must not miss a file that binds a name. Files it
//! cannot read are therefore kept as candidates for every lookup.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use omni_cst::QualifiedName;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::RefactorConfig;
use crate::fs::{discover_sources, read_source};

#[allow(clippy::expect_used)]
static FROM_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|:)\s*from\s+([\p{XID_Start}_][\p{XID_Continue}.]*)\s+import\s+(.+)$")
        .expect("Failed to compile from-import pattern")
});

#[allow(clippy::expect_used)]
static PLAIN_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|:)\s*import\s+(.+)$").expect("Failed to compile import pattern")
});

/// Whitespace around a dot, as in `from a . b import C`.
#[allow(clippy::expect_used)]
static SPACED_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\.\s*").expect("Failed to compile dotted-path pattern"));

/// Read-only snapshot of which files import which qualified names.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportIndex {
    entries: BTreeMap<QualifiedName, BTreeSet<PathBuf>>,
    unreadable: BTreeSet<PathBuf>,
}

impl ImportIndex {
    /// Scan every source file under `root`.
    #[must_use]
    pub fn build(root: &Path, config: &RefactorConfig) -> Self {
        let files = discover_sources(&[root.to_path_buf()], config);
        Self::from_files(&files, config.max_file_size)
    }

    /// Scan the given files.
    #[must_use]
    pub fn from_files(files: &[PathBuf], max_file_size: u64) -> Self {
        let mut index = Self::default();
        for path in files {
            match read_source(path, max_file_size) {
                Ok(text) => index.add_source(path, &text),
                Err(error) => {
                    tracing::debug!(
                        path = %path.display(),
                        error = %error,
                        "import index could not read file; keeping it as a candidate"
                    );
                    index.unreadable.insert(path.clone());
                }
            }
        }
        tracing::debug!(
            files = files.len(),
            names = index.entries.len(),
            "built import index"
        );
        index
    }

    /// Record the imports of one source text under `path`.
    pub fn add_source(&mut self, path: &Path, text: &str) {
        for name in scan_imports(text) {
            self.entries
                .entry(name)
                .or_default()
                .insert(path.to_path_buf());
        }
    }

    /// Files that may bind `name`, unreadable files included.
    #[must_use]
    pub fn candidates(&self, name: &QualifiedName) -> BTreeSet<PathBuf> {
        let mut files = self.entries.get(name).cloned().unwrap_or_default();
        files.extend(self.unreadable.iter().cloned());
        files
    }

    /// True when `path` may bind `name`.
    #[must_use]
    pub fn may_import(&self, name: &QualifiedName, path: &Path) -> bool {
        self.unreadable.contains(path)
            || self
                .entries
                .get(name)
                .is_some_and(|files| files.contains(path))
    }

    /// Number of distinct imported names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no import was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Qualified names imported by `text`: `module.Name` for `from` imports, the
/// dotted path for plain imports. Relative and wildcard imports are skipped.
#[must_use]
pub fn scan_imports(text: &str) -> Vec<QualifiedName> {
    let mut names = Vec::new();
    for line in logical_lines(text) {
        for statement in line.split(';') {
            scan_statement(statement, &mut names);
        }
    }
    names
}

fn scan_statement(statement: &str, names: &mut Vec<QualifiedName>) {
    if let Some(caps) = FROM_IMPORT.captures(statement) {
        let Ok(module) = caps[1].parse::<QualifiedName>() else {
            return;
        };
        for item in import_items(&caps[2]) {
            if let Ok(name) = module.join(item) {
                names.push(name);
            }
        }
    } else if let Some(caps) = PLAIN_IMPORT.captures(statement) {
        for item in import_items(&caps[1]) {
            if let Ok(name) = item.parse() {
                names.push(name);
            }
        }
    }
}

/// Leading names of a comma-separated import list, aliases dropped.
fn import_items(list: &str) -> impl Iterator<Item = &str> {
    list.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .filter_map(|item| item.split_whitespace().next())
        .filter(|name| *name != "*")
}

/// Join continuation lines, blank string contents and drop comments.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut chars = text.chars().peekable();
    let mut string: Option<(char, bool)> = None;

    while let Some(c) = chars.next() {
        if let Some((quote, triple)) = string {
            match c {
                '\\' => {
                    chars.next();
                }
                '\n' if !triple => {
                    // Unterminated single-quoted string: end it with the line.
                    string = None;
                    current.push(quote);
                    finish_line(&mut lines, &mut current, &mut depth);
                }
                _ if c == quote => {
                    if !triple {
                        string = None;
                        current.push(quote);
                    } else if chars.peek() == Some(&quote) {
                        chars.next();
                        if chars.peek() == Some(&quote) {
                            chars.next();
                            string = None;
                            current.push(quote);
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                let triple = chars.peek() == Some(&c) && {
                    let mut ahead = chars.clone();
                    ahead.next();
                    ahead.peek() == Some(&c)
                };
                if triple {
                    chars.next();
                    chars.next();
                }
                string = Some((c, triple));
                current.push(c);
            }
            '#' => {
                while chars.peek().is_some_and(|n| *n != '\n') {
                    chars.next();
                }
            }
            '\\' if chars.peek() == Some(&'\n') => {
                chars.next();
                current.push(' ');
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '\n' if depth > 0 => current.push(' '),
            '\n' => finish_line(&mut lines, &mut current, &mut depth),
            _ => current.push(c),
        }
    }
    finish_line(&mut lines, &mut current, &mut depth);
    lines
}

fn finish_line(lines: &mut Vec<String>, current: &mut String, depth: &mut usize) {
    let line = std::mem::take(current);
    *depth = 0;
    if !line.trim().is_empty() {
        lines.push(SPACED_DOT.replace_all(&line, ".").into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Vec<String> {
        scan_imports(text).iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_scan_shapes() {
        let text = r#"
import os.path, sys as system
from a.b import C
from m import (
    X,  # trailing comment
    Y as Z,
)
from n import P, \
    Q
"#;
        assert_eq!(
            scan(text),
            vec!["os.path", "sys", "a.b.C", "m.X", "m.Y", "n.P", "n.Q"]
        );
    }

    #[test]
    fn test_scan_skips_relative_wildcard_and_strings() {
        let text = "from . import x\nfrom .pkg import y\nfrom m import *\ns = 'import fake'\n\"\"\"\nfrom doc import Z\n\"\"\"\n";
        assert!(scan(text).is_empty());
    }

    #[test]
    fn test_scan_semicolons_and_compound_lines() {
        let text = "import a; from b import C\nif TYPE_CHECKING: from d import E\n    from nested import F\n";
        assert_eq!(scan(text), vec!["a", "b.C", "d.E", "nested.F"]);
    }

    #[test]
    fn test_scan_spaced_dots_and_unicode_modules() {
        let text = "from moduleA . sub import Foo\nimport pkg .mod\nfrom ñandú.núcleo import Ávila\nfrom . import x\n";
        assert_eq!(scan(text), vec!["moduleA.sub.Foo", "pkg.mod", "ñandú.núcleo.Ávila"]);
    }

    #[test]
    fn test_candidates_include_unreadable_files() {
        let mut index = ImportIndex::default();
        index.add_source(Path::new("a.py"), "from m import Foo\n");
        index.add_source(Path::new("b.py"), "from m import Bar\n");
        index.unreadable.insert(PathBuf::from("big.py"));

        let name: QualifiedName = "m.Foo".parse().expect("name");
        let files: Vec<_> = index.candidates(&name).into_iter().collect();
        assert_eq!(files, vec![PathBuf::from("a.py"), PathBuf::from("big.py")]);
        assert!(index.may_import(&name, Path::new("big.py")));
        assert!(!index.may_import(&name, Path::new("b.py")));
        assert_eq!(index.len(), 2);
    }
}
