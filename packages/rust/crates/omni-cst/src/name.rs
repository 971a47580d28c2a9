//! Dotted qualified names (`package.module.Symbol`).

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::SyntaxError;

/// An ordered, non-empty sequence of identifier segments ending in a leaf symbol.
///
/// Equality is segment-wise, so `a.b.C` parsed twice always compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    segments: Vec<String>,
}

impl QualifiedName {
    /// Build a name from already-split segments.
    ///
    /// # Errors
    /// Returns `SyntaxError::InvalidName` when there are no segments or one is
    /// not a Python identifier.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, SyntaxError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || !segments.iter().all(|s| is_identifier(s)) {
            return Err(SyntaxError::InvalidName(segments.join(".")));
        }
        Ok(Self { segments })
    }

    /// All segments, leaf last.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The trailing symbol (`Symbol` in `pkg.mod.Symbol`).
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// The module path without the leaf, `None` for a single segment.
    #[must_use]
    pub fn module(&self) -> Option<QualifiedName> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True when the name has a module path in front of its leaf.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    /// Same module path with a different leaf.
    ///
    /// # Errors
    /// Returns `SyntaxError::InvalidName` when `leaf` is not an identifier.
    pub fn with_leaf(&self, leaf: &str) -> Result<Self, SyntaxError> {
        let mut segments = self.segments.clone();
        segments.pop();
        segments.push(leaf.to_string());
        Self::from_segments(segments)
    }

    /// Append a child segment (`pkg.mod` + `Symbol`).
    ///
    /// # Errors
    /// Returns `SyntaxError::InvalidName` when `segment` is not an identifier.
    pub fn join(&self, segment: &str) -> Result<Self, SyntaxError> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::from_segments(segments)
    }
}

impl FromStr for QualifiedName {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segments(s.trim().split('.'))
            .map_err(|_| SyntaxError::InvalidName(s.to_string()))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Python identifier check (ASCII letters, digits, underscore, or any non-ASCII
/// alphanumeric; no leading digit).
#[must_use]
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_split() {
        let name: QualifiedName = "module.sub.Symbol".parse().expect("valid name");
        assert_eq!(name.leaf(), "Symbol");
        assert_eq!(name.module().expect("module").to_string(), "module.sub");
        assert!(name.is_nested());
    }

    #[test]
    fn test_single_segment_has_no_module() {
        let name: QualifiedName = "Symbol".parse().expect("valid name");
        assert!(name.module().is_none());
        assert!(!name.is_nested());
    }

    #[test]
    fn test_rejects_bad_segments() {
        assert!("a..b".parse::<QualifiedName>().is_err());
        assert!("".parse::<QualifiedName>().is_err());
        assert!("a.1b".parse::<QualifiedName>().is_err());
        assert!("a.b-c".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn test_with_leaf_and_join() {
        let name: QualifiedName = "pkg.mod.Old".parse().expect("valid name");
        assert_eq!(name.with_leaf("New").expect("leaf").to_string(), "pkg.mod.New");
        let module = name.module().expect("module");
        assert_eq!(module.join("Other").expect("join").to_string(), "pkg.mod.Other");
    }
}
