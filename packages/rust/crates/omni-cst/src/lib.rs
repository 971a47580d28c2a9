//! omni-cst - Lossless Python Syntax Units
//!
//! Parses Python source into a tree-sitter backed [`SourceUnit`] that renders
//! back byte-for-byte, records span edits against it, and resolves import
//! bindings to the reference sites that use them.
//!
//! ## Architecture
//!
//! ```text
//! omni-cst/src/
//! ├── lib.rs        # Re-exports (entry point)
//! ├── error.rs      # SyntaxError enum (thiserror)
//! ├── name.rs       # QualifiedName
//! ├── edit.rs       # TextEdit / EditSet (non-overlapping byte splices)
//! ├── unit.rs       # SourceUnit: parse, edit, render
//! ├── python.rs     # Python tree helpers (definitions, lines)
//! └── bindings.rs   # ImportBinding / ReferenceSite resolution
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use omni_cst::{BindingTable, QualifiedName, SourceUnit};
//!
//! let unit = SourceUnit::parse("from moduleA import Foo\nx = Foo()\n").unwrap();
//! let table = BindingTable::resolve(&unit);
//! let target: QualifiedName = "moduleA.Foo".parse().unwrap();
//! let idx = table.find(&target).next().unwrap();
//! assert_eq!(table.references_to(idx).count(), 1);
//! assert_eq!(unit.render(), unit.text());
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

mod bindings;
mod edit;
mod error;
mod name;
mod python;
mod unit;

// ============================================================================
// Public Re-exports
// ============================================================================

pub use bindings::{
    BindingTable, ImportBinding, ImportShape, ReferenceKind, ReferenceSite, name_references,
};
pub use edit::{Span, TextEdit};
pub use error::SyntaxError;
pub use name::{QualifiedName, is_identifier};
pub use python::{
    DefinitionKind, TopLevelDefinition, dotted_text, indentation, is_blank, line_end_inclusive,
    line_start, top_level_assignments, top_level_definitions,
};
pub use unit::{SourceUnit, line_col, parse, render};

/// Re-exported so callers can walk nodes returned by [`SourceUnit::root`].
pub use tree_sitter::Node;

/// Helpers shared with sibling crates that inspect statements directly.
pub mod tree {
    pub use crate::python::{children, is_docstring, named_children};
}
