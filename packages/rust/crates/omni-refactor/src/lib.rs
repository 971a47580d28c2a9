#![allow(clippy::doc_markdown)]

//! omni-refactor - Lossless Python Refactoring for Omni DevEnv
//!
//! Rewrites imports, moves top-level definitions between modules and renames
//! call sites while leaving every untouched byte of the source as it was.
//!
//! # Features
//!
//! - **Import Rewriting**: Point `import` / `from ... import` bindings and their references at a new name
//! - **Definition Moves**: Two-phase move of a `def`/`class` with importer fix-up
//! - **Call Rewriting**: Rename callees, with `*.` receiver wildcards and argument remapping
//! - **Import Index**: Regex pre-scan that keeps untouched files from being parsed
//! - **Parallel Driver**: rayon worker pool, ordered results, preview mode, cancellation
//!
//! # Architecture
//!
//! ```text
//! omni-refactor/src/
//! ├── lib.rs      # Re-exports (this file)
//! ├── error.rs    # RefactorError enum (thiserror)
//! ├── types.rs    # Transform, Job, TransformResult, EditLocation
//! ├── config.rs   # RefactorConfig (.omni-refactor.toml + env)
//! ├── fs.rs       # Source reads/writes and file discovery
//! ├── diff.rs     # Unified diff generation
//! ├── imports.rs  # Import rewriting
//! ├── calls.rs    # Call rewriting
//! ├── mover.rs    # DefinitionMove state machine
//! ├── index.rs    # Fast import index
//! ├── report.rs   # TransformReport, MoveReport
//! └── driver.rs   # RefactorDriver (rayon)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use omni_refactor::Transform;
//!
//! let transform = Transform::ReplaceImport {
//!     target: "moduleA.Foo".parse().unwrap(),
//!     replacement: "moduleB.Bar".parse().unwrap(),
//! };
//! let result = transform.transform_source(
//!     Path::new("app.py"),
//!     "from moduleA import Foo\nx = Foo()\n",
//! );
//! assert_eq!(result.output, "from moduleB import Bar\nx = Bar()\n");
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

mod calls;
mod config;
mod diff;
mod driver;
mod error;
mod fs;
mod imports;
mod index;
mod mover;
mod report;
mod types;

// ============================================================================
// Public Re-exports
// ============================================================================

pub use calls::{CallRewrite, CallableName, replace_call};
pub use config::{CONFIG_FILE_NAME, RefactorConfig, WORKERS_ENV};
pub use driver::RefactorDriver;
pub use error::RefactorError;
pub use imports::{add_import, remove_import, replace_import};
pub use index::{ImportIndex, scan_imports};
pub use mover::{DefinitionMove, MoveOutput, MoveState, persist_move};
pub use report::{MoveReport, TransformReport};
pub use types::{AmbiguousSite, EditLocation, Job, Transform, TransformResult};

// File helpers for embedding tools
pub use fs::{discover_sources, find_module_file, read_source, write_source};

// Re-export diff utility for external use
pub use diff::unified_diff;

// Syntax layer
pub use omni_cst::{QualifiedName, SourceUnit};
