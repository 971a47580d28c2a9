//! Tests for the fast import index.

use std::fs;
use std::path::{Path, PathBuf};

use omni_refactor::{ImportIndex, QualifiedName, RefactorConfig, scan_imports};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Create parent dir");
    }
    fs::write(&path, text).expect("Write file");
    path
}

fn qn(s: &str) -> QualifiedName {
    s.parse().expect("qualified name")
}

#[test]
fn test_index_never_misses_a_binding_file() {
    let dir = TempDir::new().expect("Create temp dir");
    let simple = write(dir.path(), "simple.py", "from pkg.mod import Foo\n");
    let grouped = write(dir.path(), "grouped.py", "from pkg.mod import A, Foo as F\n");
    let nested = write(
        dir.path(),
        "nested.py",
        "def f():\n    if True:\n        from pkg.mod import (\n            Foo,\n        )\n",
    );
    let plain = write(dir.path(), "plain.py", "import pkg.mod.Foo\n");
    write(dir.path(), "other.py", "from pkg.mod import Bar\n# from pkg.mod import Foo\n");
    write(dir.path(), "text.py", "doc = \"from pkg.mod import Foo\"\n");

    let index = ImportIndex::build(dir.path(), &RefactorConfig::default());
    let found: Vec<PathBuf> = index.candidates(&qn("pkg.mod.Foo")).into_iter().collect();
    let mut expected = vec![grouped, nested, plain, simple];
    expected.sort();
    assert_eq!(found, expected);
    assert!(!index.is_empty());
}

#[test]
fn test_unreadable_files_stay_candidates() {
    let dir = TempDir::new().expect("Create temp dir");
    let small = write(dir.path(), "small.py", "from m import Foo\n");
    let large = write(
        dir.path(),
        "large.py",
        &format!("from m import Foo\n{}", "x = 1\n".repeat(50)),
    );
    let config = RefactorConfig {
        max_file_size: 64,
        ..RefactorConfig::default()
    };
    let index = ImportIndex::build(dir.path(), &config);
    assert!(index.may_import(&qn("m.Foo"), &small));
    assert!(index.may_import(&qn("m.Foo"), &large));
    assert!(index.may_import(&qn("m.Unrelated"), &large));
    assert!(!index.may_import(&qn("m.Unrelated"), &small));
}

#[test]
fn test_scan_is_a_superset_of_bindings() {
    let code = "\
import os, sys as system
from a.b import (C,
    D)
try:
    from fast import impl
except ImportError:
    from slow import impl
";
    let names: Vec<String> = scan_imports(code).iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["os", "sys", "a.b.C", "a.b.D", "fast.impl", "slow.impl"]);
}

#[test]
fn test_index_finds_spaced_and_unicode_module_paths() {
    let dir = TempDir::new().expect("Create temp dir");
    let spaced = write(dir.path(), "spaced.py", "from moduleA . sub import Foo\n");
    let unicode = write(dir.path(), "unicode.py", "from módulo.sub import Foo\n");
    write(dir.path(), "relative.py", "from . sub import Foo\n");

    let index = ImportIndex::build(dir.path(), &RefactorConfig::default());
    let found: Vec<PathBuf> = index.candidates(&qn("moduleA.sub.Foo")).into_iter().collect();
    assert_eq!(found, vec![spaced]);
    assert!(index.may_import(&qn("módulo.sub.Foo"), &unicode));
}
