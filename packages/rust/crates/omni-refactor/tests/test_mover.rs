//! Tests for definition moves, end to end on a temporary package.

use std::fs;
use std::path::{Path, PathBuf};

use omni_refactor::{
    MoveOutput, MoveState, QualifiedName, RefactorConfig, RefactorDriver, persist_move,
};
use tempfile::TempDir;

const ORIGIN: &str = "\
import os


def helper():
    return 42


def keep():
    return helper()
";

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Create parent dir");
    }
    fs::write(&path, text).expect("Write file");
    path
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("Read file")
}

fn qn(s: &str) -> QualifiedName {
    s.parse().expect("qualified name")
}

fn project() -> (TempDir, PathBuf, PathBuf, PathBuf) {
    let dir = TempDir::new().expect("Create temp dir");
    write(dir.path(), "pkg/__init__.py", "");
    let origin = write(dir.path(), "pkg/origin.py", ORIGIN);
    let dest = write(dir.path(), "pkg/dest.py", "\"\"\"Destination.\"\"\"\n");
    let app = write(
        dir.path(),
        "app.py",
        "from pkg.origin import helper\n\nprint(helper())\n",
    );
    (dir, origin, dest, app)
}

fn driver(preview_only: bool) -> RefactorDriver {
    RefactorDriver::new(RefactorConfig {
        workers: 2,
        preview_only,
        ..RefactorConfig::default()
    })
    .expect("driver")
}

#[test]
fn test_move_rewrites_origin_destination_and_importers() {
    let (dir, origin, dest, app) = project();
    let report = driver(false).move_definition(
        dir.path(),
        &qn("pkg.origin.helper"),
        &qn("pkg.dest.helper"),
    );

    assert_eq!(report.state, MoveState::Committed);
    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(
        read(&origin),
        "import os\nfrom pkg.dest import helper\n\n\ndef keep():\n    return helper()\n"
    );
    assert_eq!(
        read(&dest),
        "\"\"\"Destination.\"\"\"\n\n\ndef helper():\n    return 42\n"
    );
    assert_eq!(
        read(&app),
        "from pkg.dest import helper\n\nprint(helper())\n"
    );

    let fan_out = report.fan_out.expect("phase 2 ran");
    assert_eq!(fan_out.files_processed, 1);
    assert_eq!(fan_out.files_written, 1);
    assert!(report.origin.expect("origin result").written);
}

#[test]
fn test_move_with_rename() {
    let (dir, origin, dest, app) = project();
    let report = driver(false).move_definition(
        dir.path(),
        &qn("pkg.origin.helper"),
        &qn("pkg.dest.assist"),
    );
    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(
        read(&origin),
        "import os\nfrom pkg.dest import assist\n\n\ndef keep():\n    return assist()\n"
    );
    assert!(read(&dest).ends_with("def assist():\n    return 42\n"));
    assert_eq!(
        read(&app),
        "from pkg.dest import assist\n\nprint(assist())\n"
    );
}

#[test]
fn test_move_creates_destination_module() {
    let (dir, _, _, _) = project();
    let report = driver(false).move_definition(
        dir.path(),
        &qn("pkg.origin.helper"),
        &qn("pkg.util.helper"),
    );
    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(
        read(&dir.path().join("pkg/util.py")),
        "def helper():\n    return 42\n"
    );
}

#[test]
fn test_conflict_aborts_before_any_write() {
    let (dir, origin, dest, app) = project();
    fs::write(&dest, "helper = None\n").expect("Write dest");

    let report = driver(false).move_definition(
        dir.path(),
        &qn("pkg.origin.helper"),
        &qn("pkg.dest.helper"),
    );
    assert_eq!(report.state, MoveState::Aborted);
    assert_eq!(report.error.as_ref().map(|e| e.kind()), Some("conflict"));
    assert!(report.fan_out.is_none());
    assert_eq!(read(&origin), ORIGIN);
    assert_eq!(read(&dest), "helper = None\n");
    assert_eq!(read(&app), "from pkg.origin import helper\n\nprint(helper())\n");
}

#[test]
fn test_missing_symbol_and_module() {
    let (dir, _, _, _) = project();
    let report = driver(false).move_definition(
        dir.path(),
        &qn("pkg.origin.nothing"),
        &qn("pkg.dest.nothing"),
    );
    assert_eq!(report.state, MoveState::Aborted);
    assert_eq!(report.error.as_ref().map(|e| e.kind()), Some("not_found"));

    let report = driver(false).move_definition(
        dir.path(),
        &qn("pkg.missing.helper"),
        &qn("pkg.dest.helper"),
    );
    assert_eq!(report.error.as_ref().map(|e| e.kind()), Some("not_found"));
}

#[test]
fn test_preview_move_writes_nothing() {
    let (dir, origin, dest, app) = project();
    let report = driver(true).move_definition(
        dir.path(),
        &qn("pkg.origin.helper"),
        &qn("pkg.dest.helper"),
    );
    assert_eq!(report.state, MoveState::Committed);
    let origin_result = report.origin.as_ref().expect("origin result");
    assert!(origin_result.modified);
    assert!(!origin_result.written);
    assert!(origin_result.diff.contains("-def helper():"));
    let fan_out = report.fan_out.as_ref().expect("fan out");
    assert_eq!(fan_out.results[0].output, "from pkg.dest import helper\n\nprint(helper())\n");
    assert_eq!(fan_out.files_written, 0);

    assert_eq!(read(&origin), ORIGIN);
    assert_eq!(read(&dest), "\"\"\"Destination.\"\"\"\n");
    assert_eq!(read(&app), "from pkg.origin import helper\n\nprint(helper())\n");

    let json: serde_json::Value =
        serde_json::from_str(&report.to_json().expect("json")).expect("parse");
    assert_eq!(json["state"], "committed");
    assert_eq!(json["symbol"], "pkg.origin.helper");
}

fn output() -> MoveOutput {
    MoveOutput {
        origin_original: "def f():\n    pass\n".to_string(),
        origin: String::new(),
        destination_original: "x = 1\n".to_string(),
        destination: "x = 1\n\n\ndef f():\n    pass\n".to_string(),
        origin_imports_target: false,
    }
}

#[test]
fn test_persist_removes_created_destination_on_failure() {
    let dir = TempDir::new().expect("Create temp dir");
    // A directory cannot be written as a file.
    let origin = dir.path().join("origin_dir");
    fs::create_dir(&origin).expect("Create dir");
    let dest = dir.path().join("dest.py");

    let err = persist_move(&origin, &dest, &output(), false).expect_err("origin write fails");
    assert_eq!(err.kind(), "io");
    assert!(!dest.exists());
}

#[test]
fn test_persist_restores_existing_destination_on_failure() {
    let dir = TempDir::new().expect("Create temp dir");
    let origin = dir.path().join("origin_dir");
    fs::create_dir(&origin).expect("Create dir");
    let dest = write(dir.path(), "dest.py", "x = 1\n");

    persist_move(&origin, &dest, &output(), true).expect_err("origin write fails");
    assert_eq!(read(&dest), "x = 1\n");
}
