//! File system access for refactoring jobs.
//!
//! Reads are size-limited and reject binary content; directory expansion is
//! `.gitignore`-aware via `ignore`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use memchr::memchr;
use omni_cst::QualifiedName;

use crate::config::RefactorConfig;
use crate::error::RefactorError;

/// Quick binary detection - checks first 8KB for NULL bytes.
#[must_use]
pub fn is_binary(buffer: &[u8]) -> bool {
    let check_len = buffer.len().min(8192);
    memchr(0, &buffer[..check_len]).is_some()
}

/// Read a source file with size and binary checks.
///
/// Invalid UTF-8 is an error: lossy decoding would corrupt the file on write.
///
/// # Errors
/// `TooLarge` above `max_bytes`, `BinaryFile` for NULL bytes and `Io` for
/// missing paths, non-files, permission, read or decoding failures. The `Io`
/// message carries the underlying `io::ErrorKind`.
pub fn read_source(path: &Path, max_bytes: u64) -> Result<String, RefactorError> {
    let metadata = fs::metadata(path)
        .map_err(|e| RefactorError::Io(format!("{}: {:?}: {e}", path.display(), e.kind())))?;
    if !metadata.is_file() {
        return Err(RefactorError::Io(format!("{}: not a regular file", path.display())));
    }
    if metadata.len() > max_bytes {
        return Err(RefactorError::TooLarge(metadata.len(), max_bytes));
    }

    let buffer = fs::read(path)?;
    if is_binary(&buffer) {
        return Err(RefactorError::BinaryFile);
    }
    String::from_utf8(buffer)
        .map_err(|e| RefactorError::Io(format!("{}: invalid UTF-8: {e}", path.display())))
}

/// Write `text` to `path`, creating parent directories as needed.
///
/// # Errors
/// Returns `RefactorError::Io` when a directory or the file cannot be written.
pub fn write_source(path: &Path, text: &str) -> Result<(), RefactorError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| RefactorError::Io(format!("{}: {e}", parent.display())))?;
    }
    fs::write(path, text).map_err(|e| RefactorError::Io(format!("{}: {e}", path.display())))
}

/// Expand files and directories into the list of source files to process.
///
/// Explicit file arguments are kept as given (a missing one surfaces later as
/// a per-file `Io` error); directories are walked in file-name order,
/// skipping configured directory names and non-source files. Duplicates keep
/// their first position.
#[must_use]
pub fn discover_sources(paths: &[PathBuf], config: &RefactorConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(walk_dir(path, config));
        } else {
            files.push(path.clone());
        }
    }
    dedup_paths(files)
}

fn walk_dir(root: &Path, config: &RefactorConfig) -> Vec<PathBuf> {
    let skip_dirs = config.skip_dirs.clone();
    ignore::WalkBuilder::new(root)
        .git_ignore(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .ignore(config.respect_gitignore)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && skip_dirs
                    .iter()
                    .any(|d| entry.file_name().to_string_lossy() == d.as_str()))
        })
        .build()
        .filter_map(|result| match result {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::debug!(root = %root.display(), error = %error, "skipping walk entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(ignore::DirEntry::into_path)
        .filter(|path| config.is_source_file(path))
        .collect()
}

/// Drop repeated paths (compared canonically when possible), keeping order.
#[must_use]
pub fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(fs::canonicalize(p).unwrap_or_else(|_| p.clone())))
        .collect()
}

/// Candidate file paths for `module` under `root`: `a/b/c.py`, then
/// `a/b/c/__init__.py`.
#[must_use]
pub fn module_candidates(root: &Path, module: &QualifiedName) -> [PathBuf; 2] {
    let mut base = root.to_path_buf();
    for segment in module.segments() {
        base.push(segment);
    }
    [base.with_extension("py"), base.join("__init__.py")]
}

/// Existing file that defines `module` under `root`.
#[must_use]
pub fn find_module_file(root: &Path, module: &QualifiedName) -> Option<PathBuf> {
    module_candidates(root, module)
        .into_iter()
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, text: &str) -> PathBuf {
        let path = root.join(rel);
        write_source(&path, text).expect("write");
        path
    }

    #[test]
    fn test_read_source_checks() {
        let dir = TempDir::new().expect("Create temp dir");
        let text = touch(dir.path(), "ok.py", "x = 1\n");
        assert_eq!(read_source(&text, 1024).expect("read"), "x = 1\n");

        let big = touch(dir.path(), "big.py", "12345678901234567890");
        assert!(matches!(
            read_source(&big, 10),
            Err(RefactorError::TooLarge(20, 10))
        ));

        let bin = dir.path().join("bin.py");
        fs::write(&bin, b"\x00\x01\x02").expect("write");
        assert!(matches!(read_source(&bin, 1024), Err(RefactorError::BinaryFile)));

        let bad = dir.path().join("latin1.py");
        fs::write(&bad, b"x = '\xe9'\n").expect("write");
        assert!(matches!(read_source(&bad, 1024), Err(RefactorError::Io(_))));

        match read_source(&dir.path().join("missing.py"), 1024) {
            Err(RefactorError::Io(message)) => assert!(message.contains("NotFound"), "{message}"),
            other => panic!("expected io error, got {other:?}"),
        }
        assert!(matches!(read_source(dir.path(), 1024), Err(RefactorError::Io(_))));
    }

    #[test]
    fn test_discover_skips_dirs_and_extensions() {
        let dir = TempDir::new().expect("Create temp dir");
        let root = dir.path();
        touch(root, "b.py", "");
        touch(root, "a.py", "");
        touch(root, "notes.txt", "");
        touch(root, "pkg/__init__.py", "");
        touch(root, "__pycache__/cached.py", "");
        touch(root, ".venv/lib/site.py", "");

        let files = discover_sources(&[root.to_path_buf()], &RefactorConfig::default());
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).expect("under root").to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a.py"),
                PathBuf::from("b.py"),
                PathBuf::from("pkg/__init__.py")
            ]
        );
    }

    #[test]
    fn test_discover_dedups_and_keeps_order() {
        let dir = TempDir::new().expect("Create temp dir");
        let a = touch(dir.path(), "a.py", "");
        let b = touch(dir.path(), "b.py", "");
        let files = discover_sources(&[b.clone(), a.clone(), b.clone()], &RefactorConfig::default());
        assert_eq!(files, vec![b, a]);
    }

    #[test]
    fn test_discover_respects_gitignore() {
        let dir = TempDir::new().expect("Create temp dir");
        touch(dir.path(), ".gitignore", "generated/\n");
        touch(dir.path(), "generated/out.py", "");
        touch(dir.path(), "main.py", "");
        let files = discover_sources(&[dir.path().to_path_buf()], &RefactorConfig::default());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.py"));
    }

    #[test]
    fn test_find_module_file() {
        let dir = TempDir::new().expect("Create temp dir");
        let module: QualifiedName = "pkg.sub".parse().expect("name");
        assert!(find_module_file(dir.path(), &module).is_none());

        let init = touch(dir.path(), "pkg/sub/__init__.py", "");
        assert_eq!(find_module_file(dir.path(), &module), Some(init));

        let file = touch(dir.path(), "pkg/sub.py", "");
        assert_eq!(find_module_file(dir.path(), &module), Some(file));
    }
}
