//! Refactoring configuration.
//!
//! Loaded from TOML, typically `<root>/.omni-refactor.toml`:
//!
//! ```toml
//! workers = 8
//! max_file_size = 2097152
//! skip_dirs = [".git", "build"]
//! preview_only = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RefactorError;

/// File name looked up at the project root by [`RefactorConfig::discover`].
pub const CONFIG_FILE_NAME: &str = ".omni-refactor.toml";

/// Environment variable overriding [`RefactorConfig::workers`].
pub const WORKERS_ENV: &str = "OMNI_REFACTOR_WORKERS";

/// Configuration shared by every refactoring operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorConfig {
    /// Number of parallel workers (0 = available parallelism).
    pub workers: usize,
    /// Maximum file size in bytes (default 1MB).
    pub max_file_size: u64,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
    /// File extensions treated as Python sources.
    pub extensions: Vec<String>,
    /// Honor `.gitignore` / `.ignore` files while walking directories.
    pub respect_gitignore: bool,
    /// Compute results without writing any file.
    pub preview_only: bool,
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_file_size: 1_048_576,
            skip_dirs: [".git", "__pycache__", ".venv", "venv", "node_modules", ".tox"]
                .into_iter()
                .map(String::from)
                .collect(),
            extensions: vec!["py".to_string()],
            respect_gitignore: true,
            preview_only: true, // Default to preview for safety
        }
    }
}

impl RefactorConfig {
    /// Parse a TOML document; missing keys take their defaults.
    ///
    /// # Errors
    /// Returns `RefactorError::Config` when the document is malformed.
    pub fn from_toml_str(raw: &str) -> Result<Self, RefactorError> {
        toml::from_str(raw).map_err(|e| RefactorError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// Returns `RefactorError::Config` when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, RefactorError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RefactorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Load `<root>/.omni-refactor.toml` when present, then apply the
    /// environment override.
    ///
    /// An unreadable or invalid file falls back to defaults with a warning.
    #[must_use]
    pub fn discover(root: &Path) -> Self {
        let path = root.join(CONFIG_FILE_NAME);
        let config = if path.is_file() {
            match Self::load(&path) {
                Ok(config) => config,
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "failed to load refactor config; using defaults"
                    );
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Apply `OMNI_REFACTOR_WORKERS` when it holds a valid count.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        let raw = std::env::var(WORKERS_ENV).ok();
        self.with_workers_override(raw.as_deref())
    }

    fn with_workers_override(mut self, raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return self;
        };
        match raw.parse::<usize>() {
            Ok(workers) => self.workers = workers,
            Err(error) => tracing::warn!(
                var = WORKERS_ENV,
                value = raw,
                error = %error,
                "ignoring invalid worker override"
            ),
        }
        self
    }

    /// Worker count with `0` resolved to the available parallelism.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }

    /// True when `path` carries one of the configured extensions.
    #[must_use]
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RefactorConfig::from_toml_str("workers = 3\npreview_only = false\n")
            .expect("parse config");
        assert_eq!(config.workers, 3);
        assert!(!config.preview_only);
        assert_eq!(config.max_file_size, 1_048_576);
        assert!(config.skip_dirs.iter().any(|d| d == "__pycache__"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = RefactorConfig::from_toml_str("workers = \"many\"").expect_err("invalid");
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_discover_falls_back_on_invalid_file() {
        let dir = TempDir::new().expect("Create temp dir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "workers = [").expect("write");
        let config = RefactorConfig::discover(dir.path());
        assert_eq!(config.max_file_size, RefactorConfig::default().max_file_size);
    }

    #[test]
    fn test_discover_reads_file() {
        let dir = TempDir::new().expect("Create temp dir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "max_file_size = 42\n").expect("write");
        assert_eq!(RefactorConfig::discover(dir.path()).max_file_size, 42);
    }

    #[test]
    fn test_workers_override() {
        let base = RefactorConfig::default();
        assert_eq!(base.clone().with_workers_override(Some(" 6 ")).workers, 6);
        assert_eq!(base.clone().with_workers_override(Some("lots")).workers, 0);
        assert_eq!(base.with_workers_override(None).workers, 0);
    }

    #[test]
    fn test_is_source_file() {
        let config = RefactorConfig::default();
        assert!(config.is_source_file(Path::new("pkg/mod.py")));
        assert!(!config.is_source_file(Path::new("pkg/mod.pyc")));
        assert!(!config.is_source_file(Path::new("Makefile")));
    }
}
