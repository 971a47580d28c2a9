//! Parallel refactoring driver.
//!
//! Runs one transform over many files on a dedicated rayon pool. Each job
//! owns its file: it reads, transforms and (outside preview mode) writes it
//! without sharing state with other jobs. Results come back in input order
//! regardless of completion order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use omni_cst::{QualifiedName, SourceUnit};
use rayon::prelude::*;

use crate::calls::CallableName;
use crate::config::RefactorConfig;
use crate::error::RefactorError;
use crate::fs::{
    dedup_paths, discover_sources, find_module_file, module_candidates, read_source, write_source,
};
use crate::index::ImportIndex;
use crate::mover::{DefinitionMove, MoveState, persist_move};
use crate::report::{MoveReport, TransformReport};
use crate::types::{Job, Transform, TransformResult};

impl Job {
    /// Read, transform and (unless previewing) write one file.
    ///
    /// A job that observes `cancel` before starting reports `Cancelled`
    /// without touching the file.
    #[must_use]
    pub fn execute(&self, max_file_size: u64, cancel: &AtomicBool) -> TransformResult {
        if cancel.load(Ordering::Relaxed) {
            return TransformResult::failed(&self.path, RefactorError::Cancelled);
        }
        let text = match read_source(&self.path, max_file_size) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), error = %error, "failed to read source");
                return TransformResult::failed(&self.path, error);
            }
        };

        let mut result = self.transform.transform_source(&self.path, &text);
        if result.modified && !self.preview_only {
            match write_source(&self.path, &result.output) {
                Ok(()) => result.written = true,
                Err(error) => {
                    tracing::warn!(path = %self.path.display(), error = %error, "failed to write source");
                    result.error = Some(error);
                }
            }
        }
        result
    }
}

/// Runs transforms and definition moves over a codebase.
#[derive(Debug)]
pub struct RefactorDriver {
    config: RefactorConfig,
    pool: rayon::ThreadPool,
    cancel: Arc<AtomicBool>,
}

impl RefactorDriver {
    /// Create a driver with a worker pool sized from `config`.
    ///
    /// # Errors
    /// Returns `RefactorError::Pool` when the thread pool cannot be built.
    pub fn new(config: RefactorConfig) -> Result<Self, RefactorError> {
        let workers = config.effective_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("omni-refactor-{i}"))
            .build()
            .map_err(|e| RefactorError::Pool(e.to_string()))?;
        tracing::debug!(workers, preview_only = config.preview_only, "refactor driver ready");
        Ok(Self {
            config,
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Driver configured from `root` (`.omni-refactor.toml` plus environment).
    ///
    /// # Errors
    /// Returns `RefactorError::Pool` when the thread pool cannot be built.
    pub fn for_root(root: &Path) -> Result<Self, RefactorError> {
        Self::new(RefactorConfig::discover(root))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RefactorConfig {
        &self.config
    }

    /// Shared flag that cancels jobs which have not started yet.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Cancel pending jobs. Running jobs finish their file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Clear a previous cancellation.
    pub fn reset(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Apply `transform` to each file, one result per distinct file in input
    /// order.
    #[must_use]
    pub fn run(&self, files: &[PathBuf], transform: &Transform) -> Vec<TransformResult> {
        let transform = Arc::new(transform.clone());
        let jobs: Vec<Job> = dedup_paths(files.to_vec())
            .into_iter()
            .map(|path| Job {
                path,
                transform: Arc::clone(&transform),
                preview_only: self.config.preview_only,
            })
            .collect();

        let max_file_size = self.config.max_file_size;
        let cancel = &self.cancel;
        let results: Vec<TransformResult> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| job.execute(max_file_size, cancel))
                .collect()
        });

        tracing::info!(
            transform = %transform.label(),
            files = results.len(),
            modified = results.iter().filter(|r| r.modified).count(),
            failed = results.iter().filter(|r| r.is_error()).count(),
            preview_only = self.config.preview_only,
            "refactor batch finished"
        );
        results
    }

    /// Point imports of `target` at `replacement` across `paths`.
    ///
    /// Files the import index rules out are not parsed.
    #[must_use]
    pub fn replace_import(
        &self,
        paths: &[PathBuf],
        target: &QualifiedName,
        replacement: &QualifiedName,
    ) -> TransformReport {
        let files = discover_sources(paths, &self.config);
        let index = ImportIndex::from_files(&files, self.config.max_file_size);
        let candidates: Vec<PathBuf> = files
            .iter()
            .filter(|path| index.may_import(target, path))
            .cloned()
            .collect();
        tracing::debug!(
            scanned = files.len(),
            candidates = candidates.len(),
            target = %target,
            "import index filtered files"
        );

        let transform = Transform::ReplaceImport {
            target: target.clone(),
            replacement: replacement.clone(),
        };
        let results = self.run(&candidates, &transform);
        TransformReport::new(transform, files.len(), results)
    }

    /// Rewrite calls matching `old` into `new` across `paths`.
    #[must_use]
    pub fn replace_call(
        &self,
        paths: &[PathBuf],
        old: &CallableName,
        new: &CallableName,
    ) -> TransformReport {
        let files = discover_sources(paths, &self.config);
        let transform = Transform::ReplaceCall {
            old: old.clone(),
            new: new.clone(),
        };
        let results = self.run(&files, &transform);
        TransformReport::new(transform, files.len(), results)
    }

    /// Move the top-level definition `symbol` to `target` under `root`, then
    /// rewrite every importer of the old name.
    ///
    /// Importers are looked up in an index snapshot taken before phase 1.
    /// Phase 2 only runs once phase 1 is committed.
    #[must_use]
    pub fn move_definition(
        &self,
        root: &Path,
        symbol: &QualifiedName,
        target: &QualifiedName,
    ) -> MoveReport {
        let files = discover_sources(&[root.to_path_buf()], &self.config);
        let index = ImportIndex::from_files(&files, self.config.max_file_size);

        let mut mv = DefinitionMove::new(symbol.clone(), target.clone());
        let mut report = MoveReport {
            symbol: symbol.clone(),
            target: target.clone(),
            state: MoveState::Pending,
            origin: None,
            destination: None,
            fan_out: None,
            error: None,
        };

        match self.move_phase_one(root, &mut mv) {
            Ok((origin_path, destination_path)) => {
                if let Some(output) = mv.output() {
                    let written = !self.config.preview_only;
                    let mut origin =
                        TransformResult::from_texts(&origin_path, &output.origin_original, &output.origin);
                    origin.written = written && origin.modified;
                    let mut destination = TransformResult::from_texts(
                        &destination_path,
                        &output.destination_original,
                        &output.destination,
                    );
                    destination.written = written && destination.modified;
                    report.origin = Some(origin);
                    report.destination = Some(destination);
                }

                if let Some(transform) = mv.fan_out() {
                    let importers: Vec<PathBuf> = files
                        .iter()
                        .filter(|path| index.may_import(symbol, path))
                        .filter(|path| {
                            !same_file(path, &origin_path) && !same_file(path, &destination_path)
                        })
                        .cloned()
                        .collect();
                    tracing::info!(
                        symbol = %symbol,
                        importers = importers.len(),
                        "rewriting importers of moved definition"
                    );
                    let results = self.run(&importers, &transform);
                    report.fan_out = Some(TransformReport::new(transform, files.len(), results));
                }
            }
            Err(error) => {
                if mv.state() != MoveState::Aborted {
                    mv.abort(error);
                }
            }
        }

        report.state = mv.state();
        report.error = mv.error().cloned();
        report
    }

    fn move_phase_one(
        &self,
        root: &Path,
        mv: &mut DefinitionMove,
    ) -> Result<(PathBuf, PathBuf), RefactorError> {
        let (origin_module, destination_module) = mv.modules()?;
        let origin_path = find_module_file(root, &origin_module).ok_or_else(|| {
            RefactorError::NotFound(format!("module {origin_module} under {}", root.display()))
        })?;
        let existing_destination = find_module_file(root, &destination_module);
        let destination_existed = existing_destination.is_some();
        let destination_path = existing_destination.unwrap_or_else(|| {
            let [file, _] = module_candidates(root, &destination_module);
            file
        });

        let max_file_size = self.config.max_file_size;
        let origin_text = read_source(&origin_path, max_file_size)?;
        let destination_text = if destination_existed {
            read_source(&destination_path, max_file_size)?
        } else {
            String::new()
        };
        let mut origin = SourceUnit::parse_path(&origin_path, origin_text)?;
        let mut destination = SourceUnit::parse_path(&destination_path, destination_text)?;

        mv.extract(&mut origin, &mut destination)?;
        let preview_only = self.config.preview_only;
        mv.commit(|output| {
            if preview_only {
                Ok(())
            } else {
                persist_move(&origin_path, &destination_path, output, destination_existed)
            }
        })?;
        Ok((origin_path, destination_path))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
