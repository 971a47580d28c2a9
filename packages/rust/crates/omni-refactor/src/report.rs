//! Aggregated outcomes of driver runs.

use omni_cst::QualifiedName;
use serde::Serialize;

use crate::error::RefactorError;
use crate::mover::MoveState;
use crate::types::{Transform, TransformResult};

/// Summary of one transform applied across a file set.
///
/// `results` follow the order of the (deduplicated) input files.
#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    /// The transform that was run.
    pub transform: Transform,
    /// Files considered before index filtering.
    pub files_scanned: usize,
    /// Files that produced a result.
    pub files_processed: usize,
    /// Files whose output differs from the original.
    pub files_modified: usize,
    /// Files whose output was persisted.
    pub files_written: usize,
    /// Files that ended with an error (ambiguous sites included).
    pub files_failed: usize,
    /// Ambiguous call sites across all files.
    pub ambiguous_sites: usize,
    /// True when at least one job was cancelled.
    pub cancelled: bool,
    /// Per-file results.
    pub results: Vec<TransformResult>,
}

impl TransformReport {
    /// Aggregate per-file results.
    #[must_use]
    pub fn new(transform: Transform, files_scanned: usize, results: Vec<TransformResult>) -> Self {
        let count = |f: fn(&TransformResult) -> bool| results.iter().filter(|r| f(r)).count();
        Self {
            files_scanned,
            files_processed: results.len(),
            files_modified: count(|r| r.modified),
            files_written: count(|r| r.written),
            files_failed: count(TransformResult::is_error),
            ambiguous_sites: results.iter().map(|r| r.ambiguous.len()).sum(),
            cancelled: results
                .iter()
                .any(|r| matches!(r.error, Some(RefactorError::Cancelled))),
            transform,
            results,
        }
    }

    /// True when every file finished without an error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }

    /// Results that carry an error.
    pub fn failures(&self) -> impl Iterator<Item = &TransformResult> {
        self.results.iter().filter(|r| r.is_error())
    }

    /// Pretty JSON for tooling.
    ///
    /// # Errors
    /// Returns `RefactorError::Config` if serialization fails.
    pub fn to_json(&self) -> Result<String, RefactorError> {
        serde_json::to_string_pretty(self).map_err(|e| RefactorError::Config(e.to_string()))
    }
}

/// Outcome of a definition move and its importer fix-up.
#[derive(Debug, Clone, Serialize)]
pub struct MoveReport {
    /// Qualified name that was moved.
    pub symbol: QualifiedName,
    /// Qualified name after the move.
    pub target: QualifiedName,
    /// Final state of the move.
    pub state: MoveState,
    /// Origin module result (phase 1).
    pub origin: Option<TransformResult>,
    /// Destination module result (phase 1).
    pub destination: Option<TransformResult>,
    /// Importer rewrites (phase 2), only after a commit.
    pub fan_out: Option<TransformReport>,
    /// Error that aborted phase 1.
    #[serde(serialize_with = "crate::types::serialize_error")]
    pub error: Option<RefactorError>,
}

impl MoveReport {
    /// True when phase 1 committed and every importer was rewritten cleanly.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == MoveState::Committed
            && self.fan_out.as_ref().is_none_or(TransformReport::is_success)
    }

    /// Pretty JSON for tooling.
    ///
    /// # Errors
    /// Returns `RefactorError::Config` if serialization fails.
    pub fn to_json(&self) -> Result<String, RefactorError> {
        serde_json::to_string_pretty(self).map_err(|e| RefactorError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_report_counts() {
        let transform = Transform::ReplaceImport {
            target: "a.Foo".parse().expect("name"),
            replacement: "b.Foo".parse().expect("name"),
        };
        let results = vec![
            transform.transform_source(Path::new("x.py"), "from a import Foo\n"),
            transform.transform_source(Path::new("y.py"), "import os\n"),
            TransformResult::failed("z.py", RefactorError::Cancelled),
        ];
        let report = TransformReport::new(transform, 5, results);
        assert_eq!(report.files_scanned, 5);
        assert_eq!(report.files_processed, 3);
        assert_eq!(report.files_modified, 1);
        assert_eq!(report.files_failed, 1);
        assert!(report.cancelled);
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 1);

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("json")).expect("parse");
        assert_eq!(json["transform"]["kind"], "replace_import");
        assert_eq!(json["results"][2]["error"]["kind"], "cancelled");
        assert_eq!(json["results"][1]["error"], serde_json::Value::Null);
    }

    #[test]
    fn test_move_report_error_matches_result_error_shape() {
        let report = MoveReport {
            symbol: "pkg.origin.f".parse().expect("name"),
            target: "pkg.dest.f".parse().expect("name"),
            state: MoveState::Aborted,
            origin: None,
            destination: None,
            fan_out: None,
            error: Some(RefactorError::Conflict("f already exists".into())),
        };
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("json")).expect("parse");
        let failed = serde_json::to_value(TransformResult::failed(
            "x.py",
            RefactorError::Conflict("f already exists".into()),
        ))
        .expect("value");
        assert_eq!(json["error"], failed["error"]);
        assert_eq!(json["error"]["kind"], "conflict");
    }
}
