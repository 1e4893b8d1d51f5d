//! Result objects returned by transaction operations.
//!
//! These serialize to the camelCase wire shapes consumed by edit-proposing
//! services, so a proposal can be revised from the diagnostics alone.

use crate::error::{FailureKind, TxError};
use crate::patch::EditFailure;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// One failure attributed to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub file_path: PathBuf,
    pub kind: FailureKind,
    pub error: String,
}

impl FileError {
    pub fn new(file_path: impl Into<PathBuf>, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            kind,
            error: error.into(),
        }
    }

    pub fn from_tx_error(file_path: &Path, err: &TxError) -> Self {
        Self::new(file_path, err.kind(), err.to_string())
    }

    pub fn from_edit_failure(file_path: &Path, failure: &EditFailure) -> Self {
        Self::new(
            file_path,
            FailureKind::from(&failure.error),
            format!("edit #{}: {}", failure.index + 1, failure.error),
        )
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file_path.display(), self.error)
    }
}

/// Per-file section of a [`ValidationReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileValidation {
    pub file_path: PathBuf,
    pub exists: bool,
    pub readable: bool,
    pub edits_valid: bool,
    pub preview_available: bool,
    pub errors: Vec<String>,
}

impl FileValidation {
    pub(crate) fn new(file_path: &Path) -> Self {
        Self {
            file_path: file_path.to_path_buf(),
            exists: false,
            readable: false,
            edits_valid: false,
            preview_available: false,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[must_use = "ValidationReport should be checked for validity"]
pub struct ValidationReport {
    pub valid: bool,
    pub files: Vec<FileValidation>,
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[must_use = "CommitReport should be checked for success"]
pub struct CommitReport {
    pub success: bool,
    pub files_committed: usize,
    pub edits_applied: usize,
    pub backups_created: usize,
    pub errors: Vec<FileError>,
    pub transaction_id: String,
    /// Set when a mid-commit failure triggered a rollback
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub rollback_performed: bool,
}

impl CommitReport {
    pub(crate) fn empty(transaction_id: &str) -> Self {
        Self {
            success: false,
            files_committed: 0,
            edits_applied: 0,
            backups_created: 0,
            errors: Vec::new(),
            transaction_id: transaction_id.to_string(),
            rollback_performed: false,
        }
    }

    /// Failure report carrying only errors, for commits that never wrote.
    pub(crate) fn rejected(transaction_id: &str, errors: Vec<FileError>) -> Self {
        Self {
            errors,
            ..Self::empty(transaction_id)
        }
    }
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "Committed {} ({} files, {} edits, {} backups)",
                self.transaction_id, self.files_committed, self.edits_applied, self.backups_created
            )
        } else if self.rollback_performed {
            write!(
                f,
                "Commit of {} failed with {} errors; rollback performed",
                self.transaction_id,
                self.errors.len()
            )
        } else {
            write!(
                f,
                "Commit of {} failed with {} errors; no files written",
                self.transaction_id,
                self.errors.len()
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[must_use = "RollbackReport should be checked for success"]
pub struct RollbackReport {
    pub success: bool,
    pub files_rolled_back: usize,
    pub errors: Vec<FileError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchError;

    #[test]
    fn test_commit_report_wire_shape() {
        let report = CommitReport {
            success: true,
            files_committed: 1,
            edits_applied: 2,
            backups_created: 1,
            errors: vec![],
            transaction_id: "tx-abc".to_string(),
            rollback_performed: false,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["filesCommitted"], 1);
        assert_eq!(json["editsApplied"], 2);
        assert_eq!(json["transactionId"], "tx-abc");
        assert!(json.get("rollbackPerformed").is_none());
    }

    #[test]
    fn test_rollback_flag_serialized_when_set() {
        let mut report = CommitReport::empty("tx-abc");
        report.rollback_performed = true;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rollbackPerformed"], true);
        assert!(report.to_string().contains("rollback performed"));
    }

    #[test]
    fn test_file_error_from_edit_failure() {
        let failure = EditFailure {
            index: 0,
            error: PatchError::AmbiguousMatch { count: 3 },
        };
        let err = FileError::from_edit_failure(Path::new("/w/a.txt"), &failure);

        assert_eq!(err.kind, FailureKind::AmbiguousMatch);
        assert_eq!(
            err.error,
            "edit #1: search block matched 3 locations, expected exactly 1"
        );
        assert_eq!(
            err.to_string(),
            "/w/a.txt: edit #1: search block matched 3 locations, expected exactly 1"
        );
    }
}
