use crate::patch::PatchError;
use crate::safety::SafetyError;
use crate::tx::state::{TxOperation, TxState};
use crate::validate::StructuralError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Machine-readable category of a per-file failure in a result object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Structural,
    NotFound,
    AmbiguousMatch,
    FileAccess,
    Write,
    Backup,
    Rollback,
    ConcurrentModification,
    Journal,
}

impl From<&PatchError> for FailureKind {
    fn from(err: &PatchError) -> Self {
        match err {
            PatchError::NotFound { .. } => FailureKind::NotFound,
            PatchError::AmbiguousMatch { .. } => FailureKind::AmbiguousMatch,
        }
    }
}

/// Why a file could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    NotFound,
    PermissionDenied,
    InvalidUtf8,
    Other,
}

impl AccessKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AccessKind::NotFound,
            io::ErrorKind::PermissionDenied => AccessKind::PermissionDenied,
            io::ErrorKind::InvalidData => AccessKind::InvalidUtf8,
            _ => AccessKind::Other,
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::NotFound => write!(f, "file not found"),
            AccessKind::PermissionDenied => write!(f, "permission denied"),
            AccessKind::InvalidUtf8 => write!(f, "file is not valid UTF-8"),
            AccessKind::Other => write!(f, "I/O error"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TxError {
    #[error("invalid edit: {0}")]
    Structural(#[from] StructuralError),

    #[error("cannot {operation} transaction {id} in state {state}")]
    InvalidStateTransition {
        id: String,
        operation: TxOperation,
        state: TxState,
    },

    #[error("invalid path: {0}")]
    Path(#[from] SafetyError),

    #[error("cannot read {}: {kind} ({source})", .path.display())]
    FileAccess {
        path: PathBuf,
        kind: AccessKind,
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to back up {}: {source}", .path.display())]
    Backup { path: PathBuf, source: io::Error },

    #[error("failed to restore {}: {reason}", .path.display())]
    Rollback { path: PathBuf, reason: String },

    #[error("{} changed on disk since it was validated", .path.display())]
    ConcurrentModification { path: PathBuf },

    #[error("journal {}: {reason}", .path.display())]
    Journal { path: PathBuf, reason: String },

    #[error("invalid transaction options: {0}")]
    InvalidOptions(String),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),
}

impl TxError {
    pub(crate) fn file_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TxError::FileAccess {
            path: path.into(),
            kind: AccessKind::from_io(&source),
            source,
        }
    }

    /// Category used when this error is reported inside a result object.
    pub fn kind(&self) -> FailureKind {
        match self {
            TxError::FileAccess { .. } => FailureKind::FileAccess,
            TxError::Write { .. } => FailureKind::Write,
            TxError::Backup { .. } => FailureKind::Backup,
            TxError::Rollback { .. } => FailureKind::Rollback,
            TxError::ConcurrentModification { .. } => FailureKind::ConcurrentModification,
            TxError::Journal { .. } => FailureKind::Journal,
            TxError::Structural(_)
            | TxError::InvalidStateTransition { .. }
            | TxError::Path(_)
            | TxError::InvalidOptions(_)
            | TxError::UnknownTransaction(_) => FailureKind::Structural,
        }
    }
}
