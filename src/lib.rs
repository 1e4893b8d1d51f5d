//! file-tx: atomic multi-file search/replace transactions
//!
//! Stages literal search/replace edits across many files, validates every one
//! of them in memory, and then writes all modified files or none of them.
//!
//! # Architecture
//!
//! All edits are the same primitive: [`Edit`], a literal search block that
//! must occur exactly once in its file and the text that replaces it. A
//! [`Transaction`] groups edits by canonical path and drives them through a
//! closed lifecycle ([`TxState`]); a [`TransactionManager`] owns many
//! transactions and retires them into a bounded history.
//!
//! # Safety
//!
//! - Search blocks must match exactly once (overlaps count)
//! - Nothing is written until every staged file patched cleanly
//! - Byte-exact backups before the first write
//! - Atomic file writes (tempfile + fsync + rename)
//! - Automatic rollback when a write fails mid-commit
//! - Optional journal for recovery after a crash
//!
//! # Example
//!
//! ```no_run
//! use file_tx::{Transaction, TransactionOptions};
//!
//! # fn main() -> Result<(), file_tx::TxError> {
//! let mut tx = Transaction::new(TransactionOptions::new("/path/to/project"))?;
//! tx.stage("src/lib.rs", "fn old_name()", "fn new_name()")?;
//! tx.stage("src/main.rs", "old_name()", "new_name()")?;
//!
//! let report = tx.commit()?;
//! if !report.success {
//!     for error in &report.errors {
//!         eprintln!("{error}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod edit;
pub mod error;
pub mod fs;
pub mod patch;
pub mod safety;
pub mod tx;
pub mod validate;

// Re-exports
pub use config::{
    load_from_path, load_from_str, ConfigError, EngineConfig, TransactionOptions,
    TransactionOverrides,
};
pub use edit::{Edit, EditRequest};
pub use error::{AccessKind, FailureKind, TxError};
pub use fs::{FileSystem, OsFileSystem};
pub use patch::{apply_patch, apply_patches, BatchOutcome, EditFailure, PatchError, SimilarMatch};
pub use safety::{PathResolver, SafetyError};
pub use tx::{
    CommitReport, FileError, FileValidation, RecoveryReport, RollbackReport, Transaction,
    TransactionManager, TxOperation, TxState, ValidationReport,
};
pub use validate::{validate_edit, EditIssue, EditValidation, StructuralError};
