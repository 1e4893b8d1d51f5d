//! A single atomic multi-file edit transaction.
//!
//! Edits are staged per canonical path, validated against a snapshot of each
//! file, and written only when every file patched cleanly. Commit is
//! all-or-nothing from the caller's point of view: the first write failure
//! restores every file already written, from its backup copy when one exists
//! and from the in-memory snapshot otherwise.

use crate::config::TransactionOptions;
use crate::edit::{unix_millis, Edit, EditRequest};
use crate::error::{AccessKind, TxError};
use crate::fs::{FileSystem, OsFileSystem};
use crate::patch::apply_patches;
use crate::safety::PathResolver;
use crate::tx::journal::{content_hash, Journal, JournalEntry};
use crate::tx::lock::{lock_all, PathLocks};
use crate::tx::report::{
    CommitReport, FileError, FileValidation, RollbackReport, ValidationReport,
};
use crate::tx::state::{TxOperation, TxState};
use crate::validate::validate_edit;
use similar::TextDiff;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Generate a fresh transaction id.
pub fn generate_id() -> String {
    format!("tx-{:016x}", rand::random::<u64>())
}

#[derive(Debug)]
pub struct Transaction {
    id: String,
    state: TxState,
    options: TransactionOptions,
    resolver: PathResolver,
    fs: Arc<dyn FileSystem>,
    locks: Option<PathLocks>,
    created_at: u64,
    /// Staged edits per canonical path, in staging order
    staged: BTreeMap<PathBuf, Vec<Edit>>,
    /// Content read during the last validation
    original: BTreeMap<PathBuf, String>,
    original_hashes: BTreeMap<PathBuf, u64>,
    /// Patched content, only for files whose edits all applied
    modified: BTreeMap<PathBuf, String>,
    backups: BTreeMap<PathBuf, PathBuf>,
    journal: Option<PathBuf>,
    validation_errors: Vec<FileError>,
    commit_errors: Vec<FileError>,
    rollback_errors: Vec<FileError>,
}

impl Transaction {
    /// Create a transaction on the real filesystem.
    ///
    /// Fails with [`TxError::InvalidOptions`] if `options.base_dir` does not
    /// exist.
    pub fn new(options: TransactionOptions) -> Result<Self, TxError> {
        Self::with_fs(options, Arc::new(OsFileSystem))
    }

    pub fn with_fs(options: TransactionOptions, fs: Arc<dyn FileSystem>) -> Result<Self, TxError> {
        let resolver = PathResolver::new(
            &options.base_dir,
            options.resolved_backup_dir(),
            options.confine_to_base_dir,
        )
        .map_err(|e| {
            TxError::InvalidOptions(format!(
                "base directory {}: {}",
                options.base_dir.display(),
                e
            ))
        })?;

        let id = generate_id();
        log::debug!(
            "Created transaction {} (base {})",
            id,
            resolver.base_dir().display()
        );

        Ok(Self {
            id,
            state: TxState::Pending,
            options,
            resolver,
            fs,
            locks: None,
            created_at: unix_millis(),
            staged: BTreeMap::new(),
            original: BTreeMap::new(),
            original_hashes: BTreeMap::new(),
            modified: BTreeMap::new(),
            backups: BTreeMap::new(),
            journal: None,
            validation_errors: Vec::new(),
            commit_errors: Vec::new(),
            rollback_errors: Vec::new(),
        })
    }

    /// Serialize commits with other transactions sharing `locks`.
    pub fn with_locks(mut self, locks: PathLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Creation time in Unix milliseconds.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn base_dir(&self) -> &Path {
        self.resolver.base_dir()
    }

    pub fn backup_dir(&self) -> &Path {
        self.resolver.backup_dir()
    }

    /// Canonical paths with at least one staged edit.
    pub fn staged_files(&self) -> impl Iterator<Item = &Path> {
        self.staged.keys().map(PathBuf::as_path)
    }

    pub fn staged_edits(&self, file_path: impl AsRef<Path>) -> Option<&[Edit]> {
        let key = self.resolver.resolve(file_path).ok()?;
        self.staged.get(&key).map(Vec::as_slice)
    }

    pub fn edit_count(&self) -> usize {
        self.staged.values().map(Vec::len).sum()
    }

    /// Backup copy per canonical path.
    pub fn backups(&self) -> &BTreeMap<PathBuf, PathBuf> {
        &self.backups
    }

    pub fn validation_errors(&self) -> &[FileError] {
        &self.validation_errors
    }

    pub fn commit_errors(&self) -> &[FileError] {
        &self.commit_errors
    }

    pub fn rollback_errors(&self) -> &[FileError] {
        &self.rollback_errors
    }

    fn transition(&mut self, next: TxState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        log::debug!("Transaction {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    /// Stage one edit. Returns the canonical path it was staged under.
    pub fn stage(
        &mut self,
        file_path: impl AsRef<Path>,
        search_block: impl Into<String>,
        replace_block: impl Into<String>,
    ) -> Result<PathBuf, TxError> {
        let file_path = file_path.as_ref();
        let request = EditRequest::new(
            file_path.to_string_lossy(),
            search_block,
            replace_block,
        );
        TxOperation::Stage.check(&self.id, self.state)?;
        validate_edit(&request).into_result()?;

        let EditRequest {
            search_block,
            replace_block,
            ..
        } = request;
        self.push_edit(
            file_path,
            search_block.unwrap_or_default(),
            replace_block.unwrap_or_default(),
        )
    }

    /// Stage an edit in wire form, reporting missing fields as structural
    /// errors.
    pub fn stage_request(&mut self, request: &EditRequest) -> Result<PathBuf, TxError> {
        TxOperation::Stage.check(&self.id, self.state)?;
        validate_edit(request).into_result()?;

        let file_path = request.file_path.as_deref().unwrap_or_default();
        self.push_edit(
            Path::new(file_path),
            request.search_block.clone().unwrap_or_default(),
            request.replace_block.clone().unwrap_or_default(),
        )
    }

    fn push_edit(
        &mut self,
        file_path: &Path,
        search_block: String,
        replace_block: String,
    ) -> Result<PathBuf, TxError> {
        let key = self.resolver.resolve(file_path)?;
        let edit = Edit::staged(&key, search_block, replace_block);
        let action = if edit.is_deletion() { "deletion" } else { "edit" };
        let edits = self.staged.entry(key.clone()).or_default();
        edits.push(edit);
        log::debug!(
            "Transaction {}: staged {} #{} for {}",
            self.id,
            action,
            edits.len(),
            key.display()
        );
        Ok(key)
    }

    /// Drop every staged edit for one file. Returns whether any were staged.
    pub fn unstage(&mut self, file_path: impl AsRef<Path>) -> Result<bool, TxError> {
        TxOperation::Unstage.check(&self.id, self.state)?;
        let key = self.resolver.resolve(file_path)?;
        self.original.remove(&key);
        self.original_hashes.remove(&key);
        self.modified.remove(&key);
        Ok(self.staged.remove(&key).is_some())
    }

    /// Drop every staged edit and snapshot.
    pub fn clear(&mut self) -> Result<(), TxError> {
        TxOperation::Clear.check(&self.id, self.state)?;
        self.staged.clear();
        self.clear_snapshots();
        self.validation_errors.clear();
        Ok(())
    }

    fn clear_snapshots(&mut self) {
        self.original.clear();
        self.original_hashes.clear();
        self.modified.clear();
    }

    /// Read every staged file and apply its edits in memory.
    ///
    /// Never writes. Ends in `Validated` when every file patched cleanly and
    /// back in `Pending` otherwise, with the problems in the report.
    pub fn validate(&mut self) -> Result<ValidationReport, TxError> {
        TxOperation::Validate.check(&self.id, self.state)?;
        self.transition(TxState::Validating);
        self.clear_snapshots();

        let mut files = Vec::with_capacity(self.staged.len());
        let mut errors = Vec::new();

        for (path, edits) in &self.staged {
            let mut file = FileValidation::new(path);

            let content = match read_text(self.fs.as_ref(), path) {
                Ok(content) => content,
                Err(err) => {
                    if let TxError::FileAccess { kind, .. } = &err {
                        file.exists = *kind != AccessKind::NotFound;
                    }
                    file.errors.push(err.to_string());
                    errors.push(FileError::from_tx_error(path, &err));
                    files.push(file);
                    continue;
                }
            };
            file.exists = true;
            file.readable = true;

            let outcome = apply_patches(&content, edits);
            self.original_hashes
                .insert(path.clone(), content_hash(content.as_bytes()));
            self.original.insert(path.clone(), content);

            if outcome.is_clean() {
                file.edits_valid = true;
                file.preview_available = true;
                self.modified.insert(path.clone(), outcome.final_content);
            } else {
                for failure in &outcome.errors {
                    let error = FileError::from_edit_failure(path, failure);
                    file.errors.push(error.error.clone());
                    errors.push(error);
                }
            }
            files.push(file);
        }

        let valid = errors.is_empty();
        self.validation_errors = errors.clone();
        if valid {
            log::info!(
                "Transaction {}: {} files validated",
                self.id,
                files.len()
            );
            self.transition(TxState::Validated);
        } else {
            log::info!(
                "Transaction {}: validation failed with {} errors",
                self.id,
                errors.len()
            );
            self.transition(TxState::Pending);
        }

        Ok(ValidationReport {
            valid,
            files,
            errors,
        })
    }

    /// Patched content of a validated file.
    pub fn preview(&self, file_path: impl AsRef<Path>) -> Option<&str> {
        let key = self.resolver.resolve(file_path).ok()?;
        self.modified.get(&key).map(String::as_str)
    }

    /// Content captured for a file during validation.
    pub fn original(&self, file_path: impl AsRef<Path>) -> Option<&str> {
        let key = self.resolver.resolve(file_path).ok()?;
        self.original.get(&key).map(String::as_str)
    }

    /// Unified diff between a file's snapshot and its preview.
    pub fn get_diff(&self, file_path: impl AsRef<Path>) -> Option<String> {
        let key = self.resolver.resolve(file_path).ok()?;
        let before = self.original.get(&key)?;
        let after = self.modified.get(&key)?;

        let label = key.display().to_string();
        let diff = TextDiff::from_lines(before.as_str(), after.as_str());
        Some(
            diff.unified_diff()
                .context_radius(3)
                .header(&format!("{label} (original)"), &format!("{label} (modified)"))
                .to_string(),
        )
    }

    /// Copy a file into the backup directory.
    ///
    /// Idempotent per path: a second call returns the first backup.
    pub fn create_backup(&mut self, file_path: impl AsRef<Path>) -> Result<PathBuf, TxError> {
        let key = self.resolver.resolve(file_path)?;
        self.backup_file(&key)
    }

    fn backup_file(&mut self, key: &Path) -> Result<PathBuf, TxError> {
        if let Some(existing) = self.backups.get(key) {
            return Ok(existing.clone());
        }

        let backup_dir = self.resolver.backup_dir().to_path_buf();
        self.fs
            .create_dir_all(&backup_dir)
            .map_err(|source| TxError::Backup {
                path: key.to_path_buf(),
                source,
            })?;

        let base_name = key
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        // Same-named files backed up within one millisecond would collide
        let mut stamp = unix_millis();
        let mut backup = backup_dir.join(format!("{}-{}-{}", self.id, stamp, base_name));
        while self.fs.exists(&backup) {
            stamp += 1;
            backup = backup_dir.join(format!("{}-{}-{}", self.id, stamp, base_name));
        }

        self.fs
            .copy(key, &backup)
            .map_err(|source| TxError::Backup {
                path: key.to_path_buf(),
                source,
            })?;

        log::debug!("Backed up {} to {}", key.display(), backup.display());
        self.backups.insert(key.to_path_buf(), backup.clone());
        Ok(backup)
    }

    /// Write every validated file.
    ///
    /// From `Pending` the transaction validates itself first when
    /// `validate_before_commit` is set; a failed validation is returned as an
    /// unsuccessful report and nothing is written. A failure after the first
    /// write rolls back the files already written before returning.
    pub fn commit(&mut self) -> Result<CommitReport, TxError> {
        TxOperation::Commit.check(&self.id, self.state)?;

        if self.state == TxState::Pending {
            if !self.options.validate_before_commit {
                return Err(TxError::InvalidStateTransition {
                    id: self.id.clone(),
                    operation: TxOperation::Commit,
                    state: self.state,
                });
            }
            let validation = self.validate()?;
            if !validation.valid {
                return Ok(CommitReport::rejected(&self.id, validation.errors));
            }
        }

        let handles = match &self.locks {
            Some(locks) => locks.handles(self.modified.keys().map(PathBuf::as_path)),
            None => Vec::new(),
        };
        let _guards = lock_all(&handles);

        self.transition(TxState::Committing);
        self.commit_errors.clear();
        let targets: Vec<PathBuf> = self.modified.keys().cloned().collect();
        let mut report = CommitReport::empty(&self.id);

        if self.options.create_backups {
            for path in &targets {
                let existed = self.backups.contains_key(path);
                match self.backup_file(path) {
                    Ok(_) if !existed => report.backups_created += 1,
                    Ok(_) => {}
                    Err(err) => return Ok(self.fail_before_write(report, path, err)),
                }
            }
        }

        if self.options.journal {
            if let Err(err) = self.write_journal(&targets) {
                let path = self.resolver.backup_dir().to_path_buf();
                return Ok(self.fail_before_write(report, &path, err));
            }
        }

        let mut written: Vec<PathBuf> = Vec::with_capacity(targets.len());
        for path in &targets {
            if let Err(err) = self.write_target(path) {
                log::warn!(
                    "Transaction {}: write of {} failed, rolling back {} files: {}",
                    self.id,
                    path.display(),
                    written.len(),
                    err
                );
                let error = FileError::from_tx_error(path, &err);
                self.commit_errors.push(error.clone());
                report.errors.push(error);

                let rollback = self.rollback_paths(&written);
                report.errors.extend(rollback.errors);
                report.rollback_performed = true;
                return Ok(report);
            }
            written.push(path.clone());
        }

        report.success = true;
        report.files_committed = written.len();
        report.edits_applied = targets
            .iter()
            .filter_map(|path| self.staged.get(path))
            .map(Vec::len)
            .sum();
        self.remove_journal();
        self.transition(TxState::Committed);

        log::info!("{}", report);
        Ok(report)
    }

    /// Record a failure that happened before any target was written.
    fn fail_before_write(&mut self, mut report: CommitReport, path: &Path, err: TxError) -> CommitReport {
        log::warn!("Transaction {}: {}; nothing written", self.id, err);
        let error = FileError::from_tx_error(path, &err);
        self.commit_errors.push(error.clone());
        report.errors.push(error);
        self.remove_journal();
        self.transition(TxState::Failed);
        report
    }

    fn write_target(&self, path: &Path) -> Result<(), TxError> {
        let Some(content) = self.modified.get(path) else {
            return Ok(());
        };

        if self.options.detect_external_changes {
            if let Some(expected) = self.original_hashes.get(path) {
                let current = self
                    .fs
                    .read(path)
                    .map_err(|e| TxError::file_access(path, e))?;
                if content_hash(&current) != *expected {
                    return Err(TxError::ConcurrentModification {
                        path: path.to_path_buf(),
                    });
                }
            }
        }

        self.fs
            .write(path, content.as_bytes())
            .map_err(|source| TxError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write_journal(&mut self, targets: &[PathBuf]) -> Result<(), TxError> {
        let entries = targets
            .iter()
            .map(|path| {
                let backup_path = self.backups.get(path).cloned();
                JournalEntry {
                    file_path: path.clone(),
                    original: match backup_path {
                        Some(_) => None,
                        None => self.original.get(path).cloned(),
                    },
                    backup_path,
                    original_hash: self.original_hashes.get(path).copied().unwrap_or_default(),
                    modified_hash: self
                        .modified
                        .get(path)
                        .map(|content| content_hash(content.as_bytes()))
                        .unwrap_or_default(),
                }
            })
            .collect();

        let journal = Journal {
            transaction_id: self.id.clone(),
            created_at: unix_millis(),
            entries,
        };

        let backup_dir = self.resolver.backup_dir();
        self.fs
            .create_dir_all(backup_dir)
            .map_err(|e| TxError::Journal {
                path: backup_dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        self.journal = Some(journal.write(self.fs.as_ref(), backup_dir)?);
        Ok(())
    }

    fn remove_journal(&mut self) {
        if let Some(path) = self.journal.take() {
            if let Err(err) = self.fs.remove_file(&path) {
                log::warn!("Could not remove journal {}: {}", path.display(), err);
            }
        }
    }

    /// Restore every file captured in the snapshot.
    pub fn rollback(&mut self) -> Result<RollbackReport, TxError> {
        TxOperation::Rollback.check(&self.id, self.state)?;
        let targets: Vec<PathBuf> = self.original.keys().cloned().collect();
        Ok(self.rollback_paths(&targets))
    }

    /// Restore a subset of the snapshot. Paths outside it are reported as
    /// rollback errors.
    pub fn rollback_files<P: AsRef<Path>>(&mut self, files: &[P]) -> Result<RollbackReport, TxError> {
        TxOperation::Rollback.check(&self.id, self.state)?;
        let mut targets = Vec::with_capacity(files.len());
        for file in files {
            targets.push(self.resolver.resolve(file)?);
        }
        Ok(self.rollback_paths(&targets))
    }

    fn rollback_paths(&mut self, targets: &[PathBuf]) -> RollbackReport {
        self.transition(TxState::RollingBack);
        self.rollback_errors.clear();

        let mut files_rolled_back = 0;
        for path in targets {
            match self.restore_file(path) {
                Ok(()) => files_rolled_back += 1,
                Err(err) => {
                    log::error!("Transaction {}: {}", self.id, err);
                    self.rollback_errors
                        .push(FileError::from_tx_error(path, &err));
                }
            }
        }

        let success = self.rollback_errors.is_empty();
        if success {
            self.remove_journal();
            self.transition(TxState::RolledBack);
            log::info!(
                "Transaction {}: rolled back {} files",
                self.id,
                files_rolled_back
            );
        } else {
            self.transition(TxState::Failed);
        }

        RollbackReport {
            success,
            files_rolled_back,
            errors: self.rollback_errors.clone(),
        }
    }

    fn restore_file(&self, path: &Path) -> Result<(), TxError> {
        if let Some(backup) = self.backups.get(path) {
            match self.fs.read(backup).and_then(|bytes| self.fs.write(path, &bytes)) {
                Ok(()) => return Ok(()),
                Err(err) => log::warn!(
                    "Restoring {} from {} failed ({}); using in-memory snapshot",
                    path.display(),
                    backup.display(),
                    err
                ),
            }
        }

        let original = self.original.get(path).ok_or_else(|| TxError::Rollback {
            path: path.to_path_buf(),
            reason: "no snapshot recorded".to_string(),
        })?;
        self.fs
            .write(path, original.as_bytes())
            .map_err(|e| TxError::Rollback {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Discard the transaction without touching any file.
    pub fn abort(&mut self) -> Result<(), TxError> {
        TxOperation::Abort.check(&self.id, self.state)?;
        self.staged.clear();
        self.clear_snapshots();
        self.transition(TxState::Aborted);
        log::info!("Transaction {} aborted", self.id);
        Ok(())
    }

    /// Delete every backup this transaction created. Returns how many were
    /// removed; failures are logged and skipped.
    pub fn cleanup_backups(&mut self) -> usize {
        let backups = std::mem::take(&mut self.backups);
        let mut removed = 0;
        for backup in backups.values() {
            match self.fs.remove_file(backup) {
                Ok(()) => removed += 1,
                Err(err) => log::debug!("Could not remove backup {}: {}", backup.display(), err),
            }
        }
        removed
    }
}

fn read_text(fs: &dyn FileSystem, path: &Path) -> Result<String, TxError> {
    let bytes = fs.read(path).map_err(|e| TxError::file_access(path, e))?;
    String::from_utf8(bytes)
        .map_err(|e| TxError::file_access(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}
