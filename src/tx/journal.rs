//! Commit journal and crash recovery.
//!
//! With journaling enabled, a commit records what it is about to overwrite in
//! `{backup_dir}/{id}.journal.json` after its backups are durable and before
//! the first target write. A completed commit or a fully successful rollback
//! removes the journal, so any journal found later belongs to a commit that
//! was interrupted (process crash) or whose rollback failed.
//!
//! [`recover`] restores every journaled file whose on-disk content no longer
//! matches its recorded pre-image hash.

use crate::error::{FailureKind, TxError};
use crate::fs::FileSystem;
use crate::tx::report::FileError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

pub const JOURNAL_SUFFIX: &str = ".journal.json";

/// xxh3 hash used to compare file contents against snapshots.
pub fn content_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

pub fn journal_path(backup_dir: &Path, transaction_id: &str) -> PathBuf {
    backup_dir.join(format!("{transaction_id}{JOURNAL_SUFFIX}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
    pub transaction_id: String,
    pub created_at: u64,
    pub entries: Vec<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub file_path: PathBuf,
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
    pub original_hash: u64,
    pub modified_hash: u64,
    /// Pre-image text, recorded only when there is no backup copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

impl Journal {
    /// Persist atomically under `backup_dir`, returning the journal path.
    pub fn write(&self, fs: &dyn FileSystem, backup_dir: &Path) -> Result<PathBuf, TxError> {
        let path = journal_path(backup_dir, &self.transaction_id);
        let json = serde_json::to_vec_pretty(self).map_err(|e| TxError::Journal {
            path: path.clone(),
            reason: format!("serialize: {e}"),
        })?;

        fs.write(&path, &json).map_err(|e| TxError::Journal {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }

    pub fn read(fs: &dyn FileSystem, path: &Path) -> Result<Self, TxError> {
        let bytes = fs.read(path).map_err(|e| TxError::Journal {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| TxError::Journal {
            path: path.to_path_buf(),
            reason: format!("parse: {e}"),
        })
    }
}

/// Report of a [`recover`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// Journals found in the backup directory
    pub journals: usize,
    /// Journals fully replayed and removed
    pub journals_resolved: usize,
    pub files_restored: usize,
    /// Files already matching their pre-image
    pub files_unchanged: usize,
    pub errors: Vec<FileError>,
}

impl RecoveryReport {
    /// Check if any recovery actions were needed
    pub fn had_work(&self) -> bool {
        self.journals > 0
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Replay every journal left in `backup_dir`.
///
/// A journal whose entries are all restored (or already intact) is deleted
/// together with its backups. Journals with unrestorable entries stay in place
/// for a later attempt.
pub fn recover(backup_dir: &Path, fs: &dyn FileSystem) -> RecoveryReport {
    let mut report = RecoveryReport::default();
    if !backup_dir.is_dir() {
        return report;
    }

    let mut journals: Vec<PathBuf> = WalkDir::new(backup_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(JOURNAL_SUFFIX))
        })
        .collect();
    journals.sort();

    for path in journals {
        report.journals += 1;
        let journal = match Journal::read(fs, &path) {
            Ok(journal) => journal,
            Err(err) => {
                log::warn!("Skipping unreadable journal {}: {}", path.display(), err);
                report.errors.push(FileError::from_tx_error(&path, &err));
                continue;
            }
        };

        log::info!(
            "Recovering interrupted transaction {} ({} files)",
            journal.transaction_id,
            journal.entries.len()
        );

        let mut clean = true;
        for entry in &journal.entries {
            match restore_entry(fs, entry) {
                Ok(true) => report.files_restored += 1,
                Ok(false) => report.files_unchanged += 1,
                Err(err) => {
                    clean = false;
                    report.errors.push(FileError::from_tx_error(&entry.file_path, &err));
                }
            }
        }

        if clean {
            for backup in journal.entries.iter().filter_map(|e| e.backup_path.as_ref()) {
                let _ = fs.remove_file(backup);
            }
            if let Err(err) = fs.remove_file(&path) {
                log::warn!("Could not remove journal {}: {}", path.display(), err);
            }
            report.journals_resolved += 1;
        }
    }

    if report.had_work() {
        log::info!(
            "Recovery complete: {} journals, {} files restored, {} unchanged, {} errors",
            report.journals,
            report.files_restored,
            report.files_unchanged,
            report.errors.len()
        );
    }

    report
}

/// Restore one entry. Returns `Ok(false)` when the file already matches.
fn restore_entry(fs: &dyn FileSystem, entry: &JournalEntry) -> Result<bool, TxError> {
    if let Ok(current) = fs.read(&entry.file_path) {
        if content_hash(&current) == entry.original_hash {
            return Ok(false);
        }
    }

    let from_backup = entry
        .backup_path
        .as_ref()
        .and_then(|backup| fs.read(backup).ok())
        .filter(|bytes| content_hash(bytes) == entry.original_hash);

    let pre_image = match (from_backup, &entry.original) {
        (Some(bytes), _) => bytes,
        (None, Some(original)) => original.clone().into_bytes(),
        (None, None) => {
            return Err(TxError::Rollback {
                path: entry.file_path.clone(),
                reason: "no intact backup or recorded pre-image".to_string(),
            })
        }
    };

    fs.write(&entry.file_path, &pre_image)
        .map_err(|e| TxError::Rollback {
            path: entry.file_path.clone(),
            reason: e.to_string(),
        })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFileSystem;
    use std::fs;

    fn entry_for(path: &Path, original: &str, modified: &str) -> JournalEntry {
        JournalEntry {
            file_path: path.to_path_buf(),
            backup_path: None,
            original_hash: content_hash(original.as_bytes()),
            modified_hash: content_hash(modified.as_bytes()),
            original: None,
        }
    }

    #[test]
    fn test_journal_roundtrip_on_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal {
            transaction_id: "tx-1".to_string(),
            created_at: 42,
            entries: vec![entry_for(Path::new("/w/a.txt"), "a", "b")],
        };

        let path = journal.write(&OsFileSystem, temp_dir.path()).unwrap();
        assert_eq!(path, temp_dir.path().join("tx-1.journal.json"));
        assert_eq!(Journal::read(&OsFileSystem, &path).unwrap(), journal);
    }

    #[test]
    fn test_recover_restores_from_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backups = temp_dir.path().join("backups");
        fs::create_dir_all(&backups).unwrap();

        let target = temp_dir.path().join("a.txt");
        let backup = backups.join("tx-1-0-a.txt");
        fs::write(&target, "half written").unwrap();
        fs::write(&backup, "original").unwrap();

        let mut entry = entry_for(&target, "original", "modified");
        entry.backup_path = Some(backup.clone());
        Journal {
            transaction_id: "tx-1".to_string(),
            created_at: 0,
            entries: vec![entry],
        }
        .write(&OsFileSystem, &backups)
        .unwrap();

        let report = recover(&backups, &OsFileSystem);
        assert_eq!(report.journals, 1);
        assert_eq!(report.journals_resolved, 1);
        assert_eq!(report.files_restored, 1);
        assert!(report.is_clean());
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(!backup.exists());
        assert!(!journal_path(&backups, "tx-1").exists());
    }

    #[test]
    fn test_recover_uses_inline_pre_image_and_skips_intact_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backups = temp_dir.path().join("backups");
        fs::create_dir_all(&backups).unwrap();

        let changed = temp_dir.path().join("changed.txt");
        let intact = temp_dir.path().join("intact.txt");
        fs::write(&changed, "modified").unwrap();
        fs::write(&intact, "same").unwrap();

        let mut changed_entry = entry_for(&changed, "before", "modified");
        changed_entry.original = Some("before".to_string());
        Journal {
            transaction_id: "tx-2".to_string(),
            created_at: 0,
            entries: vec![changed_entry, entry_for(&intact, "same", "other")],
        }
        .write(&OsFileSystem, &backups)
        .unwrap();

        let report = recover(&backups, &OsFileSystem);
        assert_eq!(report.files_restored, 1);
        assert_eq!(report.files_unchanged, 1);
        assert_eq!(fs::read_to_string(&changed).unwrap(), "before");
    }

    #[test]
    fn test_recover_keeps_journal_when_unrestorable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backups = temp_dir.path().join("backups");
        fs::create_dir_all(&backups).unwrap();

        let target = temp_dir.path().join("a.txt");
        fs::write(&target, "modified").unwrap();
        Journal {
            transaction_id: "tx-3".to_string(),
            created_at: 0,
            entries: vec![entry_for(&target, "original", "modified")],
        }
        .write(&OsFileSystem, &backups)
        .unwrap();

        let report = recover(&backups, &OsFileSystem);
        assert_eq!(report.journals_resolved, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, FailureKind::Rollback);
        assert!(journal_path(&backups, "tx-3").exists());
    }

    #[test]
    fn test_recover_reports_corrupt_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("tx-bad.journal.json"), "{not json").unwrap();

        let report = recover(temp_dir.path(), &OsFileSystem);
        assert_eq!(report.journals, 1);
        assert_eq!(report.errors[0].kind, FailureKind::Journal);
    }

    #[test]
    fn test_recover_missing_dir_is_noop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let report = recover(&temp_dir.path().join("absent"), &OsFileSystem);
        assert!(!report.had_work());
    }
}
