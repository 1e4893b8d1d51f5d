//! Registry of live transactions with a bounded history of retired ones.

use crate::config::{EngineConfig, TransactionOverrides};
use crate::edit::{unix_millis, EditRequest};
use crate::error::TxError;
use crate::fs::{FileSystem, OsFileSystem};
use crate::safety::absolutize;
use crate::tx::journal::{self, RecoveryReport};
use crate::tx::lock::PathLocks;
use crate::tx::report::{CommitReport, FileError, RollbackReport};
use crate::tx::state::TxState;
use crate::tx::transaction::Transaction;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// A transaction removed from the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub final_state: TxState,
    pub created_at: u64,
    pub removed_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    pub active: usize,
    pub by_state: BTreeMap<TxState, usize>,
    pub history_size: usize,
}

#[derive(Debug)]
pub struct TransactionManager {
    config: EngineConfig,
    fs: Arc<dyn FileSystem>,
    locks: PathLocks,
    transactions: BTreeMap<String, Transaction>,
    history: VecDeque<HistoryEntry>,
}

impl TransactionManager {
    pub fn new(config: EngineConfig) -> Result<Self, TxError> {
        Self::with_fs(config, Arc::new(OsFileSystem))
    }

    pub fn with_fs(config: EngineConfig, fs: Arc<dyn FileSystem>) -> Result<Self, TxError> {
        config
            .validate()
            .map_err(|e| TxError::InvalidOptions(e.to_string()))?;

        Ok(Self {
            config,
            fs,
            locks: PathLocks::new(),
            transactions: BTreeMap::new(),
            history: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lock table shared by every transaction this manager creates.
    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Create and register a transaction from the manager defaults plus
    /// `overrides`.
    pub fn create(&mut self, overrides: TransactionOverrides) -> Result<&mut Transaction, TxError> {
        let options = self.config.transaction_options().merged(&overrides);
        let tx = Transaction::with_fs(options, Arc::clone(&self.fs))?
            .with_locks(self.locks.clone());

        match self.transactions.entry(tx.id().to_string()) {
            Entry::Vacant(slot) => {
                log::debug!("Registered transaction {}", tx.id());
                Ok(slot.insert(tx))
            }
            Entry::Occupied(slot) => Err(TxError::InvalidOptions(format!(
                "duplicate transaction id {}",
                slot.key()
            ))),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Transaction> {
        self.transactions.get_mut(id)
    }

    /// Roll back a registered transaction, typically one `execute` committed.
    pub fn rollback(&mut self, id: &str) -> Result<RollbackReport, TxError> {
        self.transactions
            .get_mut(id)
            .ok_or_else(|| TxError::UnknownTransaction(id.to_string()))?
            .rollback()
    }

    /// Live transactions, optionally only those in `state`.
    pub fn list(&self, state: Option<TxState>) -> Vec<&Transaction> {
        self.transactions
            .values()
            .filter(|tx| state.map_or(true, |s| tx.state() == s))
            .collect()
    }

    /// Retire a transaction into history. Files are not touched.
    pub fn remove(&mut self, id: &str) -> Option<HistoryEntry> {
        let tx = self.transactions.remove(id)?;
        let entry = HistoryEntry {
            id: tx.id().to_string(),
            final_state: tx.state(),
            created_at: tx.created_at(),
            removed_at: unix_millis(),
        };

        self.history.push_back(entry.clone());
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }
        log::debug!("Retired transaction {} ({})", entry.id, entry.final_state);
        Some(entry)
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn status(&self) -> ManagerStatus {
        let mut by_state = BTreeMap::new();
        for tx in self.transactions.values() {
            *by_state.entry(tx.state()).or_insert(0) += 1;
        }
        ManagerStatus {
            active: self.transactions.len(),
            by_state,
            history_size: self.history.len(),
        }
    }

    /// Stage, validate and commit `edits` in a fresh transaction.
    ///
    /// A transaction whose edits fail staging or validation is aborted and
    /// retired, and the problems come back as an unsuccessful report. A
    /// committed (or rolled back) transaction stays registered so the caller
    /// can still inspect or roll it back.
    pub fn execute(
        &mut self,
        edits: &[EditRequest],
        overrides: TransactionOverrides,
    ) -> Result<CommitReport, TxError> {
        let cleanup = self.config.cleanup_backups_on_success;
        let tx = self.create(overrides)?;
        let id = tx.id().to_string();

        let mut staging_errors = Vec::new();
        for request in edits {
            if let Err(err) = tx.stage_request(request) {
                let path = request.file_path.as_deref().unwrap_or_default();
                staging_errors.push(FileError::from_tx_error(Path::new(path), &err));
            }
        }

        let rejected = if staging_errors.is_empty() {
            let validation = tx.validate()?;
            (!validation.valid).then_some(validation.errors)
        } else {
            Some(staging_errors)
        };

        if let Some(errors) = rejected {
            tx.abort()?;
            self.remove(&id);
            log::info!("Transaction {} rejected with {} errors", id, errors.len());
            return Ok(CommitReport::rejected(&id, errors));
        }

        let report = tx.commit()?;
        if report.success && cleanup {
            let removed = tx.cleanup_backups();
            log::debug!("Transaction {}: removed {} backups", id, removed);
        }
        Ok(report)
    }

    /// Replay journals left in the default backup directory.
    pub fn recover(&self) -> RecoveryReport {
        let options = self.config.transaction_options();
        let backup_dir = absolutize(&options.base_dir, &options.resolved_backup_dir());
        journal::recover(&backup_dir, self.fs.as_ref())
    }
}
