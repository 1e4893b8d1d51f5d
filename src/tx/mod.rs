pub mod journal;
pub mod lock;
pub mod manager;
pub mod report;
pub mod state;
pub mod transaction;

pub use journal::{recover, Journal, JournalEntry, RecoveryReport};
pub use lock::PathLocks;
pub use manager::{HistoryEntry, ManagerStatus, TransactionManager};
pub use report::{CommitReport, FileError, FileValidation, RollbackReport, ValidationReport};
pub use state::{TxOperation, TxState};
pub use transaction::Transaction;
