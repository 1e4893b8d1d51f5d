pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    EngineConfig, TransactionDefaults, TransactionOptions, TransactionOverrides, ValidationError,
    ValidationIssue, CONFIG_FILE_NAME, DEFAULT_BACKUP_DIR, DEFAULT_MAX_HISTORY,
};
