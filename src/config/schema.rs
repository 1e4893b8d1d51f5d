use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKUP_DIR: &str = ".file-tx-backups";
pub const DEFAULT_MAX_HISTORY: usize = 100;
/// Config file looked up in the base directory by the CLI.
pub const CONFIG_FILE_NAME: &str = ".file-tx.toml";

fn default_true() -> bool {
    true
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

/// Manager-level configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory relative edit paths resolve against
    pub base_dir: PathBuf,
    /// Retired transactions kept in history
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Delete backups after a successful `execute`
    #[serde(default)]
    pub cleanup_backups_on_success: bool,
    #[serde(default)]
    pub transaction: TransactionDefaults,
}

impl EngineConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_history: DEFAULT_MAX_HISTORY,
            cleanup_backups_on_success: false,
            transaction: TransactionDefaults::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.base_dir.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField { field: "base_dir" });
        }
        if self.max_history == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "max_history",
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(backup_dir) = &self.transaction.backup_dir {
            if backup_dir.as_os_str().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    field: "transaction.backup_dir",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Per-transaction options derived from this configuration.
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions {
            base_dir: self.base_dir.clone(),
            backup_dir: self.transaction.backup_dir.clone(),
            create_backups: self.transaction.create_backups,
            validate_before_commit: self.transaction.validate_before_commit,
            detect_external_changes: self.transaction.detect_external_changes,
            journal: self.transaction.journal,
            confine_to_base_dir: self.transaction.confine_to_base_dir,
        }
    }
}

/// `[transaction]` table: defaults for every transaction a manager creates.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TransactionDefaults {
    /// Backup location, relative to `base_dir` unless absolute
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub create_backups: bool,
    #[serde(default = "default_true")]
    pub validate_before_commit: bool,
    #[serde(default = "default_true")]
    pub detect_external_changes: bool,
    #[serde(default)]
    pub journal: bool,
    #[serde(default)]
    pub confine_to_base_dir: bool,
}

impl Default for TransactionDefaults {
    fn default() -> Self {
        Self {
            backup_dir: None,
            create_backups: true,
            validate_before_commit: true,
            detect_external_changes: true,
            journal: false,
            confine_to_base_dir: false,
        }
    }
}

/// Resolved options for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    pub base_dir: PathBuf,
    /// `None` means `{base_dir}/.file-tx-backups`
    pub backup_dir: Option<PathBuf>,
    /// Copy every target before the first write
    pub create_backups: bool,
    /// Let `commit()` validate a pending transaction itself
    pub validate_before_commit: bool,
    /// Refuse to overwrite files whose content changed since validation
    pub detect_external_changes: bool,
    /// Persist a recovery journal during commit
    pub journal: bool,
    pub confine_to_base_dir: bool,
}

impl TransactionOptions {
    /// Defaults rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        EngineConfig::new(base_dir).transaction_options()
    }

    pub fn with_backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(backup_dir.into());
        self
    }

    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.create_backups = enabled;
        self
    }

    pub fn with_validate_before_commit(mut self, enabled: bool) -> Self {
        self.validate_before_commit = enabled;
        self
    }

    pub fn with_external_change_detection(mut self, enabled: bool) -> Self {
        self.detect_external_changes = enabled;
        self
    }

    pub fn with_journal(mut self, enabled: bool) -> Self {
        self.journal = enabled;
        self
    }

    pub fn confined(mut self, enabled: bool) -> Self {
        self.confine_to_base_dir = enabled;
        self
    }

    /// Apply per-call overrides on top of these options.
    pub fn merged(mut self, overrides: &TransactionOverrides) -> Self {
        if let Some(base_dir) = &overrides.base_dir {
            self.base_dir = base_dir.clone();
        }
        if let Some(backup_dir) = &overrides.backup_dir {
            self.backup_dir = Some(backup_dir.clone());
        }
        if let Some(v) = overrides.create_backups {
            self.create_backups = v;
        }
        if let Some(v) = overrides.validate_before_commit {
            self.validate_before_commit = v;
        }
        if let Some(v) = overrides.detect_external_changes {
            self.detect_external_changes = v;
        }
        if let Some(v) = overrides.journal {
            self.journal = v;
        }
        if let Some(v) = overrides.confine_to_base_dir {
            self.confine_to_base_dir = v;
        }
        self
    }

    /// Backup directory as configured, relative paths joined to `base_dir`.
    pub fn resolved_backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.join(DEFAULT_BACKUP_DIR),
        }
    }
}

/// Optional per-call overrides for [`TransactionOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOverrides {
    pub base_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub create_backups: Option<bool>,
    pub validate_before_commit: Option<bool>,
    pub detect_external_changes: Option<bool>,
    pub journal: Option<bool>,
    pub confine_to_base_dir: Option<bool>,
}

impl TransactionOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn base_dir(path: &Path) -> Self {
        Self {
            base_dir: Some(path.to_path_buf()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    OutOfRange {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "config missing required field '{field}'")
            }
            ValidationIssue::OutOfRange { field, message } => {
                write!(f, "config field '{field}' out of range: {message}")
            }
        }
    }
}
