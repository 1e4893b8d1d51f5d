use crate::config::schema::{EngineConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

/// Load a config file. A relative `base_dir` is taken relative to the
/// directory containing the file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = load_from_str(&contents).map_err(|error| error.with_path(path))?;

    if config.base_dir.is_relative() {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        config.base_dir = parent.join(&config.base_dir);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal() {
        let config = load_from_str("base_dir = \"/work\"").unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/work"));
        assert_eq!(config.max_history, 100);
        assert!(config.transaction.create_backups);
    }

    #[test]
    fn test_load_transaction_table() {
        let input = r#"
base_dir = "/work"
max_history = 5
cleanup_backups_on_success = true

[transaction]
backup_dir = "/tmp/bk"
create_backups = false
journal = true
"#;
        let config = load_from_str(input).unwrap();
        assert_eq!(config.max_history, 5);
        assert!(config.cleanup_backups_on_success);
        assert_eq!(config.transaction.backup_dir, Some(PathBuf::from("/tmp/bk")));
        assert!(!config.transaction.create_backups);
        assert!(config.transaction.journal);
        assert!(config.transaction.detect_external_changes);
    }

    #[test]
    fn test_toml_error_display() {
        let err = load_from_str("base_dir = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: None, .. }));
        assert!(err.to_string().starts_with("failed to parse config TOML"));
    }

    #[test]
    fn test_validation_error_attaches_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cfg.toml");
        fs::write(&path, "base_dir = \"/work\"\nmax_history = 0\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        match err {
            ConfigError::Validation { path: Some(p), .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_relative_base_dir_resolves_against_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cfg.toml");
        fs::write(&path, "base_dir = \"project\"\n").unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.base_dir, temp_dir.path().join("project"));
    }
}
