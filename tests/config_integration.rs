//! Integration tests for configuration loading and its effect on transactions.

use file_tx::config::{
    load_from_path, load_from_str, ConfigError, EngineConfig, TransactionOverrides,
};
use file_tx::{EditRequest, TransactionManager};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a temp dir with one file and a config next to it
fn setup_with_config(config: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), "draft: version one\n").unwrap();
    let config_path = dir.path().join(".file-tx.toml");
    fs::write(&config_path, config).unwrap();
    (dir, config_path)
}

#[test]
fn test_defaults_when_table_missing() {
    let config = load_from_str("base_dir = \"/srv/project\"").unwrap();
    assert_eq!(config, EngineConfig::new("/srv/project"));
}

#[test]
fn test_unknown_type_is_toml_error() {
    let err = load_from_str("base_dir = \"/x\"\nmax_history = \"lots\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml { .. }));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_config_drives_backup_location() {
    let (dir, config_path) = setup_with_config(
        r#"
base_dir = "."

[transaction]
backup_dir = "snapshots"
"#,
    );
    let config = load_from_path(&config_path).unwrap();
    let mut manager = TransactionManager::new(config).unwrap();

    let edits = vec![EditRequest::new("notes.txt", "version one", "version two")];
    let report = manager.execute(&edits, TransactionOverrides::none()).unwrap();

    assert!(report.success, "{:?}", report.errors);
    let backups: Vec<_> = fs::read_dir(dir.path().join("snapshots"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].starts_with(&report.transaction_id));
    assert!(backups[0].ends_with("-notes.txt"));
}

#[test]
fn test_config_disables_backups() {
    let (dir, config_path) = setup_with_config(
        r#"
base_dir = "."

[transaction]
create_backups = false
"#,
    );
    let mut manager = TransactionManager::new(load_from_path(&config_path).unwrap()).unwrap();

    let edits = vec![EditRequest::new("notes.txt", "version one", "version two")];
    let report = manager.execute(&edits, TransactionOverrides::none()).unwrap();

    assert!(report.success);
    assert_eq!(report.backups_created, 0);
    assert!(!dir.path().join(".file-tx-backups").exists());
}

#[test]
fn test_override_beats_config() {
    let (dir, config_path) = setup_with_config(
        r#"
base_dir = "."

[transaction]
create_backups = false
"#,
    );
    let mut manager = TransactionManager::new(load_from_path(&config_path).unwrap()).unwrap();

    let overrides = TransactionOverrides {
        create_backups: Some(true),
        ..TransactionOverrides::default()
    };
    let edits = vec![EditRequest::new("notes.txt", "version one", "version two")];
    let report = manager.execute(&edits, overrides).unwrap();

    assert!(report.success);
    assert_eq!(report.backups_created, 1);
    assert!(dir.path().join(".file-tx-backups").is_dir());
}

#[test]
fn test_validation_error_lists_every_issue() {
    let err = load_from_str(
        r#"
base_dir = ""
max_history = 0
"#,
    )
    .unwrap_err();

    match err {
        ConfigError::Validation { source, .. } => assert_eq!(source.issues.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}
