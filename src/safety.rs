use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Resolves edit paths to the canonical keys used by a transaction.
///
/// Relative paths resolve against the base directory. `.` and `..` are folded
/// lexically, then symlinks are resolved when the file (or, for files that do
/// not exist yet, its parent directory) is present on disk, so two spellings
/// of the same file always map to one key.
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Canonical base directory
    base_dir: PathBuf,
    /// Backup directory, never a valid edit target
    backup_dir: PathBuf,
    /// Reject paths outside `base_dir`
    confine: bool,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("empty file path")]
    EmptyPath,

    #[error("Path is outside base directory: {path} (base: {base})")]
    OutsideBaseDir { path: PathBuf, base: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl PathResolver {
    /// Create a resolver rooted at `base_dir`, which must exist.
    pub fn new(
        base_dir: impl AsRef<Path>,
        backup_dir: impl AsRef<Path>,
        confine: bool,
    ) -> Result<Self, SafetyError> {
        let base_dir = base_dir.as_ref().canonicalize()?;
        let backup_dir = canonicalize_lenient(&absolutize(&base_dir, backup_dir.as_ref()));

        Ok(Self {
            base_dir,
            backup_dir,
            confine,
        })
    }

    /// Resolve `path` to its canonical key.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
            return Err(SafetyError::EmptyPath);
        }

        let canonical = canonicalize_lenient(&absolutize(&self.base_dir, path));
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if canonical.starts_with(&self.backup_dir) {
            return Err(SafetyError::ForbiddenPath {
                path: canonical.to_path_buf(),
                forbidden: self.backup_dir.clone(),
            });
        }

        if self.confine && !canonical.starts_with(&self.base_dir) {
            return Err(SafetyError::OutsideBaseDir {
                path: canonical.to_path_buf(),
                base: self.base_dir.clone(),
            });
        }

        Ok(())
    }

    /// Get the canonical base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the resolved backup directory.
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }
}

/// Join `path` onto `base` when relative, then fold `.` and `..` lexically.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    normalize_lexically(&joined)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize as much of `path` as exists.
///
/// Existing files resolve fully. For a missing file, the parent is
/// canonicalized and the file name re-attached; otherwise the lexical form is
/// returned unchanged.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn resolver(base: &Path, confine: bool) -> PathResolver {
        PathResolver::new(base, ".file-tx-backups", confine).unwrap()
    }

    #[test]
    fn test_resolve_relative_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("test.rs"), b"").unwrap();

        let resolved = resolver(base, false).resolve("test.rs").unwrap();
        assert_eq!(resolved, base.canonicalize().unwrap().join("test.rs"));
    }

    #[test]
    fn test_relative_and_absolute_spellings_agree() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();
        fs::create_dir_all(base.join("src")).unwrap();
        fs::write(base.join("src/lib.rs"), b"").unwrap();

        let resolver = resolver(base, false);
        let a = resolver.resolve("src/lib.rs").unwrap();
        let b = resolver.resolve("./src/../src/lib.rs").unwrap();
        let c = resolver.resolve(base.join("src/lib.rs")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_resolve_missing_file_uses_parent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();

        let resolved = resolver(base, false).resolve("not-yet.txt").unwrap();
        assert_eq!(resolved, base.canonicalize().unwrap().join("not-yet.txt"));
    }

    #[test]
    fn test_resolve_empty_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = resolver(temp_dir.path(), false).resolve("");
        assert!(matches!(result, Err(SafetyError::EmptyPath)));
    }

    #[test]
    fn test_outside_base_dir_when_confined() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().join("workspace");
        fs::create_dir_all(&base).unwrap();
        let outside = temp_dir.path().join("outside.rs");
        fs::write(&outside, b"").unwrap();

        let result = resolver(&base, true).resolve(&outside);
        assert!(matches!(result, Err(SafetyError::OutsideBaseDir { .. })));

        let result = resolver(&base, true).resolve("../outside.rs");
        assert!(matches!(result, Err(SafetyError::OutsideBaseDir { .. })));

        assert!(resolver(&base, false).resolve(&outside).is_ok());
    }

    #[test]
    fn test_backup_dir_is_forbidden() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();
        fs::create_dir_all(base.join(".file-tx-backups")).unwrap();

        let result = resolver(base, false).resolve(".file-tx-backups/tx-1-0-a.txt");
        assert!(matches!(result, Err(SafetyError::ForbiddenPath { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_escape_when_confined() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().join("workspace");
        fs::create_dir_all(&base).unwrap();

        let outside = temp_dir.path().join("outside.rs");
        fs::write(&outside, b"").unwrap();

        let link = base.join("escape.rs");
        symlink(&outside, &link).unwrap();

        let result = resolver(&base, true).resolve(&link);
        assert!(matches!(result, Err(SafetyError::OutsideBaseDir { .. })));
    }

    #[test]
    fn test_normalize_parent_at_root() {
        assert_eq!(
            absolutize(Path::new("/"), Path::new("../../etc/hosts")),
            PathBuf::from("/etc/hosts")
        );
    }
}
