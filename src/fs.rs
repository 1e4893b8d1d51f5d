//! Filesystem access used by transactions.
//!
//! Every read, write, copy and delete a transaction performs goes through
//! [`FileSystem`], so the order of durable effects is explicit and tests can
//! inject failures at precise points of a commit or rollback.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Blocking filesystem operations.
///
/// Implementations must make `write` and `copy` durable before returning:
/// a transaction treats a successful return as "this file is on disk".
pub trait FileSystem: fmt::Debug + Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file's contents.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Copy `from` to `to`, returning the number of bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem.
///
/// Writes are atomic (tempfile + fsync + rename) and bump the mtime so that
/// build tools notice the change.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        // A rename ignores the target's own mode; read-only files must fail here
        if path.exists() {
            fs::OpenOptions::new().write(true).open(path)?;
        }
        atomic_write(path, contents)?;

        let now = filetime::FileTime::now();
        filetime::set_file_mtime(path, now)?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let bytes = fs::copy(from, to)?;
        fs::File::open(to)?.sync_all()?;
        Ok(bytes)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write lands or the target is untouched. Existing
/// permissions are carried over to the replacement file.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Path has no parent directory")
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
