//! Per-path commit locks shared between transactions.
//!
//! Two transactions committing the same canonical path would otherwise race:
//! the later write wins and the earlier transaction's pre-image no longer
//! matches the disk. Holding the path's lock for the whole commit (including
//! any rollback it triggers) serializes those writes inside one process. It
//! does nothing against other processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type PathLock = Arc<Mutex<()>>;

#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    table: Arc<Mutex<HashMap<PathBuf, PathLock>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handles for `paths`, sorted and deduplicated.
    ///
    /// Always lock the returned handles front to back (see [`lock_all`]) so
    /// that concurrent committers cannot deadlock.
    pub fn handles<'p, I>(&self, paths: I) -> Vec<PathLock>
    where
        I: IntoIterator<Item = &'p Path>,
    {
        let mut sorted: Vec<&Path> = paths.into_iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        sorted
            .into_iter()
            .map(|path| {
                table
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            })
            .collect()
    }

    /// Number of paths that have ever been locked.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acquire every handle in order. Guards release on drop.
pub fn lock_all(handles: &[PathLock]) -> Vec<MutexGuard<'_, ()>> {
    handles
        .iter()
        .map(|handle| handle.lock().unwrap_or_else(PoisonError::into_inner))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_handles_are_shared_per_path() {
        let locks = PathLocks::new();
        let a = locks.handles([Path::new("/w/a.txt")]);
        let b = locks.handles([Path::new("/w/a.txt"), Path::new("/w/b.txt")]);

        assert_eq!(locks.len(), 2);
        assert!(Arc::ptr_eq(&a[0], &b[0]));
    }

    #[test]
    fn test_handles_sorted_and_deduplicated() {
        let locks = PathLocks::new();
        let handles = locks.handles([
            Path::new("/w/b.txt"),
            Path::new("/w/a.txt"),
            Path::new("/w/b.txt"),
        ]);
        assert_eq!(handles.len(), 2);

        let a = locks.handles([Path::new("/w/a.txt")]);
        assert!(Arc::ptr_eq(&handles[0], &a[0]));
    }

    #[test]
    fn test_lock_serializes_holders() {
        let locks = PathLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    let handles = locks.handles([Path::new("/w/shared.txt")]);
                    let _guards = lock_all(&handles);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
