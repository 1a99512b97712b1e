//! Per-repository mutual exclusion.
//!
//! Every coordinator operation holds the lock for its repository path from
//! the first write until the commit lands, so concurrent saves, deletes, and
//! full backups against the same repository run one at a time. Different
//! repositories never block each other.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock};

use tracing::{debug, warn};

/// Process-wide set of repository paths currently held.
struct LockTable {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

fn table() -> &'static LockTable {
    static TABLE: OnceLock<LockTable> = OnceLock::new();
    TABLE.get_or_init(|| LockTable {
        held: Mutex::new(HashSet::new()),
        released: Condvar::new(),
    })
}

impl LockTable {
    fn held(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|poisoned| {
            warn!("repository lock table was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Canonical key for `path`, so `repo` and `./repo` share one lock.
///
/// A repository that does not exist yet (install) is keyed by its
/// canonicalized parent plus its own name, which is the key it gets once
/// created.
fn lock_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (std::fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/// Held for the duration of one repository transaction; released on drop,
/// including during unwinding.
#[derive(Debug)]
pub struct RepositoryLock {
    key: PathBuf,
}

impl RepositoryLock {
    /// Block until no other holder has `path`, then take it.
    pub fn acquire(path: &Path) -> Self {
        let key = lock_key(path);
        let table = table();
        let mut held = table.held();
        while held.contains(&key) {
            debug!(path = %key.display(), "waiting for repository lock");
            held = table
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(key.clone());
        Self { key }
    }

    /// Take the lock only if it is free right now.
    pub fn try_acquire(path: &Path) -> Option<Self> {
        let key = lock_key(path);
        let mut held = table().held();
        if held.insert(key.clone()) {
            Some(Self { key })
        } else {
            None
        }
    }

    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        let table = table();
        table.held().remove(&self.key);
        table.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_lock_is_exclusive_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RepositoryLock::acquire(dir.path());
        assert!(RepositoryLock::try_acquire(dir.path()).is_none());

        let other = tempfile::tempdir().unwrap();
        assert!(RepositoryLock::try_acquire(other.path()).is_some());

        drop(guard);
        assert!(RepositoryLock::try_acquire(dir.path()).is_some());
    }

    #[test]
    fn test_equivalent_paths_share_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("repo");
        std::fs::create_dir(&sub).unwrap();
        let _guard = RepositoryLock::acquire(&sub);
        let dotted = dir.path().join(".").join("repo");
        assert!(RepositoryLock::try_acquire(&dotted).is_none());
    }

    #[test]
    fn test_missing_repository_keeps_its_key_once_created() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("other")).unwrap();
        let roundabout = dir.path().join("other").join("..").join("repo");
        let guard = RepositoryLock::acquire(&roundabout);

        std::fs::create_dir(dir.path().join("repo")).unwrap();
        assert!(RepositoryLock::try_acquire(&dir.path().join("repo")).is_none());
        drop(guard);
        assert!(RepositoryLock::try_acquire(&dir.path().join("repo")).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_repository_behind_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let _guard = RepositoryLock::acquire(&link.join("repo"));
        assert!(RepositoryLock::try_acquire(&real.join("repo")).is_none());
    }

    #[test]
    fn test_waiters_run_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().to_path_buf());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                std::thread::spawn(move || {
                    let _guard = RepositoryLock::acquire(&path);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
