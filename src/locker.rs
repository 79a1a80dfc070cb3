//! C4: the repository locker.
//!
//! An in-memory (intra-process, not a filesystem mutex) map from GitDir
//! path to a visible status message. Exists so concurrent RPC handlers on
//! one shard can observe clone progress and refuse to exec on a
//! half-clone (§4.4).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Entry {
    status: String,
}

/// Process-wide table of in-flight clone/delete operations.
#[derive(Debug, Default, Clone)]
pub struct Locker {
    inner: Arc<Mutex<HashMap<PathBuf, Entry>>>,
}

/// A held lock. Dropping it without calling [`Lock::release`] leaves the
/// entry in place (the caller must release explicitly, mirroring the
/// teacher's explicit-lifecycle lock handles rather than guard-on-Drop,
/// since a held lock's status message must remain visible to other
/// callers across `.await` points that outlive any single stack frame).
pub struct Lock {
    locker: Locker,
    path: PathBuf,
}

impl Lock {
    pub fn set_status(&self, status: impl Into<String>) {
        let mut map = self.locker.inner.lock().unwrap();
        if let Some(entry) = map.get_mut(&self.path) {
            entry.status = status.into();
        }
    }

    pub fn release(self) {
        let mut map = self.locker.inner.lock().unwrap();
        map.remove(&self.path);
    }
}

impl Locker {
    pub fn new() -> Self {
        Locker::default()
    }

    /// Try to acquire the entry for `path`. If already held, returns
    /// `(None, current_status)`. If acquired, returns `(Some(lock), status)`.
    pub fn try_acquire(&self, path: &Path, status: impl Into<String>) -> (Option<Lock>, String) {
        let mut map = self.inner.lock().unwrap();
        if let Some(existing) = map.get(path) {
            return (None, existing.status.clone());
        }
        let status = status.into();
        map.insert(path.to_path_buf(), Entry { status: status.clone() });
        (
            Some(Lock {
                locker: self.clone(),
                path: path.to_path_buf(),
            }),
            status,
        )
    }

    /// Non-blocking read of `(message, held)`.
    pub fn status(&self, path: &Path) -> (String, bool) {
        let map = self.inner.lock().unwrap();
        match map.get(path) {
            Some(entry) => (entry.status.clone(), true),
            None => (String::new(), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_try_acquire_fails_and_reports_status() {
        let locker = Locker::new();
        let path = Path::new("/r/x/.git");
        let (lock, _) = locker.try_acquire(path, "starting clone");
        assert!(lock.is_some());

        let (second, status) = locker.try_acquire(path, "starting clone");
        assert!(second.is_none());
        assert_eq!(status, "starting clone");
    }

    #[test]
    fn release_allows_reacquire() {
        let locker = Locker::new();
        let path = Path::new("/r/x/.git");
        let (lock, _) = locker.try_acquire(path, "starting clone");
        lock.unwrap().release();

        let (second, _) = locker.try_acquire(path, "starting again");
        assert!(second.is_some());
    }

    #[test]
    fn set_status_is_visible_to_concurrent_readers() {
        let locker = Locker::new();
        let path = Path::new("/r/x/.git");
        let (lock, _) = locker.try_acquire(path, "starting clone");
        let lock = lock.unwrap();
        lock.set_status("cloning: 42%");

        let (status, held) = locker.status(path);
        assert!(held);
        assert_eq!(status, "cloning: 42%");
    }

    #[test]
    fn status_on_unheld_path_reports_not_held() {
        let locker = Locker::new();
        let (status, held) = locker.status(Path::new("/never/locked"));
        assert!(!held);
        assert_eq!(status, "");
    }
}
