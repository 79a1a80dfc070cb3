//! C3: the disk sizer.
//!
//! Abstracts `{bytes_free, disk_size}` over a mount so the disk-pressure
//! reclaimer (§4.8) can be tested without touching a real filesystem.
//! The real implementation goes through `fs2`, which wraps
//! `statvfs`/`GetDiskFreeSpaceEx` the way several repos in this lineage's
//! ecosystem (e.g. repo garbage collectors built on cross-platform lock
//! and disk-space crates) do.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

/// `{bytes_free, disk_size}` over a mount.
pub trait DiskSizer: Send + Sync {
    fn bytes_free(&self, mount: &Path) -> Result<u64>;
    fn disk_size(&self, mount: &Path) -> Result<u64>;
}

/// The real sizer, backed by `fs2::available_space`/`fs2::total_space`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealDiskSizer;

impl DiskSizer for RealDiskSizer {
    fn bytes_free(&self, mount: &Path) -> Result<u64> {
        Ok(fs2::available_space(mount)?)
    }

    fn disk_size(&self, mount: &Path) -> Result<u64> {
        Ok(fs2::total_space(mount)?)
    }
}

/// A stub sizer for tests and for the disk-pressure component's own test
/// suite (§8 scenario 6: "sizer reports 0 free, 10 total").
#[derive(Debug, Default)]
pub struct FakeDiskSizer {
    state: Mutex<HashMap<PathBuf, (u64, u64)>>,
    default_free: u64,
    default_total: u64,
}

impl FakeDiskSizer {
    pub fn new(default_free: u64, default_total: u64) -> Self {
        FakeDiskSizer {
            state: Mutex::new(HashMap::new()),
            default_free,
            default_total,
        }
    }

    pub fn set(&self, mount: impl Into<PathBuf>, free: u64, total: u64) {
        self.state.lock().unwrap().insert(mount.into(), (free, total));
    }

    /// Simulate bytes being freed by a deletion, so a caller that
    /// re-reads `bytes_free` between deletions (§4.8) observes progress.
    pub fn free_up(&self, mount: &Path, bytes: u64) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entry(mount.to_path_buf())
            .or_insert((self.default_free, self.default_total));
        entry.0 = entry.0.saturating_add(bytes).min(entry.1);
    }
}

impl DiskSizer for FakeDiskSizer {
    fn bytes_free(&self, mount: &Path) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .get(mount)
            .map(|(free, _)| *free)
            .unwrap_or(self.default_free))
    }

    fn disk_size(&self, mount: &Path) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .get(mount)
            .map(|(_, total)| *total)
            .unwrap_or(self.default_total))
    }
}
