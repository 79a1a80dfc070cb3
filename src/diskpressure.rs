//! C8: the disk-pressure reclaimer. Evicts the least-recently-touched
//! repositories until the configured free-space target is met (§4.8).

use std::time::SystemTime;

use crate::disk::DiskSizer;
use crate::error::{GitServerError, Result};
use crate::gitdir::GitDir;
use crate::metadata::{CloneStatus, MetadataStore};

/// One candidate for eviction: its path and the mtime used to rank it.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub gitdir: GitDir,
    pub head_mtime: SystemTime,
    /// `None` if the GitDir's path doesn't resolve to a name under the
    /// configured root — such a candidate is still evicted, just without
    /// a metadata-store notification.
    pub repo_name: Option<String>,
}

/// Reclaim disk space by deleting GitDirs, least-recently-touched first,
/// until `desired_free_fraction * disk_size` bytes are free or there is
/// nothing left to delete. Each eviction notifies `metadata` that the
/// repo is `NotCloned` (§3's `Cloned → NotCloned` disk-pressure
/// transition, §8 scenario 6).
///
/// `candidates` is supplied by the caller (the janitor walk has already
/// enumerated GitDirs for this sweep); this function only orders and
/// deletes them. Returns the total bytes freed.
pub async fn reclaim_if_needed(
    sizer: &dyn DiskSizer,
    mount: &std::path::Path,
    desired_free_fraction: f64,
    mut candidates: Vec<EvictionCandidate>,
    metadata: &dyn MetadataStore,
    shard_id: &str,
) -> Result<u64> {
    let disk_size = sizer.disk_size(mount)?;
    let want_free = (desired_free_fraction * disk_size as f64) as u64;
    let actual_free = sizer.bytes_free(mount)?;

    if actual_free >= want_free {
        return Ok(0);
    }

    let mut need = want_free - actual_free;
    candidates.sort_by_key(|c| c.head_mtime);

    let mut freed = 0u64;
    for candidate in candidates {
        if need == 0 {
            break;
        }
        let size = crate::maintenance::size::compute_size(&candidate.gitdir).await;
        log::info!(
            "disk-pressure: evicting {} ({size} bytes, least-recently touched)",
            candidate.gitdir
        );
        tokio::fs::remove_dir_all(candidate.gitdir.path()).await?;
        if let Some(repo_name) = &candidate.repo_name {
            metadata.set_clone_status(repo_name, CloneStatus::NotCloned, shard_id).await;
        }
        freed += size;
        need = need.saturating_sub(size);

        let actual_free = sizer.bytes_free(mount)?;
        if actual_free >= want_free {
            need = 0;
        }
    }

    if need > 0 {
        return Err(GitServerError::DiskPressureUnsatisfiable { need, freed });
    }

    Ok(freed)
}

/// Build an [`EvictionCandidate`] list from a list of GitDirs, reading
/// each one's `HEAD` mtime (falling back to `UNIX_EPOCH` — oldest
/// possible — if it can't be read, so a broken repo is evicted first) and
/// deriving its repo name relative to `root` for metadata notification.
pub async fn candidates_from_gitdirs(gitdirs: Vec<GitDir>, root: &std::path::Path) -> Vec<EvictionCandidate> {
    let mut out = Vec::with_capacity(gitdirs.len());
    for gitdir in gitdirs {
        let head_mtime = tokio::fs::metadata(gitdir.head_path())
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let repo_name = gitdir.repo_name(root);
        out.push(EvictionCandidate { gitdir, head_mtime, repo_name });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::FakeDiskSizer;
    use crate::metadata::{FakeMetadataStore, NullMetadataStore};
    use tempfile::tempdir;

    async fn make_repo(root: &std::path::Path, name: &str, age: std::time::Duration) -> GitDir {
        let path = root.join(name).join(".git");
        tokio::fs::create_dir_all(&path).await.unwrap();
        tokio::fs::write(path.join("HEAD"), b"ref: refs/heads/main\n").await.unwrap();
        let mtime = filetime::FileTime::from_system_time(SystemTime::now() - age);
        filetime::set_file_mtime(path.join("HEAD"), mtime).unwrap();
        GitDir::new(path)
    }

    #[tokio::test]
    async fn does_nothing_when_free_space_already_meets_target() {
        let root = tempdir().unwrap();
        let sizer = FakeDiskSizer::new(500, 1000);
        let metadata = NullMetadataStore;
        let freed = reclaim_if_needed(&sizer, root.path(), 0.10, Vec::new(), &metadata, "shard-0")
            .await
            .unwrap();
        assert_eq!(freed, 0);
    }

    #[tokio::test]
    async fn evicts_oldest_repos_first_until_target_met() {
        let root = tempdir().unwrap();
        let old = make_repo(root.path(), "old", std::time::Duration::from_secs(1000)).await;
        let new = make_repo(root.path(), "new", std::time::Duration::from_secs(1)).await;

        // 1000 bytes total, 90 free (9%), want 10% = 100 free: need 10 more,
        // which evicting just the ~21-byte "old" repo satisfies.
        let sizer = FakeDiskSizer::new(90, 1000);
        let candidates = candidates_from_gitdirs(vec![new.clone(), old.clone()], root.path()).await;

        let metadata = FakeMetadataStore::new();
        let freed = reclaim_if_needed(&sizer, root.path(), 0.10, candidates, &metadata, "shard-0")
            .await
            .unwrap();
        assert!(freed > 0);
        assert!(!old.exists(), "oldest repo should have been evicted first");
        assert!(new.exists(), "newer repo should be left alone once the target is met");
        assert_eq!(metadata.status_of("old"), Some(crate::metadata::CloneStatus::NotCloned));
        assert_eq!(metadata.status_of("new"), None, "retained repo must not be touched");
    }

    #[tokio::test]
    async fn reports_unsatisfiable_target_when_nothing_left_to_evict() {
        let root = tempdir().unwrap();
        let sizer = FakeDiskSizer::new(0, 1000);
        let metadata = NullMetadataStore;
        let result = reclaim_if_needed(&sizer, root.path(), 0.50, Vec::new(), &metadata, "shard-0").await;
        assert!(matches!(result, Err(GitServerError::DiskPressureUnsatisfiable { .. })));
    }
}
