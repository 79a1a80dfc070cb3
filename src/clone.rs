//! C10: the clone coordinator. Implements §4.10's algorithm on top of
//! the locker (C4), a concurrency gate, the syncer contract, and the
//! stage-and-rename pattern that makes the atomic rename the only step
//! capable of making a clone visible.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::config_flags;
use crate::error::{GitServerError, Result};
use crate::gitdir::GitDir;
use crate::locker::Locker;
use crate::maintenance::attributes::ensure_attributes;
use crate::metadata::{CloneStatus, MetadataStore};
use crate::refhash::write_last_changed_stamp;
use crate::syncer::Syncer;
use crate::tmp::new_clone_scratch_dir;

/// Options for [`clone_repo`], mirroring §4.10's `opts{Block, Overwrite}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOpts {
    /// Wait for the clone to finish before returning. `false` starts the
    /// clone in the background and returns immediately after the locker
    /// entry is taken (steps 1-4 only).
    pub block: bool,
    /// Replace an existing `target_git_dir` rather than fail with
    /// `RepoExists`.
    pub overwrite: bool,
}

/// Dependencies the clone coordinator needs but does not own a concept
/// of; `Shard` (C16) builds one of these from its own fields so the
/// janitor's reclone step and an RPC handler share the same locker
/// (resolving the janitor/clone cyclic reference noted in SPEC_FULL.md
/// §9). `Arc`-based so a non-blocking clone can outlive the call that
/// spawned it.
#[derive(Clone)]
pub struct CloneContext {
    pub root: PathBuf,
    pub locker: Locker,
    pub clone_gate: Arc<Semaphore>,
    pub ls_remote_gate: Arc<Semaphore>,
    pub syncer: Arc<dyn Syncer>,
    pub metadata: Arc<dyn MetadataStore>,
    pub shard_id: String,
}

/// Entry point for both RPC-driven clones and the janitor's reclone step.
pub async fn clone_repo(ctx: &CloneContext, name: &str, url: &str, opts: CloneOpts) -> Result<String> {
    let target_git_dir = GitDir::new(ctx.root.join(name).join(".git"));

    // Step 1: if someone else is already cloning this repo, hand back
    // their progress message instead of racing them.
    let (status, held) = ctx.locker.status(target_git_dir.path());
    if held {
        return Ok(status);
    }

    // Step 3: cheap existence/permission check, gated so a flood of
    // cloneable-checks can't starve the process.
    {
        let _permit = ctx.ls_remote_gate.acquire().await.map_err(|_| GitServerError::Cancelled)?;
        ctx.syncer.is_cloneable(name, url).await?;
    }

    // Step 4: claim the locker entry.
    let (lock, status) = ctx.locker.try_acquire(target_git_dir.path(), "starting clone");
    let Some(lock) = lock else {
        return Ok(status);
    };

    // Step 5.
    if !opts.overwrite && target_git_dir.exists() {
        lock.release();
        return Err(GitServerError::RepoExists(name.to_string()));
    }

    if opts.block {
        run_clone(ctx.clone(), lock, target_git_dir, name.to_string(), url.to_string(), opts).await?;
        Ok(String::new())
    } else {
        let ctx = ctx.clone();
        let name = name.to_string();
        let url = url.to_string();
        tokio::spawn(async move {
            let label = name.clone();
            if let Err(err) = run_clone(ctx, lock, target_git_dir, name, url, opts).await {
                log::warn!("background clone of {label} failed: {err}");
            }
        });
        Ok(String::new())
    }
}

async fn run_clone(
    ctx: CloneContext,
    lock: crate::locker::Lock,
    target_git_dir: GitDir,
    name: String,
    url: String,
    opts: CloneOpts,
) -> Result<()> {
    ctx.metadata.set_clone_status(&name, CloneStatus::Cloning, &ctx.shard_id).await;

    let result = run_clone_inner(&ctx, &lock, &target_git_dir, &url, opts).await;

    match &result {
        Ok(bytes) => {
            ctx.metadata.set_clone_status(&name, CloneStatus::Cloned, &ctx.shard_id).await;
            ctx.metadata.set_repo_size(&name, *bytes).await;
            ctx.metadata.set_last_error(&name, None).await;
        }
        Err(err) => {
            ctx.metadata.set_clone_status(&name, CloneStatus::NotCloned, &ctx.shard_id).await;
            ctx.metadata.set_last_error(&name, Some(&err.to_string())).await;
        }
    }

    lock.release();
    result.map(|_| ())
}

async fn run_clone_inner(
    ctx: &CloneContext,
    lock: &crate::locker::Lock,
    target_git_dir: &GitDir,
    url: &str,
    opts: CloneOpts,
) -> Result<u64> {
    // Step 6.
    let _permit = ctx.clone_gate.acquire().await.map_err(|_| GitServerError::Cancelled)?;

    // Step 7: stage into a scratch directory under `.tmp`.
    let tmp_dir = ctx.root.join(".tmp");
    tokio::fs::create_dir_all(&tmp_dir).await?;
    let scratch_root = new_clone_scratch_dir(&tmp_dir);
    let scratch_git_dir = scratch_root.join(".git");

    let mut progress = ctx.syncer.clone(url, &scratch_git_dir).await?;
    while let Some(line) = progress.next().await {
        lock.set_status(line.0);
    }

    // Step 8: validate the staged directory.
    let head = scratch_git_dir.join("HEAD");
    let head_bytes = tokio::fs::read(&head).await.map_err(|_| GitServerError::NotCloneable {
        reason: "staged clone has no HEAD".to_string(),
    })?;
    if head_bytes.is_empty() {
        let _ = tokio::fs::remove_dir_all(&scratch_root).await;
        return Err(GitServerError::NotCloneable {
            reason: "staged clone has an empty HEAD".to_string(),
        });
    }

    let staged = GitDir::new(&scratch_git_dir);

    // Step 9.
    write_last_changed_stamp(&staged).await?;

    // Step 10.
    ensure_attributes(&staged).await.map_err(|err| GitServerError::Other(err.to_string()))?;

    // Step 11: retire the existing directory, if any.
    let retired = if opts.overwrite && target_git_dir.exists() {
        let retired_path = retired_sibling_path(&scratch_root);
        tokio::fs::rename(target_git_dir.path(), &retired_path).await?;
        Some(retired_path)
    } else {
        None
    };

    // Step 12: make the clone visible.
    if let Some(parent) = target_git_dir.path().parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&scratch_git_dir, target_git_dir.path()).await?;

    // Step 13.
    if let Some(retired_path) = retired {
        let _ = tokio::fs::remove_dir_all(&retired_path).await;
    }
    let _ = tokio::fs::remove_dir_all(&scratch_root).await;

    let bytes = crate::maintenance::size::compute_size(target_git_dir).await;
    Ok(bytes)
}

fn retired_sibling_path(scratch_root: &Path) -> PathBuf {
    let name = scratch_root.file_name().unwrap_or_default().to_string_lossy().into_owned();
    scratch_root.with_file_name(format!("{name}-retired"))
}

/// Set `sourcegraph.type` on a freshly cloned repository (e.g. to
/// `"perforce"`) — called by non-Git syncers after `clone_repo` returns,
/// since the core clone path has no opinion on repository type.
pub async fn set_repo_type(gitdir: &GitDir, repo_type: &str) -> Result<()> {
    config_flags::set(gitdir, config_flags::REPO_TYPE, repo_type).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FakeMetadataStore;
    use crate::syncer::GitSyncer;
    use tempfile::tempdir;

    async fn init_bare_remote() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        tokio::process::Command::new("git")
            .args(["init", "--bare", "-q"])
            .arg(dir.path())
            .status()
            .await
            .unwrap();
        dir
    }

    fn test_ctx(root: &Path, metadata: Arc<dyn MetadataStore>) -> CloneContext {
        CloneContext {
            root: root.to_path_buf(),
            locker: Locker::new(),
            clone_gate: Arc::new(Semaphore::new(2)),
            ls_remote_gate: Arc::new(Semaphore::new(2)),
            syncer: Arc::new(GitSyncer::default()),
            metadata,
            shard_id: "shard-0".to_string(),
        }
    }

    #[tokio::test]
    async fn clones_into_target_and_reports_cloned() {
        let remote = init_bare_remote().await;
        let root = tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> = Arc::new(FakeMetadataStore::new());
        let ctx = test_ctx(root.path(), metadata.clone());

        let result = clone_repo(
            &ctx,
            "example/repo",
            &remote.path().to_string_lossy(),
            CloneOpts { block: true, overwrite: false },
        )
        .await;
        assert!(result.is_ok(), "{result:?}");
        assert!(root.path().join("example/repo/.git/HEAD").exists());
    }

    #[tokio::test]
    async fn refuses_existing_target_without_overwrite() {
        let remote = init_bare_remote().await;
        let root = tempdir().unwrap();
        tokio::fs::create_dir_all(root.path().join("example/repo/.git")).await.unwrap();

        let metadata: Arc<dyn MetadataStore> = Arc::new(FakeMetadataStore::new());
        let ctx = test_ctx(root.path(), metadata);

        let result = clone_repo(
            &ctx,
            "example/repo",
            &remote.path().to_string_lossy(),
            CloneOpts { block: true, overwrite: false },
        )
        .await;
        assert!(matches!(result, Err(GitServerError::RepoExists(_))));
    }

    #[tokio::test]
    async fn overwrite_replaces_an_existing_clone() {
        let remote = init_bare_remote().await;
        let root = tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> = Arc::new(FakeMetadataStore::new());
        let ctx = test_ctx(root.path(), metadata.clone());

        clone_repo(
            &ctx,
            "example/repo",
            &remote.path().to_string_lossy(),
            CloneOpts { block: true, overwrite: false },
        )
        .await
        .unwrap();

        let result = clone_repo(
            &ctx,
            "example/repo",
            &remote.path().to_string_lossy(),
            CloneOpts { block: true, overwrite: true },
        )
        .await;
        assert!(result.is_ok(), "{result:?}");
        assert!(root.path().join("example/repo/.git/HEAD").exists());
    }
}
