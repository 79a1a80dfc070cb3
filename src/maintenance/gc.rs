//! GC-or-sg-maintenance: exactly one of two repacking strategies runs
//! process-wide (§4.6), gated by the same lock file Git's own `git gc`
//! takes so the two never run concurrently against one GitDir.

use std::time::Duration;

use crate::config::{Config, GcMode};
use crate::error::MaintenanceError;
use crate::gitdir::GitDir;
use crate::maintenance::{StepOutcome, StepResult};
use crate::process::{CommandRunner, RunOpts};

/// The embedded maintenance script, grounded in the same shape as the
/// teacher's shelled-out git invocations but run as one script so a
/// single lock/log pair covers the whole sequence.
const MAINTENANCE_SCRIPT: &str = include_str!("../../scripts/sg-maintenance.sh");

const SGM_LOG: &str = "sgm.log";
const GC_PID: &str = "gc.pid";
const GC_LOCK_STALE_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NeedReason {
    NoBitmap,
    NoCommitGraph,
    TooManyPackfiles,
    TooManyLooseObjects,
}

impl NeedReason {
    fn label(self) -> &'static str {
        match self {
            NeedReason::NoBitmap => "has_bitmap",
            NeedReason::NoCommitGraph => "has_commit_graph",
            NeedReason::TooManyPackfiles => "too_many_packfiles",
            NeedReason::TooManyLooseObjects => "too_many_loose_objects",
        }
    }
}

pub async fn gc_or_maintenance(gitdir: &GitDir, config: &Config) -> StepResult {
    match config.gc_mode {
        GcMode::GitGc => run_git_auto_gc(gitdir, config).await,
        GcMode::SgMaintenance => run_sg_maintenance(gitdir, config).await,
    }
}

async fn run_git_auto_gc(gitdir: &GitDir, config: &Config) -> StepResult {
    CommandRunner
        .run_checked(
            gitdir,
            &["-c", "gc.auto=1", "-c", "gc.autoDetach=false", "gc", "--auto"],
            RunOpts::with_timeout(config.git_long_command_timeout),
        )
        .await
        .map_err(|err| MaintenanceError::step("git-gc", err))?;
    Ok(StepOutcome::cont())
}

/// `true` iff `objects/17`-style loose-object sampling would flag this
/// GitDir (§4.6: "estimated total > limit"). Using a single fan-out
/// directory (hex prefix `17`) and multiplying by 256 avoids a full
/// `objects/**` walk.
pub async fn too_many_loose_objects(gitdir: &GitDir, limit: usize) -> bool {
    estimate_loose_objects(gitdir).await > limit
}

async fn estimate_loose_objects(gitdir: &GitDir) -> usize {
    let sentinel = gitdir.join("objects/17");
    let mut count = 0usize;
    let Ok(mut entries) = tokio::fs::read_dir(&sentinel).await else {
        return 0;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.len() == 38 && name.bytes().all(|b| b.is_ascii_hexdigit()) {
            count += 1;
        }
    }
    count * 256
}

async fn too_many_packfiles(gitdir: &GitDir, limit: usize) -> bool {
    let pack_dir = gitdir.join("objects/pack");
    let Ok(mut entries) = tokio::fs::read_dir(&pack_dir).await else {
        return false;
    };
    let mut packs = std::collections::HashSet::new();
    let mut kept = std::collections::HashSet::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("pack") => {
                packs.insert(stem);
            }
            Some("keep") => {
                kept.insert(stem);
            }
            _ => {}
        }
    }
    packs.difference(&kept).count() > limit
}

async fn has_bitmap(gitdir: &GitDir) -> bool {
    let pack_dir = gitdir.join("objects/pack");
    let Ok(mut entries) = tokio::fs::read_dir(&pack_dir).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().extension().is_some_and(|e| e == "bitmap") {
            return true;
        }
    }
    false
}

async fn has_commit_graph(gitdir: &GitDir) -> bool {
    tokio::fs::try_exists(gitdir.join("objects/info/commit-graph"))
        .await
        .unwrap_or(false)
}

/// Determine whether sg-maintenance needs to run, per the ordered checks
/// in §4.6; `None` means "skipped, nothing needed".
async fn needed_reason(gitdir: &GitDir, config: &Config) -> Option<NeedReason> {
    if !has_bitmap(gitdir).await {
        return Some(NeedReason::NoBitmap);
    }
    if !has_commit_graph(gitdir).await {
        return Some(NeedReason::NoCommitGraph);
    }
    if too_many_packfiles(gitdir, config.auto_pack_limit).await {
        return Some(NeedReason::TooManyPackfiles);
    }
    if too_many_loose_objects(gitdir, config.loose_objects_limit).await {
        return Some(NeedReason::TooManyLooseObjects);
    }
    None
}

async fn run_sg_maintenance(gitdir: &GitDir, config: &Config) -> StepResult {
    if fresh_log_present(gitdir, config.sgm_log_expire).await {
        return Ok(StepOutcome::continue_with_reason("skipped: fresh sgm.log"));
    }

    let Some(reason) = needed_reason(gitdir, config).await else {
        return Ok(StepOutcome::continue_with_reason("skipped"));
    };

    let Some(_guard) = acquire_gc_lock(gitdir).await? else {
        log::info!("sg-maintenance: gc lock held elsewhere for {gitdir}, skipping");
        return Ok(StepOutcome::continue_with_reason("skipped: gc lock held"));
    };

    log::info!("sg-maintenance: running for {gitdir} ({})", reason.label());

    let result = CommandRunner
        .run_bin(
            gitdir,
            "sh",
            &["-s", "--", gitdir.path().to_string_lossy().as_ref()],
            RunOpts {
                timeout: config.git_long_command_timeout,
                extra_env: vec![("SGM_SCRIPT".to_string(), "1".to_string())],
                stdin: Some(MAINTENANCE_SCRIPT.as_bytes().to_vec()),
            },
        )
        .await;

    match result {
        Ok(output) if output.status.success() => {
            let _ = tokio::fs::remove_file(gitdir.join(SGM_LOG)).await;
            Ok(StepOutcome::continue_with_reason(reason.label()))
        }
        Ok(output) => {
            let log = format!(
                "exit {:?}\nstdout:\n{}\nstderr:\n{}",
                output.status.code(),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            tokio::fs::write(gitdir.join(SGM_LOG), &log)
                .await
                .map_err(MaintenanceError::from)?;
            Err(MaintenanceError::step(
                "sg-maintenance",
                crate::error::GitServerError::Subprocess {
                    cmd: "sg-maintenance.sh".to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                },
            ))
        }
        Err(err) => {
            tokio::fs::write(gitdir.join(SGM_LOG), format!("{err}"))
                .await
                .map_err(MaintenanceError::from)?;
            Err(MaintenanceError::step("sg-maintenance", err))
        }
    }
}

async fn fresh_log_present(gitdir: &GitDir, expire: Duration) -> bool {
    let Ok(meta) = tokio::fs::metadata(gitdir.join(SGM_LOG)).await else {
        return false;
    };
    let Ok(age) = meta.modified().and_then(|m| m.elapsed().map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::Other, "clock went backwards")
    })) else {
        return false;
    };
    age < expire
}

/// Held for the duration of the maintenance script; releases the `gc.pid`
/// lock file unconditionally on drop.
struct GcLockGuard {
    path: std::path::PathBuf,
}

impl Drop for GcLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Take the same `gc.pid` lock Git's own `gc` honors. Returns `None` if
/// already held by a live (non-stale) writer.
async fn acquire_gc_lock(gitdir: &GitDir) -> Result<Option<GcLockGuard>, MaintenanceError> {
    let path = gitdir.join(GC_PID);

    if let Ok(meta) = tokio::fs::metadata(&path).await {
        let age = meta
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .unwrap_or(Duration::ZERO);
        if age < GC_LOCK_STALE_AFTER {
            return Ok(None);
        }
        let _ = tokio::fs::remove_file(&path).await;
    }

    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
    {
        Ok(mut file) => {
            use tokio::io::AsyncWriteExt;
            let _ = file.write_all(std::process::id().to_string().as_bytes()).await;
            Ok(Some(GcLockGuard { path }))
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(err) => Err(MaintenanceError::from(err)),
    }
}
