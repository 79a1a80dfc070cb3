//! remove-stale-locks: delete Git lock files whose mtime exceeds their
//! grace period, implying the writer crashed (§4.6).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MaintenanceError;
use crate::gitdir::GitDir;
use crate::maintenance::{StepOutcome, StepResult};

const CONFIG_LOCK_GRACE: Duration = Duration::from_secs(60);
const PACKED_REFS_LOCK_GRACE: Duration = Duration::from_secs(3600);
const REF_LOCK_GRACE: Duration = Duration::from_secs(3600);
const COMMIT_GRAPH_LOCK_GRACE: Duration = Duration::from_secs(3600);
const GC_PID_GRACE: Duration = Duration::from_secs(3600);

/// One curated lock file (or glob-like recursive set) and its grace period.
struct LockSpec {
    /// Path relative to the GitDir. `None` means "walk `refs/` for
    /// `*.lock` files" (the one recursive case).
    rel_path: Option<&'static str>,
    grace: Duration,
}

const FIXED_LOCKS: &[LockSpec] = &[
    LockSpec { rel_path: Some("config.lock"), grace: CONFIG_LOCK_GRACE },
    LockSpec { rel_path: Some("packed-refs.lock"), grace: PACKED_REFS_LOCK_GRACE },
    LockSpec { rel_path: Some("objects/info/commit-graph.lock"), grace: COMMIT_GRAPH_LOCK_GRACE },
    LockSpec { rel_path: Some("gc.pid"), grace: GC_PID_GRACE },
];

pub async fn remove_stale_locks(gitdir: &GitDir) -> StepResult {
    let mut errors = Vec::new();

    for spec in FIXED_LOCKS {
        let path = gitdir.join(spec.rel_path.unwrap());
        if let Err(err) = remove_if_stale(&path, spec.grace).await {
            errors.push(format!("{}: {err}", path.display()));
        }
    }

    let refs_dir = gitdir.join("refs");
    match collect_lock_files(&refs_dir).await {
        Ok(locks) => {
            for path in locks {
                if let Err(err) = remove_if_stale(&path, REF_LOCK_GRACE).await {
                    errors.push(format!("{}: {err}", path.display()));
                }
            }
        }
        Err(err) => errors.push(format!("{}: {err}", refs_dir.display())),
    }

    if errors.is_empty() {
        Ok(StepOutcome::cont())
    } else {
        Err(MaintenanceError::step(
            "remove-stale-locks",
            crate::error::GitServerError::Other(errors.join("; ")),
        ))
    }
}

async fn remove_if_stale(path: &Path, grace: Duration) -> std::io::Result<()> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    let age = meta
        .modified()
        .ok()
        .and_then(|m| m.elapsed().ok())
        .unwrap_or(Duration::ZERO);

    if age >= grace {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    } else {
        Ok(())
    }
}

async fn collect_lock_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(out);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(e) => e,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "lock") {
                out.push(path);
            }
        }
    }
    Ok(out)
}
