//! compute-size: best-effort recursive byte count of a GitDir (§4.6),
//! feeding both this sweep's running total and the per-repo map used to
//! seed the metadata store (§4.5).

use walkdir::WalkDir;

use crate::gitdir::GitDir;
use crate::maintenance::{StepOutcome, StepResult};

/// Sum of file sizes under `gitdir`. Unreadable entries (permission
/// errors, a file vanishing mid-walk) are skipped rather than aborting
/// the whole sweep.
pub async fn compute_size(gitdir: &GitDir) -> u64 {
    let root = gitdir.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    })
    .await
    .unwrap_or(0)
}

/// Wraps [`compute_size`] as a maintenance-pipeline step; never stops the
/// pipeline or fails — sizing is purely informational.
pub async fn compute_size_step(gitdir: &GitDir) -> (StepResult, u64) {
    let bytes = compute_size(gitdir).await;
    (Ok(StepOutcome::cont()), bytes)
}
