//! maybe-remove-corrupt: delete a GitDir outright when it can no longer
//! serve as a usable mirror — HEAD is missing, or Git itself reports the
//! directory as non-bare (§4.6).

use crate::error::MaintenanceError;
use crate::gitdir::GitDir;
use crate::headref::read_head_ref_name;
use crate::maintenance::{StepOutcome, StepResult};
use crate::metadata::{CloneStatus, MetadataStore};
use crate::process::{CommandRunner, RunOpts};

/// Delete a GitDir that can no longer serve as a usable mirror, notifying
/// `metadata` that the repo is `NotCloned` (§3's `Cloned → NotCloned`
/// corruption transition).
pub async fn maybe_remove_corrupt(
    gitdir: &GitDir,
    repo_name: &str,
    metadata: &dyn MetadataStore,
    shard_id: &str,
) -> StepResult {
    let reason = if !gitdir.head_path().exists() {
        Some("head-missing")
    } else if !is_bare(gitdir).await {
        Some("not-bare")
    } else {
        None
    };

    let Some(reason) = reason else {
        return Ok(StepOutcome::cont());
    };

    log::warn!("removing corrupt repository {gitdir}: {reason}");
    tokio::fs::remove_dir_all(gitdir.path())
        .await
        .map_err(MaintenanceError::from)?;
    metadata.set_clone_status(repo_name, CloneStatus::NotCloned, shard_id).await;

    Ok(StepOutcome::stop(reason))
}

async fn is_bare(gitdir: &GitDir) -> bool {
    match CommandRunner
        .run(gitdir, &["rev-parse", "--is-bare-repository"], RunOpts::default())
        .await
    {
        Ok(output) => {
            output.status.success()
                && String::from_utf8_lossy(&output.stdout).trim() == "true"
        }
        // Can't even ask Git about it; treat as broken rather than risk
        // repeatedly deleting a merely-busy repository.
        Err(_) => true,
    }
}

// `read_head_ref_name` is re-exported from `headref` for callers that want
// the resolved ref name alongside the corruption check (e.g. diagnostics).
pub async fn head_ref_name(gitdir: &GitDir) -> Option<String> {
    read_head_ref_name(gitdir).await
}
